//! CSS selectors for the retailer's listing markup.
//!
//! Every field is an ordered fallback list: earlier entries win. Update these
//! when the site changes its templates.

/// Any element that looks like a category link on the index page
pub const CATEGORY_LINK_PRESENT: &str = "a[href*='/c/']";

/// Category links, highest priority first
pub const CATEGORY_LINKS: &[&str] = &[".category-tile a", ".category-card a", "a[href*='/c/']"];

/// Path fragment every category URL carries
pub const CATEGORY_PATH_MARKER: &str = "/c/";

/// Class fragment of the container grouping subcategories under a heading
pub const CATEGORY_GROUP_CLASS: &str = "category";

pub const CATEGORY_GROUP_HEADING: &[&str] = &["h2", "h3", ".category-title"];

/// Product cards on a listing page
pub const PRODUCT_CARD: &[&str] = &[".product-tile", ".product-card", ".product-item", "[data-product-id]"];

/// Identity attributes on the card itself, in priority order
pub const PRODUCT_ID_ATTRIBUTES: &[&str] = &["data-product-id", "data-sku", "data-item-id"];

/// Link to the product detail page, which embeds the id as `/p/<id>`
pub const PRODUCT_DETAIL_LINK: &[&str] = &["a[href*='/p/']"];

pub const NAME: &[&str] = &[".product-title", ".product-name", "h3", "h4", "[data-product-name]"];

pub const PRICE: &[&str] = &[".price", ".product-price", ".sale-price", "[data-price]"];

pub const ORIGINAL_PRICE: &[&str] = &[".original-price", ".was-price", ".strikethrough-price", "del"];

pub const DISCOUNT: &[&str] = &[".discount", ".savings", ".promotion", ".badge"];

pub const DESCRIPTION: &[&str] = &[".product-description", ".product-summary", ".description"];

pub const IMAGE: &[&str] = &["img", ".product-image img"];

/// Lazy-loaded images keep the real URL here until scrolled into view
pub const IMAGE_ATTRIBUTES: &[&str] = &["src", "data-src"];

pub const PRODUCT_LINK: &[&str] = &["a"];

pub const OUT_OF_STOCK: &[&str] = &[".out-of-stock", ".unavailable"];

/// Enabled "next page" controls
pub const NEXT_PAGE: &[&str] = &[
    ".pagination .next:not(.disabled)",
    "a[aria-label='Next']",
    "button[aria-label='Next page']:not([disabled])",
    ".page-next:not(.disabled)",
];

/// Join a fallback list into one CSS selector group
pub fn group(selectors: &[&str]) -> String {
    selectors.join(", ")
}
