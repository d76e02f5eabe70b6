use tracing::debug;

use crate::browser::{BrowserError, BrowserResult, PageElement};

/// First-match-wins lookups over one DOM node.
///
/// Each lookup walks an ordered selector list and stops at the first
/// non-empty result. A missing element is "not found" and moves on to the next
/// candidate, as does a descendant that went stale between lookup and read.
/// A stale `node` is returned as an error so the caller drops it.
pub struct Extractor<'a> {
    node: &'a dyn PageElement,
}

impl<'a> Extractor<'a> {
    pub fn new(node: &'a dyn PageElement) -> Self {
        Self { node }
    }

    /// Trimmed text of the first matching descendant with non-empty text
    pub async fn text(&self, selectors: &[&str]) -> BrowserResult<Option<String>> {
        for selector in selectors {
            let Some(element) = missing(self.node.find(selector).await, selector)?.flatten() else {
                continue;
            };

            if let Some(text) = absorb(element.text().await, selector)? {
                if let Some(text) = non_empty(text) {
                    return Ok(Some(text));
                }
            }
        }

        Ok(None)
    }

    /// First non-empty `attribute` among descendants matching the selectors
    pub async fn attribute(&self, selectors: &[&str], attribute: &str) -> BrowserResult<Option<String>> {
        for selector in selectors {
            let Some(element) = missing(self.node.find(selector).await, selector)?.flatten() else {
                continue;
            };

            if let Some(value) = absorb(element.attribute(attribute).await, selector)?.flatten() {
                if let Some(value) = non_empty(value) {
                    return Ok(Some(value));
                }
            }
        }

        Ok(None)
    }

    /// Like [`Extractor::attribute`], trying each attribute name in turn
    pub async fn any_attribute(&self, selectors: &[&str], attributes: &[&str]) -> BrowserResult<Option<String>> {
        for attribute in attributes {
            if let Some(value) = self.attribute(selectors, attribute).await? {
                return Ok(Some(value));
            }
        }

        Ok(None)
    }

    /// First non-empty attribute on the node itself
    pub async fn own_attribute(&self, attributes: &[&str]) -> BrowserResult<Option<String>> {
        for attribute in attributes {
            if let Some(value) = missing(self.node.attribute(attribute).await, attribute)?.flatten() {
                if let Some(value) = non_empty(value) {
                    return Ok(Some(value));
                }
            }
        }

        Ok(None)
    }

    /// Whether any of the selectors matches a descendant
    pub async fn exists(&self, selectors: &[&str]) -> BrowserResult<bool> {
        for selector in selectors {
            if missing(self.node.find(selector).await, selector)?.flatten().is_some() {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Every distinct non-empty value of the first present attribute across all
    /// descendants matching `selector`, in document order
    pub async fn all_attributes(&self, selector: &str, attributes: &[&str]) -> BrowserResult<Vec<String>> {
        let elements = missing(self.node.find_all(selector).await, selector)?.unwrap_or_default();

        let mut values: Vec<String> = Vec::new();
        for element in elements {
            for attribute in attributes {
                let value = absorb(element.attribute(attribute).await, selector)?
                    .flatten()
                    .and_then(non_empty);

                if let Some(value) = value {
                    if !values.contains(&value) {
                        values.push(value);
                    }
                    break;
                }
            }
        }

        Ok(values)
    }
}

/// Turn a lookup miss on the node itself into "not found"
fn missing<T>(result: BrowserResult<T>, what: &str) -> BrowserResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e @ BrowserError::NoSuchElement(_)) => {
            debug!("Skipping {}: {}", what, e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Turn transient failures of a descendant into "not found"
fn absorb<T>(result: BrowserResult<T>, what: &str) -> BrowserResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_transient() => {
            debug!("Skipping {}: {}", what, e);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == value.len() {
        Some(value)
    } else {
        Some(trimmed.to_string())
    }
}

/// Keep only digits and the decimal point, then parse
///
/// `"$1,234.56"` becomes `1234.56`; empty or unparsable text yields `None`.
pub fn parse_price(text: Option<&str>) -> Option<f64> {
    let cleaned: String = text?
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    match cleaned.parse::<f64>() {
        Ok(price) => Some(price),
        Err(_) => {
            debug!("Could not parse price from {:?}", text);
            None
        }
    }
}
