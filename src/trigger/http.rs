use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::{error, info, warn};

use crate::trigger::{Dispatch, RunReport, ScrapeService, TriggerError};

/// Envelope shared by every response
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

type Reply = (StatusCode, Json<ApiResponse>);

#[derive(Debug, Deserialize)]
pub struct CategoryParams {
    url: String,
    #[serde(default = "default_category_name")]
    name: String,
}

fn default_category_name() -> String {
    "Category".to_string()
}

pub fn router(service: ScrapeService) -> Router {
    let api = Router::new()
        .route("/trigger", post(trigger))
        .route("/trigger/sync", post(trigger_sync))
        .route("/trigger/category", post(trigger_category))
        .route("/status", get(status))
        .route("/health", get(health));

    Router::new()
        .nest("/api/scraper", api)
        .with_state(service)
}

/// Serve the trigger API until ctrl-c
pub async fn serve(service: ScrapeService, bind: &str) -> Result<()> {
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid bind address {}", bind))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Trigger API listening on http://{}", addr);

    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server shutdown")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down trigger API");
}

async fn trigger(State(service): State<ScrapeService>) -> Reply {
    info!("Received scrape trigger request");

    match service.trigger_async() {
        Dispatch::Accepted => reply(StatusCode::ACCEPTED, "accepted", "Scraping task started", None),
        Dispatch::Busy => busy(),
    }
}

async fn trigger_sync(State(service): State<ScrapeService>) -> Reply {
    info!("Received synchronous scrape trigger request");

    match service.trigger_sync().await {
        Ok(run) => reply(
            StatusCode::OK,
            "success",
            "Scraping completed",
            Some(report_json(&RunReport::from_run(&run, None))),
        ),
        Err(e) => failed(e),
    }
}

async fn trigger_category(State(service): State<ScrapeService>, Query(params): Query<CategoryParams>) -> Reply {
    info!("Received category scrape trigger request for: {}", params.name);

    match service.trigger_category(&params.url, &params.name).await {
        Ok(run) => reply(
            StatusCode::OK,
            "success",
            "Category scraping completed",
            Some(report_json(&RunReport::from_run(&run, Some(&params.name)))),
        ),
        Err(e) => failed(e),
    }
}

async fn status(State(service): State<ScrapeService>) -> Reply {
    let status = service.status().await;
    let data = serde_json::to_value(&status).unwrap_or_default();
    reply(StatusCode::OK, "success", "Status retrieved", Some(data))
}

async fn health() -> Reply {
    let data = serde_json::json!({
        "status": "UP",
        "timestamp": Utc::now(),
    });
    reply(StatusCode::OK, "success", "Service is healthy", Some(data))
}

fn report_json(report: &RunReport) -> serde_json::Value {
    serde_json::to_value(report).unwrap_or_default()
}

fn failed(e: TriggerError) -> Reply {
    match e {
        TriggerError::Busy => busy(),
        TriggerError::Aborted(_) => reply(StatusCode::INTERNAL_SERVER_ERROR, "error", &e.to_string(), None),
    }
}

fn busy() -> Reply {
    warn!("Scraping is already in progress");
    reply(StatusCode::TOO_MANY_REQUESTS, "error", &TriggerError::Busy.to_string(), None)
}

fn reply(code: StatusCode, status: &str, message: &str, data: Option<serde_json::Value>) -> Reply {
    (
        code,
        Json(ApiResponse {
            status: status.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
            data,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::tests::service;

    #[tokio::test]
    async fn test_sync_trigger_reports_run() {
        let (code, Json(body)) = trigger_sync(State(service())).await;

        assert_eq!(code, StatusCode::OK);
        assert_eq!(body.status, "success");
        let data = body.data.expect("data");
        assert_eq!(data["productsScraped"], 2);
        assert!(data["errors"].as_array().unwrap().is_empty());
        assert!(data.get("startTime").is_some());
        assert!(data.get("endTime").is_some());
    }

    #[tokio::test]
    async fn test_busy_is_429() {
        let service = service();
        let _permit = service.guard().permit().expect("idle");

        let (code, Json(body)) = trigger(State(service.clone())).await;
        assert_eq!(code, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body.status, "error");
        assert_eq!(body.message, "Scraping is already in progress");

        let (code, _) = trigger_sync(State(service.clone())).await;
        assert_eq!(code, StatusCode::TOO_MANY_REQUESTS);

        let params = CategoryParams {
            url: "/c/tea".to_string(),
            name: default_category_name(),
        };
        let (code, _) = trigger_category(State(service), Query(params)).await;
        assert_eq!(code, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_category_trigger_uses_default_name() {
        let params: CategoryParams = serde_json::from_value(serde_json::json!({ "url": "/c/tea" })).unwrap();
        assert_eq!(params.name, "Category");

        let (code, Json(body)) = trigger_category(State(service()), Query(params)).await;

        assert_eq!(code, StatusCode::OK);
        let data = body.data.expect("data");
        assert_eq!(data["category"], "Category");
        assert_eq!(data["productsScraped"], 2);
    }

    #[tokio::test]
    async fn test_status_and_health() {
        let (code, Json(body)) = status(State(service())).await;
        assert_eq!(code, StatusCode::OK);
        let data = body.data.expect("data");
        assert_eq!(data["isRunning"], false);
        assert_eq!(data["productCount"], 0);
        assert!(data.get("timestamp").is_some());

        let (code, Json(body)) = health().await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body.data.expect("data")["status"], "UP");
    }

    #[test]
    fn test_router_builds() {
        let _ = router(service());
    }
}
