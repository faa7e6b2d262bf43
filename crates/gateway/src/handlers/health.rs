//! Health check handlers

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub classifier: CheckResult,
}

#[derive(Serialize)]
pub struct CheckResult {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Liveness probe - always returns healthy if server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

/// Readiness probe - checks the classifier configuration
pub async fn ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    let classifier_configured = state.config.classifier.provider != "openai"
        || state.config.classifier.api_key.is_some();

    let classifier_check = if classifier_configured {
        CheckResult {
            status: "up".to_string(),
            model: Some(state.classifier.model_name().to_string()),
            error: None,
        }
    } else {
        CheckResult {
            status: "down".to_string(),
            model: None,
            error: Some("classifier API key not configured".to_string()),
        }
    };

    let all_healthy = classifier_check.status == "up";

    Json(ReadyResponse {
        status: if all_healthy { "ready" } else { "not_ready" }.to_string(),
        checks: HealthChecks {
            classifier: classifier_check,
        },
    })
}
