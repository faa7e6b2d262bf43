//! Lifecycle analysis handler
//!
//! POST /v1/analyze accepts the full record set — eligible and ineligible —
//! and either streams protocol events over SSE or, with `"stream": false`,
//! runs the same chunked dispatch to completion and answers with one JSON
//! body.

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use partforge_common::{
    errors::{AppError, Result},
    metrics::record_classifier_call,
    model::{ClassificationResult, PartRecord},
};
use partforge_engine::{
    chunk::partition,
    dispatch::{Dispatcher, DispatcherSettings},
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use validator::Validate;

use super::JobGuard;
use crate::AppState;

/// Request to analyze a part list
#[derive(Debug, Deserialize, Validate)]
pub struct AnalyzeRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "No parts provided"))]
    pub parts: Vec<PartRecord>,

    /// Stream results as server-sent events instead of a single JSON body
    #[serde(default)]
    pub stream: bool,
}

/// Non-streaming response
#[derive(Serialize)]
pub struct AnalyzeResponse {
    pub success: bool,
    pub results: Vec<ClassificationResult>,
    pub total_analyzed: usize,
    pub total_skipped: usize,
}

/// Analyze part lifecycle status
pub async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Response> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("parts".to_string()),
    })?;

    // Rows with no identity at all never reach the engine
    let parts: Vec<PartRecord> = request
        .parts
        .into_iter()
        .filter(|p| !p.is_blank())
        .collect();

    if parts.is_empty() {
        return Err(AppError::Validation {
            message: "No parts provided".to_string(),
            field: Some("parts".to_string()),
        });
    }

    let plan = partition(&parts, state.config.dispatch.chunk_size);

    tracing::info!(
        total_records = plan.total_records,
        eligible = plan.total_eligible(),
        skipped = plan.total_skipped(),
        chunks = plan.total_chunks(),
        stream = request.stream,
        "Analysis job accepted"
    );

    let job_guard = JobGuard::start("classify", plan.total_records, plan.total_skipped());

    let cancel = CancellationToken::new();
    let dispatcher = Dispatcher::new(
        DispatcherSettings::from(&state.config.dispatch),
        cancel.clone(),
    );

    let classifier = state.classifier.clone();
    let rx = dispatcher.run(plan, move |parts| {
        let classifier = classifier.clone();
        async move {
            let started = Instant::now();
            let outcome = classifier.classify_chunk(&parts).await;
            record_classifier_call(
                started.elapsed().as_secs_f64(),
                classifier.model_name(),
                outcome.is_ok(),
            );
            outcome
        }
    });

    if request.stream {
        Ok(super::sse_response(rx, cancel.drop_guard(), job_guard).into_response())
    } else {
        let _cancel_guard = cancel.drop_guard();
        let _job_guard = job_guard;
        let (results, total_analyzed, total_skipped) = super::drain_results(rx).await?;
        Ok(Json(AnalyzeResponse {
            success: true,
            results,
            total_analyzed,
            total_skipped,
        })
        .into_response())
    }
}
