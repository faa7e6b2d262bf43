//! Replacement search handler
//!
//! POST /v1/replacements runs the second enrichment pass over the records
//! already classified obsolete. A request with no obsolete records fails
//! fast with a validation error before any dispatch occurs.

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use partforge_common::{
    errors::{AppError, Result},
    metrics::record_classifier_call,
    model::{PartRecord, ReplacementResult},
};
use partforge_engine::{
    dispatch::{Dispatcher, DispatcherSettings},
    replacement::partition_for_replacement,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use validator::Validate;

use super::JobGuard;
use crate::AppState;

/// Request to find replacements for obsolete parts
#[derive(Debug, Deserialize, Validate)]
pub struct ReplacementsRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "No parts provided"))]
    pub parts: Vec<PartRecord>,

    /// Stream results as server-sent events instead of a single JSON body
    #[serde(default)]
    pub stream: bool,
}

/// Non-streaming response
#[derive(Serialize)]
pub struct ReplacementsResponse {
    pub success: bool,
    pub results: Vec<ReplacementResult>,
    pub total_analyzed: usize,
    pub total_skipped: usize,
}

/// Find replacement suggestions for obsolete parts
pub async fn replacements(
    State(state): State<AppState>,
    Json(request): Json<ReplacementsRequest>,
) -> Result<Response> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("parts".to_string()),
    })?;

    let plan = partition_for_replacement(&request.parts, state.config.dispatch.chunk_size);

    if plan.total_eligible() == 0 {
        return Err(AppError::NoEligibleParts {
            operation: "replacement search".to_string(),
        });
    }

    tracing::info!(
        total_records = plan.total_records,
        obsolete = plan.total_eligible(),
        chunks = plan.total_chunks(),
        stream = request.stream,
        "Replacement job accepted"
    );

    let job_guard = JobGuard::start("replacement", plan.total_records, plan.total_skipped());

    let cancel = CancellationToken::new();
    let dispatcher = Dispatcher::new(
        DispatcherSettings::from(&state.config.dispatch),
        cancel.clone(),
    );

    let finder = state.replacement_finder.clone();
    let model = state.config.classifier.model.clone();
    let rx = dispatcher.run(plan, move |parts| {
        let finder = finder.clone();
        let model = model.clone();
        async move {
            let started = Instant::now();
            let outcome = finder.find_replacements(&parts).await;
            record_classifier_call(started.elapsed().as_secs_f64(), &model, outcome.is_ok());
            outcome
        }
    });

    if request.stream {
        Ok(super::sse_response(rx, cancel.drop_guard(), job_guard).into_response())
    } else {
        let _cancel_guard = cancel.drop_guard();
        let _job_guard = job_guard;
        let (results, total_analyzed, total_skipped) = super::drain_results(rx).await?;
        Ok(Json(ReplacementsResponse {
            success: true,
            results,
            total_analyzed,
            total_skipped,
        })
        .into_response())
    }
}
