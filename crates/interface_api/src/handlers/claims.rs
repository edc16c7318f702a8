//! Claim-run handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;
use validator::Validate;

use core_kernel::{ClaimId, ClaimRunId};
use domain_claims::{DecisionDossier, DossierRepository};
use domain_confidence::{ConfidenceSummary, RoutingDecision};
use domain_coverage::CoverageAnalysisResult;

use crate::dto::claims::*;
use crate::error::ApiError;
use crate::pipeline::ClaimRunOutcome;
use crate::AppState;

fn parse_run(claim_id: &str, run_id: &str) -> Result<(ClaimId, ClaimRunId), ApiError> {
    Ok((ClaimId::new(claim_id)?, ClaimRunId::new(run_id)?))
}

fn missing(what: &str, claim_id: &ClaimId, run_id: &ClaimRunId) -> ApiError {
    ApiError::NotFound(format!("No {} for claim {} run {}", what, claim_id, run_id))
}

/// Executes a claim run end to end
///
/// Stage failures do not fail the request; they are reported in the
/// outcome's `stage_errors`.
pub async fn execute_run(
    State(state): State<AppState>,
    Path(claim_id): Path<String>,
    Json(request): Json<ExecuteRunRequest>,
) -> Result<(StatusCode, Json<ClaimRunOutcome>), ApiError> {
    request.validate()?;
    let claim_id = ClaimId::new(claim_id)?;
    let run_id = match &request.run_id {
        Some(id) => ClaimRunId::new(id.as_str())?,
        None => ClaimRunId::generate(),
    };

    info!(claim_id = %claim_id, run_id = %run_id, items = request.line_items.len(), "Claim run requested");
    let outcome = state.pipeline.run(&claim_id, &run_id, request.into_input()).await;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn list_runs(
    State(state): State<AppState>,
    Path(claim_id): Path<String>,
) -> Result<Json<RunsResponse>, ApiError> {
    let claim_id = ClaimId::new(claim_id)?;
    let runs = state.store.list_runs(&claim_id).await?;
    Ok(Json(RunsResponse {
        claim_id: claim_id.to_string(),
        runs: runs.into_iter().map(String::from).collect(),
    }))
}

pub async fn list_dossiers(
    State(state): State<AppState>,
    Path((claim_id, run_id)): Path<(String, String)>,
) -> Result<Json<DossierVersionsResponse>, ApiError> {
    let (claim_id, run_id) = parse_run(&claim_id, &run_id)?;
    let versions = state.store.list_versions(&claim_id, &run_id).await?;
    Ok(Json(DossierVersionsResponse {
        claim_id: claim_id.to_string(),
        run_id: run_id.to_string(),
        latest: versions.last().copied(),
        versions,
    }))
}

pub async fn latest_dossier(
    State(state): State<AppState>,
    Path((claim_id, run_id)): Path<(String, String)>,
) -> Result<Json<DecisionDossier>, ApiError> {
    let (claim_id, run_id) = parse_run(&claim_id, &run_id)?;
    state
        .store
        .latest_dossier(&claim_id, &run_id)
        .await?
        .map(Json)
        .ok_or_else(|| missing("dossier", &claim_id, &run_id))
}

pub async fn get_dossier(
    State(state): State<AppState>,
    Path((claim_id, run_id, version)): Path<(String, String, u32)>,
) -> Result<Json<DecisionDossier>, ApiError> {
    let (claim_id, run_id) = parse_run(&claim_id, &run_id)?;
    let dossier = state.store.load_dossier(&claim_id, &run_id, version).await?;
    Ok(Json(dossier))
}

pub async fn get_coverage(
    State(state): State<AppState>,
    Path((claim_id, run_id)): Path<(String, String)>,
) -> Result<Json<CoverageAnalysisResult>, ApiError> {
    let (claim_id, run_id) = parse_run(&claim_id, &run_id)?;
    state
        .store
        .load_coverage(&claim_id, &run_id)
        .await?
        .map(Json)
        .ok_or_else(|| missing("coverage analysis", &claim_id, &run_id))
}

pub async fn get_confidence(
    State(state): State<AppState>,
    Path((claim_id, run_id)): Path<(String, String)>,
) -> Result<Json<ConfidenceSummary>, ApiError> {
    let (claim_id, run_id) = parse_run(&claim_id, &run_id)?;
    state
        .store
        .load_confidence(&claim_id, &run_id)
        .await?
        .map(Json)
        .ok_or_else(|| missing("confidence summary", &claim_id, &run_id))
}

pub async fn get_routing(
    State(state): State<AppState>,
    Path((claim_id, run_id)): Path<(String, String)>,
) -> Result<Json<RoutingDecision>, ApiError> {
    let (claim_id, run_id) = parse_run(&claim_id, &run_id)?;
    state
        .store
        .load_routing(&claim_id, &run_id)
        .await?
        .map(Json)
        .ok_or_else(|| missing("routing decision", &claim_id, &run_id))
}
