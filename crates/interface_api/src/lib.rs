//! HTTP API Layer
//!
//! REST surface and run pipeline of the adjudication engine, built on Axum.
//!
//! # Architecture
//!
//! - **Pipeline**: `ClaimRunPipeline` sequences coverage, decision,
//!   confidence and routing for one claim run
//! - **Handlers**: claim-run execution, artefact reads, health
//! - **Middleware**: request ids and request logging
//! - **DTOs**: validated request bodies and response views
//! - **Error Handling**: consistent JSON error responses
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::{build_state, create_router, config::AppConfig};
//!
//! let state = build_state(AppConfig::load()?)?;
//! axum::serve(listener, create_router(state)).await?;
//! ```

pub mod config;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod pipeline;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use domain_claims::EngineRegistry;
use domain_coverage::adapters::HttpModelAdapter;
use domain_coverage::GenerativeModelPort;
use infra_store::ClaimRunStore;

use crate::config::AppConfig;
use crate::handlers::{claims, health};
use crate::middleware::request_log_middleware;
use crate::pipeline::{ClaimRunPipeline, PipelineError};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ClaimRunPipeline>,
    pub store: Arc<ClaimRunStore>,
    pub model: Option<Arc<dyn GenerativeModelPort>>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(
        pipeline: ClaimRunPipeline,
        model: Option<Arc<dyn GenerativeModelPort>>,
        config: AppConfig,
    ) -> Self {
        Self {
            store: pipeline.store().clone(),
            pipeline: Arc::new(pipeline),
            model,
            config: Arc::new(config),
        }
    }
}

/// Opens the store, connects the model adapter if enabled and builds the pipeline
///
/// Fails when the configured decision engine is not registered.
pub fn build_state(config: AppConfig) -> Result<AppState, PipelineError> {
    build_state_with(config, EngineRegistry::with_defaults())
}

pub fn build_state_with(config: AppConfig, registry: EngineRegistry) -> Result<AppState, PipelineError> {
    let store = Arc::new(ClaimRunStore::open(&config.store.root)?);
    let model: Option<Arc<dyn GenerativeModelPort>> = if config.model.enabled {
        let adapter = HttpModelAdapter::new(config.model.http.clone())?;
        Some(Arc::new(adapter))
    } else {
        tracing::warn!("Generative model disabled; unresolved items will need review");
        None
    };

    let pipeline = ClaimRunPipeline::from_config(&config, &registry, model.clone(), store)?;
    Ok(AppState::new(pipeline, model, config))
}

/// Creates the main API router
pub fn create_router(state: AppState) -> Router {
    // Public routes
    let health_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    // Claim-run routes
    let claims_routes = Router::new()
        .route("/:claim_id/runs", post(claims::execute_run).get(claims::list_runs))
        .route("/:claim_id/runs/:run_id/dossiers", get(claims::list_dossiers))
        .route("/:claim_id/runs/:run_id/dossiers/latest", get(claims::latest_dossier))
        .route("/:claim_id/runs/:run_id/dossiers/:version", get(claims::get_dossier))
        .route("/:claim_id/runs/:run_id/coverage", get(claims::get_coverage))
        .route("/:claim_id/runs/:run_id/confidence", get(claims::get_confidence))
        .route("/:claim_id/runs/:run_id/routing", get(claims::get_routing));

    let api_routes = Router::new()
        .nest("/claims", claims_routes)
        .layer(axum_middleware::from_fn(request_log_middleware));

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
