//! File-based claim-run store
//!
//! # Layout
//!
//! ```text
//! {root}/{claim_id}/claim_runs/{run_id}/
//!     coverage_analysis.json        replaced per run
//!     decision_dossier_v1.json      append-only, N strictly increasing
//!     decision_dossier_v2.json
//!     confidence_summary.json       replaced per run
//!     routing_decision.json         replaced per run
//! ```
//!
//! Filesystem work runs on the blocking pool. Identifiers are validated on
//! construction and cannot contain path separators.

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

use core_kernel::{
    AdapterHealth, ClaimId, ClaimRunId, DomainPort, HealthCheckResult, HealthCheckable, PortError,
};
use domain_claims::{dossier_file_name, parse_dossier_version, DecisionDossier, DossierRepository};
use domain_confidence::{ConfidenceSummary, RoutingDecision};
use domain_coverage::CoverageAnalysisResult;

use crate::error::StoreError;
use crate::fs;

pub const COVERAGE_FILE: &str = "coverage_analysis.json";
pub const CONFIDENCE_FILE: &str = "confidence_summary.json";
pub const ROUTING_FILE: &str = "routing_decision.json";
const RUNS_DIR: &str = "claim_runs";

#[derive(Debug, Clone)]
pub struct ClaimRunStore {
    root: Arc<PathBuf>,
}

impl ClaimRunStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Arc::new(root.into()),
        }
    }

    /// Opens the store, creating the root directory if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self::new(root);
        fs::ensure_dir(&store.root)?;
        info!(root = %store.root.display(), "Claim-run store opened");
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self, claim_id: &ClaimId, run_id: &ClaimRunId) -> PathBuf {
        self.root
            .join(claim_id.as_str())
            .join(RUNS_DIR)
            .join(run_id.as_str())
    }

    pub fn dossier_path(&self, claim_id: &ClaimId, run_id: &ClaimRunId, version: u32) -> PathBuf {
        self.run_dir(claim_id, run_id).join(dossier_file_name(version))
    }

    async fn blocking<T, F>(&self, task: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    {
        tokio::task::spawn_blocking(task)
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    async fn replace<T: Serialize>(&self, dir: PathBuf, file: &str, value: &T) -> Result<PathBuf, StoreError> {
        let path = dir.join(file);
        let bytes = fs::encode(&path, value)?;
        self.blocking(move || {
            fs::ensure_dir(&dir)?;
            fs::atomic_write(&path, &bytes)?;
            Ok(path)
        })
        .await
    }

    async fn read_opt<T>(&self, path: PathBuf) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.blocking(move || fs::read_json_opt(&path)).await
    }

    #[instrument(skip(self, coverage), fields(claim_id = %coverage.claim_id, run_id = %run_id))]
    pub async fn save_coverage(&self, run_id: &ClaimRunId, coverage: &CoverageAnalysisResult) -> Result<PathBuf, StoreError> {
        let path = self
            .replace(self.run_dir(&coverage.claim_id, run_id), COVERAGE_FILE, coverage)
            .await?;
        debug!(path = %path.display(), "Coverage analysis written");
        Ok(path)
    }

    #[instrument(skip(self, summary), fields(claim_id = %summary.claim_id, run_id = %run_id))]
    pub async fn save_confidence(&self, run_id: &ClaimRunId, summary: &ConfidenceSummary) -> Result<PathBuf, StoreError> {
        let path = self
            .replace(self.run_dir(&summary.claim_id, run_id), CONFIDENCE_FILE, summary)
            .await?;
        debug!(path = %path.display(), "Confidence summary written");
        Ok(path)
    }

    #[instrument(skip(self, routing), fields(claim_id = %routing.claim_id, run_id = %run_id))]
    pub async fn save_routing(&self, run_id: &ClaimRunId, routing: &RoutingDecision) -> Result<PathBuf, StoreError> {
        let path = self
            .replace(self.run_dir(&routing.claim_id, run_id), ROUTING_FILE, routing)
            .await?;
        debug!(path = %path.display(), "Routing decision written");
        Ok(path)
    }

    pub async fn load_coverage(&self, claim_id: &ClaimId, run_id: &ClaimRunId) -> Result<Option<CoverageAnalysisResult>, StoreError> {
        self.read_opt(self.run_dir(claim_id, run_id).join(COVERAGE_FILE)).await
    }

    pub async fn load_confidence(&self, claim_id: &ClaimId, run_id: &ClaimRunId) -> Result<Option<ConfidenceSummary>, StoreError> {
        self.read_opt(self.run_dir(claim_id, run_id).join(CONFIDENCE_FILE)).await
    }

    pub async fn load_routing(&self, claim_id: &ClaimId, run_id: &ClaimRunId) -> Result<Option<RoutingDecision>, StoreError> {
        self.read_opt(self.run_dir(claim_id, run_id).join(ROUTING_FILE)).await
    }

    /// Runs recorded for a claim, sorted by id
    pub async fn list_runs(&self, claim_id: &ClaimId) -> Result<Vec<ClaimRunId>, StoreError> {
        let dir = self.root.join(claim_id.as_str()).join(RUNS_DIR);
        let names = self.blocking(move || fs::list_file_names(&dir)).await?;
        Ok(names
            .into_iter()
            .filter_map(|name| ClaimRunId::new(name).ok())
            .collect())
    }

    async fn dossier_versions(&self, claim_id: &ClaimId, run_id: &ClaimRunId) -> Result<Vec<u32>, StoreError> {
        let dir = self.run_dir(claim_id, run_id);
        let names = self.blocking(move || fs::list_file_names(&dir)).await?;
        let mut versions: Vec<u32> = names.iter().filter_map(|n| parse_dossier_version(n)).collect();
        versions.sort_unstable();
        Ok(versions)
    }
}

impl DomainPort for ClaimRunStore {}

#[async_trait]
impl DossierRepository for ClaimRunStore {
    async fn count_versions(&self, claim_id: &ClaimId, run_id: &ClaimRunId) -> Result<u32, PortError> {
        let versions = self.dossier_versions(claim_id, run_id).await?;
        Ok(versions.len() as u32)
    }

    #[instrument(skip(self, dossier), fields(claim_id = %dossier.claim_id, run_id = %dossier.run_id, version = dossier.version))]
    async fn append_dossier(&self, dossier: &DecisionDossier) -> Result<(), PortError> {
        if dossier.version == 0 {
            return Err(PortError::validation("dossier versions start at 1"));
        }
        let dir = self.run_dir(&dossier.claim_id, &dossier.run_id);
        let path = dir.join(dossier.file_name());
        let bytes = fs::encode(&path, dossier)?;
        self.blocking(move || {
            fs::ensure_dir(&dir)?;
            fs::write_new(&path, &bytes)
        })
        .await?;
        debug!("Dossier version written");
        Ok(())
    }

    async fn list_versions(&self, claim_id: &ClaimId, run_id: &ClaimRunId) -> Result<Vec<u32>, PortError> {
        Ok(self.dossier_versions(claim_id, run_id).await?)
    }

    async fn load_dossier(
        &self,
        claim_id: &ClaimId,
        run_id: &ClaimRunId,
        version: u32,
    ) -> Result<DecisionDossier, PortError> {
        let path = self.dossier_path(claim_id, run_id, version);
        let dossier = self.blocking(move || fs::read_json(&path)).await?;
        Ok(dossier)
    }
}

#[async_trait]
impl HealthCheckable for ClaimRunStore {
    /// Writes and removes a probe file under the root
    async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let probe = self.root.join(format!(".health.tmp.{}", std::process::id()));
        let result = self
            .blocking(move || {
                fs::atomic_write(&probe, b"ok")?;
                std::fs::remove_file(&probe).map_err(|e| StoreError::io(&probe, e))
            })
            .await;

        let (status, message) = match result {
            Ok(()) => (AdapterHealth::Healthy, None),
            Err(e) => (AdapterHealth::Unhealthy, Some(format!("Store root not writable: {}", e))),
        };
        HealthCheckResult {
            adapter_id: "claim-run-store".to_string(),
            status,
            latency_ms: start.elapsed().as_millis() as u64,
            message,
            checked_at: Utc::now(),
        }
    }
}
