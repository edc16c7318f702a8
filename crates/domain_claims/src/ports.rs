//! Dossier persistence port
//!
//! The decision stage only needs to count, append and read dossier versions
//! of one claim run. Appends must never replace an existing version: an
//! implementation returns `PortError::Conflict` when the version is taken.

use async_trait::async_trait;

use core_kernel::{ClaimId, ClaimRunId, DomainPort, PortError};

use crate::dossier::DecisionDossier;

#[async_trait]
pub trait DossierRepository: DomainPort {
    /// Number of dossier versions already written for the run
    async fn count_versions(&self, claim_id: &ClaimId, run_id: &ClaimRunId) -> Result<u32, PortError>;

    /// Writes `dossier` under its version; `Conflict` if that version exists
    async fn append_dossier(&self, dossier: &DecisionDossier) -> Result<(), PortError>;

    /// All versions present for the run, ascending
    async fn list_versions(&self, claim_id: &ClaimId, run_id: &ClaimRunId) -> Result<Vec<u32>, PortError>;

    async fn load_dossier(
        &self,
        claim_id: &ClaimId,
        run_id: &ClaimRunId,
        version: u32,
    ) -> Result<DecisionDossier, PortError>;

    /// Highest version, or `None` when the run has no dossier yet
    async fn latest_dossier(
        &self,
        claim_id: &ClaimId,
        run_id: &ClaimRunId,
    ) -> Result<Option<DecisionDossier>, PortError> {
        match self.list_versions(claim_id, run_id).await?.last() {
            Some(&version) => self.load_dossier(claim_id, run_id, version).await.map(Some),
            None => Ok(None),
        }
    }
}

/// In-memory repository for tests
#[cfg(any(test, feature = "mock"))]
pub mod mock {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::RwLock;

    type RunKey = (ClaimId, ClaimRunId);

    #[derive(Debug, Default)]
    pub struct InMemoryDossierRepository {
        dossiers: RwLock<BTreeMap<RunKey, BTreeMap<u32, DecisionDossier>>>,
        /// Appends that will report a conflict before succeeding
        pending_conflicts: AtomicU32,
    }

    impl InMemoryDossierRepository {
        pub fn new() -> Self {
            Self::default()
        }

        /// Simulates another writer taking the next `count` versions first
        pub fn with_conflicts(self, count: u32) -> Self {
            self.pending_conflicts.store(count, Ordering::SeqCst);
            self
        }

        pub async fn all(&self, claim_id: &ClaimId, run_id: &ClaimRunId) -> Vec<DecisionDossier> {
            self.dossiers
                .read()
                .await
                .get(&(claim_id.clone(), run_id.clone()))
                .map(|versions| versions.values().cloned().collect())
                .unwrap_or_default()
        }
    }

    impl DomainPort for InMemoryDossierRepository {}

    #[async_trait]
    impl DossierRepository for InMemoryDossierRepository {
        async fn count_versions(&self, claim_id: &ClaimId, run_id: &ClaimRunId) -> Result<u32, PortError> {
            Ok(self.list_versions(claim_id, run_id).await?.len() as u32)
        }

        async fn append_dossier(&self, dossier: &DecisionDossier) -> Result<(), PortError> {
            let mut dossiers = self.dossiers.write().await;
            let versions = dossiers
                .entry((dossier.claim_id.clone(), dossier.run_id.clone()))
                .or_default();

            let injected = self
                .pending_conflicts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if injected {
                // The competing writer's dossier occupies the slot
                versions.entry(dossier.version).or_insert_with(|| dossier.clone());
            } else if !versions.contains_key(&dossier.version) {
                versions.insert(dossier.version, dossier.clone());
                return Ok(());
            }
            Err(PortError::conflict(format!("{} already exists", dossier.file_name())))
        }

        async fn list_versions(&self, claim_id: &ClaimId, run_id: &ClaimRunId) -> Result<Vec<u32>, PortError> {
            Ok(self
                .dossiers
                .read()
                .await
                .get(&(claim_id.clone(), run_id.clone()))
                .map(|versions| versions.keys().copied().collect())
                .unwrap_or_default())
        }

        async fn load_dossier(
            &self,
            claim_id: &ClaimId,
            run_id: &ClaimRunId,
            version: u32,
        ) -> Result<DecisionDossier, PortError> {
            self.dossiers
                .read()
                .await
                .get(&(claim_id.clone(), run_id.clone()))
                .and_then(|versions| versions.get(&version))
                .cloned()
                .ok_or_else(|| PortError::not_found("DecisionDossier", format!("{}/{}/v{}", claim_id, run_id, version)))
        }
    }
}
