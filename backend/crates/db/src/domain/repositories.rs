use async_trait::async_trait;

use crate::domain::models::Domain;
use crmsync_common::error::CrmsyncResult;

#[async_trait]
pub trait DomainRepository: Send + Sync {
    /// Load the domain whose accounts are synchronized in this run.
    async fn load_domain(&self) -> CrmsyncResult<Domain>;

    /// Persist the domain, including per-account tokens and watermarks.
    async fn save_domain(&self, domain: &Domain) -> CrmsyncResult<()>;
}
