use async_trait::async_trait;

use crate::actions::models::ActionEvent;
use crate::actions::repositories::ActionRepository;
use crate::domain::models::Domain;
use crate::domain::repositories::DomainRepository;
use crmsync_common::error::CrmsyncResult;

/// Wraps a repository so that writes can be switched off (dry run).
///
/// Reads always pass through. Skipped writes are logged at `warn` so a
/// dry run is visible in the output.
pub struct WriteGuard<R> {
    inner: R,
    enabled: bool,
}

impl<R> WriteGuard<R> {
    pub fn new(inner: R, enabled: bool) -> Self {
        Self { inner, enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[async_trait]
impl<R> ActionRepository for WriteGuard<R>
where
    R: ActionRepository,
{
    async fn append_actions(&self, actions: &[ActionEvent]) -> CrmsyncResult<usize> {
        if !self.enabled {
            tracing::warn!(
                count = actions.len(),
                "action persistence disabled, discarding batch"
            );
            return Ok(0);
        }
        self.inner.append_actions(actions).await
    }
}

#[async_trait]
impl<R> DomainRepository for WriteGuard<R>
where
    R: DomainRepository,
{
    async fn load_domain(&self) -> CrmsyncResult<Domain> {
        self.inner.load_domain().await
    }

    async fn save_domain(&self, domain: &Domain) -> CrmsyncResult<()> {
        if !self.enabled {
            tracing::warn!(domain_id = %domain.id, "domain persistence disabled, skipping save");
            return Ok(());
        }
        self.inner.save_domain(domain).await
    }
}
