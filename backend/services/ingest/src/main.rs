mod connector;
mod error;
mod hubspot;
mod pipeline;
#[cfg(test)]
mod test_support;
mod worker;

use std::sync::Arc;
use std::time::Duration;

use crmsync_config::{init_tracing, AppConfig, SyncConfig};
use crmsync_db::actions::pg_repository::PgActionRepository;
use crmsync_db::domain::pg_repository::PgDomainRepository;
use crmsync_db::domain::repositories::DomainRepository;
use crmsync_db::write_guard::WriteGuard;

use crate::hubspot::client::{HubSpotClient, HubSpotClientConfig};
use crate::hubspot::meetings::ContactCache;
use crate::pipeline::rate_limiter::RateLimiter;
use crate::worker::SyncWorker;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    init_tracing("info");

    tracing::info!(service = "crmsync-ingest", "starting");

    let app_config = AppConfig::from_env().expect("invalid application config");
    let sync_config = SyncConfig::from_env().expect("invalid sync config");
    let hubspot_config = HubSpotClientConfig::from_env().expect("invalid HubSpot config");

    let pool = crmsync_db::create_pool(&app_config.database_url)
        .await
        .expect("failed to connect to database");

    if !sync_config.persist_actions {
        tracing::warn!("SYNC_PERSIST_ACTIONS=false, action events will be discarded");
    }
    if !sync_config.persist_domain {
        tracing::warn!("SYNC_PERSIST_DOMAIN=false, tokens and watermarks will not be saved");
    }

    let domains = WriteGuard::new(PgDomainRepository::new(pool.clone()), sync_config.persist_domain);
    let sink = Arc::new(WriteGuard::new(
        PgActionRepository::new(pool.clone()),
        sync_config.persist_actions,
    ));

    let client = HubSpotClient::new(hubspot_config).expect("failed to create hubspot client");
    let limiter = Arc::new(RateLimiter::new(sync_config.limiter));
    let cache = Arc::new(ContactCache::new(
        sync_config.cache_ttl(),
        sync_config.cache_max_entries,
    ));

    let interval = sync_config.interval_secs;
    let worker = SyncWorker::new(domains, sink, client, sync_config, limiter, cache);

    match interval {
        None => run_once(&worker).await,
        Some(secs) => {
            tracing::info!(interval_secs = secs, "running on a schedule, Ctrl-C to stop");
            let mut ticker = tokio::time::interval(Duration::from_secs(secs));
            loop {
                tokio::select! {
                    _ = ticker.tick() => run_once(&worker).await,
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("shutdown signal received");
                        break;
                    }
                }
            }
        }
    }

    tracing::info!("ingest service finished");
}

async fn run_once<D>(worker: &SyncWorker<D>)
where
    D: DomainRepository,
{
    match worker.run().await {
        Ok(summary) => {
            for account in &summary.accounts {
                tracing::info!(
                    hub_id = %account.hub_id,
                    passes = account.passes.len(),
                    failed = account.failed.len(),
                    drained = account.drained.map(|d| d.items).unwrap_or(0),
                    saved = account.saved,
                    "account sync completed"
                );
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "sync run failed");
        }
    }
}
