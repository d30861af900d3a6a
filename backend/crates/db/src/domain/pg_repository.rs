use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use sqlx::{postgres::PgRow, PgPool, Row};

use crate::domain::models::{Domain, HubSpotAccount};
use crate::domain::repositories::DomainRepository;
use crmsync_common::error::{CrmsyncError, CrmsyncResult};

#[derive(Clone)]
pub struct PgDomainRepository {
    pool: PgPool,
}

impl PgDomainRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: PgRow) -> CrmsyncResult<Domain> {
        let accounts: Json<Vec<HubSpotAccount>> = row
            .try_get("accounts")
            .map_err(|e| CrmsyncError::Database(format!("invalid accounts payload: {e}")))?;

        Ok(Domain {
            id: row.get("id"),
            api_key: row.get("api_key"),
            accounts: accounts.0,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl DomainRepository for PgDomainRepository {
    async fn load_domain(&self) -> CrmsyncResult<Domain> {
        let row = sqlx::query(
            "select id, api_key, accounts, created_at, updated_at
             from domains
             order by created_at asc
             limit 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CrmsyncError::Database(e.to_string()))?;

        match row {
            Some(r) => Self::map_row(r),
            None => Err(CrmsyncError::NotFound("no domain configured".to_string())),
        }
    }

    async fn save_domain(&self, domain: &Domain) -> CrmsyncResult<()> {
        let result = sqlx::query(
            "update domains
             set api_key = $1, accounts = $2, updated_at = $3
             where id = $4",
        )
        .bind(&domain.api_key)
        .bind(Json(&domain.accounts))
        .bind(Utc::now())
        .bind(domain.id)
        .execute(&self.pool)
        .await
        .map_err(|e| CrmsyncError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(CrmsyncError::NotFound(format!("domain {}", domain.id)));
        }

        Ok(())
    }
}
