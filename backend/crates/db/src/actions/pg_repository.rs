use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::actions::models::ActionEvent;
use crate::actions::repositories::ActionRepository;
use crmsync_common::error::{CrmsyncError, CrmsyncResult};

/// Rows per INSERT statement; keeps bind parameters well under the
/// Postgres limit of 65535.
const INSERT_CHUNK: usize = 500;

#[derive(Clone)]
pub struct PgActionRepository {
    pool: PgPool,
}

impl PgActionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActionRepository for PgActionRepository {
    async fn append_actions(&self, actions: &[ActionEvent]) -> CrmsyncResult<usize> {
        if actions.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CrmsyncError::Database(e.to_string()))?;

        let mut written = 0usize;
        for chunk in actions.chunks(INSERT_CHUNK) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
                "insert into actions (id, action_name, action_date, include_in_analytics, identity, properties, created_at, updated_at) ",
            );
            qb.push_values(chunk, |mut b, action| {
                b.push_bind(action.id)
                    .push_bind(action.action_name.to_string())
                    .push_bind(action.action_date)
                    .push_bind(action.include_in_analytics)
                    .push_bind(action.identity.clone())
                    .push_bind(Json(action.properties.clone()))
                    .push_bind(now)
                    .push_bind(now);
            });

            let result = qb
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| CrmsyncError::Database(e.to_string()))?;
            written += result.rows_affected() as usize;
        }

        tx.commit()
            .await
            .map_err(|e| CrmsyncError::Database(e.to_string()))?;

        tracing::debug!(count = written, "actions batch inserted");
        Ok(written)
    }
}
