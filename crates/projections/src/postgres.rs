use async_trait::async_trait;
use common::OrderId;
use event_store::error::is_transient_sqlx;
use sqlx::PgPool;

use crate::document::{OrderProjection, OrderProjectionPatch};
use crate::store::ProjectionStore;
use crate::{ProjectionError, Result};

const PRIMARY_KEY_CONSTRAINT: &str = "order_projections_pkey";

/// PostgreSQL-backed projection store.
///
/// Documents live in a JSONB column; updates merge the serialized patch into
/// the stored document with `||`, so only the fields a patch sets change.
#[derive(Clone)]
pub struct PostgresProjectionStore {
    pool: PgPool,
}

impl PostgresProjectionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn map_sqlx(err: sqlx::Error) -> ProjectionError {
    if is_transient_sqlx(&err) {
        ProjectionError::StoreUnavailable(err.to_string())
    } else {
        ProjectionError::Database(err)
    }
}

#[async_trait]
impl ProjectionStore for PostgresProjectionStore {
    #[tracing::instrument(skip(self, document), fields(order_id = %document.order_id))]
    async fn insert(&self, document: OrderProjection) -> Result<()> {
        let order_id = document.order_id;
        let body = serde_json::to_value(&document)?;

        sqlx::query("INSERT INTO order_projections (order_id, document) VALUES ($1, $2)")
            .bind(order_id.as_uuid())
            .bind(body)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some(PRIMARY_KEY_CONSTRAINT)
                {
                    return ProjectionError::DocumentExists(order_id);
                }
                map_sqlx(e)
            })?;

        Ok(())
    }

    async fn find_by_id(&self, order_id: OrderId) -> Result<Option<OrderProjection>> {
        let body: Option<serde_json::Value> =
            sqlx::query_scalar("SELECT document FROM order_projections WHERE order_id = $1")
                .bind(order_id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)?;

        body.map(serde_json::from_value)
            .transpose()
            .map_err(ProjectionError::from)
    }

    #[tracing::instrument(skip(self, patch))]
    async fn update(&self, order_id: OrderId, patch: &OrderProjectionPatch) -> Result<()> {
        let body = serde_json::to_value(patch)?;

        let result = sqlx::query(
            r#"
            UPDATE order_projections
            SET document = document || $2, updated_at = NOW()
            WHERE order_id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(body)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(ProjectionError::MissingDocument(order_id));
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM order_projections")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        Ok(())
    }
}
