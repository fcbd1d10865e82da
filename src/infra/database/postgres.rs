//! PostgreSQL block store implementation.
//!
//! Every query here is read-only; the schema is owned by the chain indexer
//! that writes these tables.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgPool, Row, postgres::PgPoolOptions};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, instrument};

use crate::domain::{
    AppError, Block, BlockHeader, BlockStore, ContractUsage, DailyAmount, DailyCount,
    DatabaseError, HolderBalance, SortOrder, TransactionScope,
};

/// PostgreSQL connection pool configuration
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(3),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

/// PostgreSQL store client with connection pooling
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Create a new PostgreSQL client with custom configuration
    pub async fn new(database_url: &str, config: PostgresConfig) -> Result<Self, AppError> {
        info!("Connecting to PostgreSQL...");
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect(database_url)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Connection(e.to_string())))?;
        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Get the underlying connection pool (for testing)
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_header(row: &sqlx::postgres::PgRow) -> BlockHeader {
        BlockHeader {
            id: row.get("id"),
            tx: row.get("tx"),
            time: row.get("time"),
        }
    }
}

fn query_error(e: sqlx::Error) -> AppError {
    AppError::Database(DatabaseError::from(e))
}

#[async_trait]
impl BlockStore for PostgresClient {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Connection(e.to_string())))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn block_headers(
        &self,
        scope: &TransactionScope,
        order: SortOrder,
    ) -> Result<Vec<BlockHeader>, AppError> {
        // `order` is an enum rendered to a fixed keyword, never user text.
        let sql = format!(
            r#"
            SELECT b.id, SUM(s.tx)::BIGINT AS tx, b.time
            FROM blocks b
            JOIN block_scopes s ON s.block_id = b.id
            WHERE s.ecosystem = $1
              AND ($2::BIGINT IS NULL OR s.key_id = $2)
            GROUP BY b.id, b.time
            HAVING SUM(s.tx) > 0
            ORDER BY b.id {}
            "#,
            order.as_sql()
        );

        let rows = sqlx::query(&sql)
            .bind(scope.ecosystem)
            .bind(scope.actor)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;

        Ok(rows.iter().map(Self::row_to_header).collect())
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn blocks_by_ids(
        &self,
        scope: &TransactionScope,
        ids: &[i64],
    ) -> Result<Vec<Block>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT b.id, SUM(s.tx)::BIGINT AS tx, b.time, b.data
            FROM blocks b
            JOIN block_scopes s ON s.block_id = b.id
            WHERE b.id = ANY($1)
              AND s.ecosystem = $2
              AND ($3::BIGINT IS NULL OR s.key_id = $3)
            GROUP BY b.id, b.time, b.data
            "#,
        )
        .bind(ids)
        .bind(scope.ecosystem)
        .bind(scope.actor)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        let mut by_id: HashMap<i64, Block> = rows
            .iter()
            .map(|row| {
                let block = Block {
                    id: row.get("id"),
                    tx: row.get("tx"),
                    time: row.get("time"),
                    payload: row.get("data"),
                };
                (block.id, block)
            })
            .collect();

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    #[instrument(skip(self))]
    async fn blocks_after(&self, after: i64, limit: i64) -> Result<Vec<Block>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT b.id, COALESCE(SUM(s.tx), 0)::BIGINT AS tx, b.time, b.data
            FROM blocks b
            LEFT JOIN block_scopes s ON s.block_id = b.id
            WHERE b.id > $1
            GROUP BY b.id, b.time, b.data
            ORDER BY b.id ASC
            LIMIT $2
            "#,
        )
        .bind(after)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(rows
            .iter()
            .map(|row| Block {
                id: row.get("id"),
                tx: row.get("tx"),
                time: row.get("time"),
                payload: row.get("data"),
            })
            .collect())
    }

    #[instrument(skip(self))]
    async fn ecosystems(&self) -> Result<Vec<i64>, AppError> {
        let rows = sqlx::query_as::<_, (i64,)>("SELECT id FROM ecosystems ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    #[instrument(skip(self))]
    async fn holder_balances(
        &self,
        ecosystem: i64,
        limit: i64,
    ) -> Result<Vec<HolderBalance>, AppError> {
        let rows = sqlx::query_as::<_, (i64, String)>(
            r#"
            SELECT id, amount::TEXT
            FROM keys
            WHERE ecosystem = $1 AND amount > 0
            ORDER BY amount DESC, id ASC
            LIMIT $2
            "#,
        )
        .bind(ecosystem)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(rows
            .into_iter()
            .map(|(key_id, amount)| HolderBalance { key_id, amount })
            .collect())
    }

    #[instrument(skip(self))]
    async fn daily_transactions(
        &self,
        ecosystem: i64,
        days: i64,
    ) -> Result<Vec<DailyCount>, AppError> {
        let rows = sqlx::query_as::<_, (NaiveDate, i64)>(
            r#"
            SELECT to_timestamp(time)::DATE AS day, COUNT(*)::BIGINT AS count
            FROM tx_history
            WHERE ecosystem = $1
              AND time >= EXTRACT(EPOCH FROM NOW() - make_interval(days => $2::INT))::BIGINT
            GROUP BY day
            ORDER BY day
            "#,
        )
        .bind(ecosystem)
        .bind(days)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(rows
            .into_iter()
            .map(|(day, count)| DailyCount { day, count })
            .collect())
    }

    #[instrument(skip(self))]
    async fn total_fee_burn(&self, ecosystem: i64) -> Result<String, AppError> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(fee), 0)::TEXT AS total FROM tx_history WHERE ecosystem = $1",
        )
        .bind(ecosystem)
        .fetch_one(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(row.get("total"))
    }

    #[instrument(skip(self))]
    async fn daily_fee_burn(
        &self,
        ecosystem: i64,
        days: i64,
    ) -> Result<Vec<DailyAmount>, AppError> {
        let rows = sqlx::query_as::<_, (NaiveDate, String)>(
            r#"
            SELECT to_timestamp(time)::DATE AS day, SUM(fee)::TEXT AS amount
            FROM tx_history
            WHERE ecosystem = $1
              AND time >= EXTRACT(EPOCH FROM NOW() - make_interval(days => $2::INT))::BIGINT
            GROUP BY day
            ORDER BY day
            "#,
        )
        .bind(ecosystem)
        .bind(days)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(rows
            .into_iter()
            .map(|(day, amount)| DailyAmount { day, amount })
            .collect())
    }

    #[instrument(skip(self))]
    async fn top_contracts(
        &self,
        ecosystem: i64,
        limit: i64,
    ) -> Result<Vec<ContractUsage>, AppError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT contract_name, COUNT(*)::BIGINT AS calls
            FROM tx_history
            WHERE ecosystem = $1
            GROUP BY contract_name
            ORDER BY calls DESC, contract_name ASC
            LIMIT $2
            "#,
        )
        .bind(ecosystem)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(rows
            .into_iter()
            .map(|(contract_name, calls)| ContractUsage {
                contract_name,
                calls,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_config_default() {
        let config = PostgresConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, 2);
        assert_eq!(config.acquire_timeout, Duration::from_secs(3));
        assert_eq!(config.idle_timeout, Duration::from_secs(600));
        assert_eq!(config.max_lifetime, Duration::from_secs(1800));
    }
}
