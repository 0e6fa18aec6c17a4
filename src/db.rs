//! Warehouse access
//!
//! Read-only queries against the ETL control and data-quality tables. Each
//! operation checks a client out of the pool for its own scope; the client
//! goes back to the pool when the guard drops, on success or on error.

pub mod queries;

use crate::config::DatabaseConfig;
use crate::error::AppError;
use crate::models::{
    EtlControlRow, IntegrityProbe, LoadSummaryCounts, ObjectKind, QualityCounts, RowLimit,
    SchemaObject,
};
use async_trait::async_trait;
use deadpool_postgres::{
    Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime, Timeouts,
};
use std::time::Duration;
use tokio_postgres::NoTls;
use tracing::{debug, info};

/// Read operations the API needs from the warehouse
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Round trip used by the readiness endpoint
    async fn ping(&self) -> Result<(), AppError>;

    async fn load_summary(&self) -> Result<LoadSummaryCounts, AppError>;

    async fn recent_loads(&self, limit: RowLimit) -> Result<Vec<EtlControlRow>, AppError>;

    async fn quality_counts(&self) -> Result<QualityCounts, AppError>;

    async fn object_exists(&self, object: &SchemaObject) -> Result<bool, AppError>;

    /// Number of rows violating `probe`
    async fn integrity_violations(&self, probe: IntegrityProbe) -> Result<i64, AppError>;
}

/// PostgreSQL-backed warehouse client
pub struct WarehouseClient {
    pool: Pool,
    ping_timeout: Duration,
}

impl WarehouseClient {
    /// Build the pool. No connection is opened until the first query.
    pub fn new(config: &DatabaseConfig) -> Result<Self, AppError> {
        let pool = create_pool(config)?;
        info!(
            "Warehouse pool configured for {}:{}/{} (TLS: {}, max connections: {})",
            config.host, config.port, config.database, config.require_tls, config.max_pool_size
        );
        Ok(Self {
            pool,
            ping_timeout: config.connect_timeout,
        })
    }

    async fn count(&self, sql: &str, params: &[&(dyn tokio_postgres::types::ToSql + Sync)]) -> Result<i64, AppError> {
        let client = self.pool.get().await?;
        let row = client.query_one(sql, params).await?;
        Ok(row.get(0))
    }
}

#[async_trait]
impl Warehouse for WarehouseClient {
    async fn ping(&self) -> Result<(), AppError> {
        // A host can accept the socket and never answer; bound the whole round trip.
        let round_trip = async {
            let client = self.pool.get().await?;
            client.query_one(queries::PING, &[]).await?;
            Ok::<(), AppError>(())
        };
        tokio::time::timeout(self.ping_timeout, round_trip)
            .await
            .map_err(|_| {
                AppError::Unavailable(format!(
                    "Warehouse did not answer within {:?}",
                    self.ping_timeout
                ))
            })?
    }

    async fn load_summary(&self) -> Result<LoadSummaryCounts, AppError> {
        let client = self.pool.get().await?;
        let row = client.query_one(queries::LOAD_SUMMARY, &[]).await?;

        Ok(LoadSummaryCounts {
            total: row.get(0),
            successful: row.get(1),
            total_records: row.get(2),
            avg_duration_minutes: row.get(3),
        })
    }

    async fn recent_loads(&self, limit: RowLimit) -> Result<Vec<EtlControlRow>, AppError> {
        let client = self.pool.get().await?;
        let rows = client.query(queries::RECENT_LOADS, &[&limit.get()]).await?;
        debug!("Fetched {} control rows (limit {})", rows.len(), limit.get());

        Ok(rows
            .into_iter()
            .map(|r| EtlControlRow {
                table_name: r.get(0),
                load_date: r.get(1),
                status: r.get(2),
                records_processed: r.get(3),
                modified_date: r.get(4),
            })
            .collect())
    }

    async fn quality_counts(&self) -> Result<QualityCounts, AppError> {
        let client = self.pool.get().await?;
        let row = client.query_one(queries::QUALITY_COUNTS, &[]).await?;

        Ok(QualityCounts {
            total: row.get(0),
            passed: row.get(1),
        })
    }

    async fn object_exists(&self, object: &SchemaObject) -> Result<bool, AppError> {
        let sql = match object.kind {
            ObjectKind::Table => queries::TABLE_EXISTS,
            ObjectKind::Procedure => queries::ROUTINE_EXISTS,
        };
        let found = self.count(sql, &[&object.schema, &object.name]).await?;
        Ok(found > 0)
    }

    async fn integrity_violations(&self, probe: IntegrityProbe) -> Result<i64, AppError> {
        let sql = match probe {
            IntegrityProbe::NullCustomerKeys => queries::NULL_CUSTOMER_KEYS,
            IntegrityProbe::DuplicateCurrentCustomers => queries::DUPLICATE_CURRENT_CUSTOMERS,
        };
        self.count(sql, &[]).await
    }
}

/// Create a connection pool with the given configuration
fn create_pool(config: &DatabaseConfig) -> Result<Pool, AppError> {
    let mut cfg = Config::new();
    cfg.host = Some(config.host.clone());
    cfg.port = Some(config.port);
    cfg.user = Some(config.user.clone());
    cfg.password = Some(config.password.clone());
    cfg.dbname = Some(config.database.clone());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    cfg.connect_timeout = Some(config.connect_timeout);
    cfg.pool = Some(PoolConfig {
        timeouts: Timeouts {
            wait: Some(config.connect_timeout),
            create: Some(config.connect_timeout),
            recycle: Some(config.connect_timeout),
        },
        ..PoolConfig::new(config.max_pool_size)
    });

    if config.require_tls {
        // Both ring and aws-lc-rs end up enabled through the dependency tree; pin one.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let certs = rustls_native_certs::load_native_certs();
        let mut root_store = rustls::RootCertStore::empty();
        for cert in certs.certs {
            root_store.add(cert).ok();
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();
        let tls = tokio_postgres_rustls::MakeRustlsConnect::new(tls_config);

        cfg.create_pool(Some(Runtime::Tokio1), tls)
            .map_err(|e| AppError::Config(format!("Failed to create TLS pool: {}", e)))
    } else {
        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| AppError::Config(format!("Failed to create pool: {}", e)))
    }
}
