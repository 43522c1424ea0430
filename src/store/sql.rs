use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::{FromRow, Row};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::domain::{
    AccountDirectory, AccountId, CertStatus, CertificateStatus, CertificateStatusStore,
    IncidentStreamSource, KeyFingerprint, KeyFingerprintIndex, RevocationReason, Serial,
    SerialStream,
};
use crate::store::{StoreError, StoreResult};

const INCIDENT_TABLE_PREFIX: &str = "incident_";
const MAX_INCIDENT_TABLE_LEN: usize = 100;
const INCIDENT_STREAM_BUFFER: usize = 256;

/// MySQL-backed registration and certificate status store.
#[derive(Debug, Clone)]
pub struct SqlStore {
    pool: MySqlPool,
}

impl SqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool against `url`.
    pub async fn connect(url: &SecretString, max_connections: u32) -> StoreResult<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(url.expose_secret())
            .await?;
        info!("Database connection pool created");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

/// Incident tables are interpolated into SQL, so only `incident_[A-Za-z0-9_]+` is allowed.
fn validate_incident_table(name: &str) -> StoreResult<()> {
    let suffix = name
        .strip_prefix(INCIDENT_TABLE_PREFIX)
        .ok_or_else(|| StoreError::InvalidIncidentTable(name.to_string()))?;
    let valid = !suffix.is_empty()
        && name.len() <= MAX_INCIDENT_TABLE_LEN
        && suffix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(StoreError::InvalidIncidentTable(name.to_string()));
    }
    Ok(())
}

#[derive(FromRow)]
struct StatusRow {
    id: i64,
    serial: String,
    status: String,
    #[sqlx(rename = "notAfter")]
    not_after: DateTime<Utc>,
    #[sqlx(rename = "revokedDate")]
    revoked_date: Option<DateTime<Utc>>,
    #[sqlx(rename = "revokedReason")]
    revoked_reason: Option<i64>,
}

impl From<StatusRow> for CertificateStatus {
    fn from(row: StatusRow) -> Self {
        let status = if row.status == "revoked" {
            CertStatus::Revoked
        } else {
            CertStatus::Good
        };
        Self {
            id: row.id,
            serial: Serial::new(row.serial),
            status,
            not_after: row.not_after,
            revoked_date: row.revoked_date,
            revoked_reason: row
                .revoked_reason
                .and_then(|code| RevocationReason::try_from(code).ok()),
        }
    }
}

#[async_trait]
impl IncidentStreamSource for SqlStore {
    async fn open_stream(&self, name: &str) -> StoreResult<SerialStream> {
        validate_incident_table(name)?;

        let registered: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM incidents WHERE serialTable = ?")
                .bind(name)
                .fetch_one(&self.pool)
                .await?;
        if registered == 0 {
            return Err(StoreError::UnknownIncident(name.to_string()));
        }

        let (tx, rx) = mpsc::channel(INCIDENT_STREAM_BUFFER);
        let pool = self.pool.clone();
        let sql = format!("SELECT serial FROM {name}");
        tokio::spawn(async move {
            let mut rows = sqlx::query(&sql).fetch(&pool);
            while let Some(row) = rows.next().await {
                let item = row
                    .and_then(|row| row.try_get::<String, _>("serial"))
                    .map(Serial::new)
                    .map_err(StoreError::from);
                let failed = item.is_err();
                if tx.send(item).await.is_err() || failed {
                    break;
                }
            }
        });

        debug!("Streaming serials from {}", name);
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });
        Ok(stream.boxed())
    }
}

#[async_trait]
impl KeyFingerprintIndex for SqlStore {
    async fn lookup(
        &self,
        fingerprint: &KeyFingerprint,
        not_expired_as_of: DateTime<Utc>,
    ) -> StoreResult<Vec<Serial>> {
        let serials: Vec<String> = sqlx::query_scalar(
            "SELECT certSerial FROM keyHashToSerial \
             WHERE keyHash = ? AND certNotAfter > ? ORDER BY id",
        )
        .bind(fingerprint.as_bytes())
        .bind(not_expired_as_of)
        .fetch_all(&self.pool)
        .await?;
        Ok(serials.into_iter().map(Serial::new).collect())
    }
}

#[async_trait]
impl AccountDirectory for SqlStore {
    async fn exists(&self, account: AccountId) -> StoreResult<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM registrations WHERE id = ?")
            .bind(account.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    async fn serials_for(
        &self,
        account: AccountId,
        not_expired_as_of: DateTime<Utc>,
    ) -> StoreResult<Vec<Serial>> {
        let serials: Vec<String> = sqlx::query_scalar(
            "SELECT serial FROM serials WHERE registrationID = ? AND expires > ? ORDER BY id",
        )
        .bind(account.0)
        .bind(not_expired_as_of)
        .fetch_all(&self.pool)
        .await?;
        Ok(serials.into_iter().map(Serial::new).collect())
    }
}

#[async_trait]
impl CertificateStatusStore for SqlStore {
    async fn first_position_with_expiry_at_or_after(
        &self,
        timestamp: DateTime<Utc>,
    ) -> StoreResult<Option<i64>> {
        let id: Option<i64> =
            sqlx::query_scalar("SELECT MIN(id) FROM certificateStatus WHERE notAfter >= ?")
                .bind(timestamp)
                .fetch_one(&self.pool)
                .await?;
        Ok(id)
    }

    async fn statuses_from(
        &self,
        start_id: i64,
        limit: usize,
    ) -> StoreResult<Vec<CertificateStatus>> {
        let rows: Vec<StatusRow> = sqlx::query_as(
            "SELECT id, serial, status, notAfter, revokedDate, revokedReason \
             FROM certificateStatus WHERE id >= ? ORDER BY id LIMIT ?",
        )
        .bind(start_id)
        .bind(limit as u64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(CertificateStatus::from).collect())
    }
}
