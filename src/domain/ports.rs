//! Capabilities the revocation and OCSP tooling consume.
//!
//! Each one has a production adapter (HTTP authority, SQL store, Redis) and an
//! in-memory implementation used by tests and local runs.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::Report;
use futures::stream::BoxStream;

use crate::cache::CacheResult;
use crate::domain::models::{
    AccountId, CertificateStatus, KeyFingerprint, RevocationRequest, Serial,
};
use crate::store::StoreResult;

/// Serials streamed from an incident table. Any `Err` item poisons the stream.
pub type SerialStream = BoxStream<'static, StoreResult<Serial>>;

/// Result of a single revocation attempt.
#[derive(Debug)]
pub enum RevocationOutcome {
    Succeeded,
    AlreadyRevoked,
    Failed(Report),
}

/// Marks one certificate revoked.
#[async_trait]
pub trait Revoker: Send + Sync + 'static {
    async fn revoke(&self, request: &RevocationRequest) -> RevocationOutcome;
}

#[async_trait]
pub trait IncidentStreamSource: Send + Sync {
    /// Opens a stream over every serial recorded under the incident `name`.
    async fn open_stream(&self, name: &str) -> StoreResult<SerialStream>;
}

#[async_trait]
pub trait KeyFingerprintIndex: Send + Sync {
    /// Serials bound to `fingerprint` whose certificates expire after `not_expired_as_of`.
    async fn lookup(
        &self,
        fingerprint: &KeyFingerprint,
        not_expired_as_of: DateTime<Utc>,
    ) -> StoreResult<Vec<Serial>>;
}

#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn exists(&self, account: AccountId) -> StoreResult<bool>;

    /// Serials issued to `account` whose certificates expire after `not_expired_as_of`.
    async fn serials_for(
        &self,
        account: AccountId,
        not_expired_as_of: DateTime<Utc>,
    ) -> StoreResult<Vec<Serial>>;
}

/// Certificate statuses ordered by a monotonically increasing row id.
#[async_trait]
pub trait CertificateStatusStore: Send + Sync {
    /// Smallest id whose `not_after` is at or after `timestamp`, if any.
    async fn first_position_with_expiry_at_or_after(
        &self,
        timestamp: DateTime<Utc>,
    ) -> StoreResult<Option<i64>>;

    /// Up to `limit` rows with `id >= start_id`, in id order.
    async fn statuses_from(&self, start_id: i64, limit: usize)
    -> StoreResult<Vec<CertificateStatus>>;
}

/// Key/value cache with per-entry expiry.
#[async_trait]
pub trait DistributedCache: Send + Sync {
    /// Writes `value` under `key` in a single operation.
    async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()>;

    async fn get(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;
}

/// Produces a signed, DER-encoded OCSP response for a status row.
#[async_trait]
pub trait OcspSigner: Send + Sync {
    async fn sign(&self, status: &CertificateStatus) -> color_eyre::Result<Vec<u8>>;
}
