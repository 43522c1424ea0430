use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::StreamExt;

use crate::domain::{
    AccountDirectory, AccountId, CertificateStatus, CertificateStatusStore, IncidentStreamSource,
    KeyFingerprint, KeyFingerprintIndex, Serial, SerialStream,
};
use crate::store::{StoreError, StoreResult};

#[derive(Debug, Default)]
struct Inner {
    incidents: DashMap<String, Vec<Serial>>,
    /// Incident streams that break after yielding this many serials.
    broken_incidents: DashMap<String, usize>,
    key_serials: DashMap<KeyFingerprint, Vec<(Serial, DateTime<Utc>)>>,
    accounts: DashMap<AccountId, Vec<(Serial, DateTime<Utc>)>>,
    statuses: DashMap<i64, CertificateStatus>,
    next_status_id: AtomicI64,
    serial_lookups: AtomicUsize,
    unavailable: AtomicBool,
}

/// An in-memory registration and status store.
///
/// Useful for testing and development.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_incident<I, S>(&self, name: &str, serials: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<Serial>,
    {
        self.inner
            .incidents
            .insert(name.to_string(), serials.into_iter().map(Into::into).collect());
    }

    /// Makes the stream for `name` fail after `after` serials.
    pub fn break_incident_after(&self, name: &str, after: usize) {
        self.inner.broken_incidents.insert(name.to_string(), after);
    }

    pub fn add_key_serial(
        &self,
        fingerprint: KeyFingerprint,
        serial: impl Into<Serial>,
        not_after: DateTime<Utc>,
    ) {
        self.inner
            .key_serials
            .entry(fingerprint)
            .or_default()
            .push((serial.into(), not_after));
    }

    pub fn add_account(&self, account: AccountId) {
        self.inner.accounts.entry(account).or_default();
    }

    pub fn add_account_serial(
        &self,
        account: AccountId,
        serial: impl Into<Serial>,
        not_after: DateTime<Utc>,
    ) {
        self.inner
            .accounts
            .entry(account)
            .or_default()
            .push((serial.into(), not_after));
    }

    /// Appends a status row and returns its assigned id.
    pub fn insert_status(&self, mut status: CertificateStatus) -> i64 {
        let id = self.inner.next_status_id.fetch_add(1, Ordering::SeqCst) + 1;
        status.id = id;
        self.inner.statuses.insert(id, status);
        id
    }

    /// Number of serial lookups served (key and account based).
    pub fn serial_lookups(&self) -> usize {
        self.inner.serial_lookups.load(Ordering::SeqCst)
    }

    /// Simulates an outage: every subsequent call fails.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".into()));
        }
        Ok(())
    }
}

fn live_serials(rows: &[(Serial, DateTime<Utc>)], as_of: DateTime<Utc>) -> Vec<Serial> {
    rows.iter()
        .filter(|(_, not_after)| *not_after > as_of)
        .map(|(serial, _)| serial.clone())
        .collect()
}

#[async_trait]
impl IncidentStreamSource for MemoryStore {
    async fn open_stream(&self, name: &str) -> StoreResult<SerialStream> {
        self.check_available()?;
        let serials = self
            .inner
            .incidents
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::UnknownIncident(name.to_string()))?;

        let items: Vec<StoreResult<Serial>> =
            match self.inner.broken_incidents.get(name).map(|n| *n) {
                Some(after) => serials
                    .into_iter()
                    .take(after)
                    .map(Ok)
                    .chain(std::iter::once(Err(StoreError::Unavailable(
                        "incident stream reset".into(),
                    ))))
                    .collect(),
                None => serials.into_iter().map(Ok).collect(),
            };

        Ok(futures::stream::iter(items).boxed())
    }
}

#[async_trait]
impl KeyFingerprintIndex for MemoryStore {
    async fn lookup(
        &self,
        fingerprint: &KeyFingerprint,
        not_expired_as_of: DateTime<Utc>,
    ) -> StoreResult<Vec<Serial>> {
        self.check_available()?;
        self.inner.serial_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .inner
            .key_serials
            .get(fingerprint)
            .map(|rows| live_serials(&rows, not_expired_as_of))
            .unwrap_or_default())
    }
}

#[async_trait]
impl AccountDirectory for MemoryStore {
    async fn exists(&self, account: AccountId) -> StoreResult<bool> {
        self.check_available()?;
        Ok(self.inner.accounts.contains_key(&account))
    }

    async fn serials_for(
        &self,
        account: AccountId,
        not_expired_as_of: DateTime<Utc>,
    ) -> StoreResult<Vec<Serial>> {
        self.check_available()?;
        self.inner.serial_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .inner
            .accounts
            .get(&account)
            .map(|rows| live_serials(&rows, not_expired_as_of))
            .unwrap_or_default())
    }
}

#[async_trait]
impl CertificateStatusStore for MemoryStore {
    async fn first_position_with_expiry_at_or_after(
        &self,
        timestamp: DateTime<Utc>,
    ) -> StoreResult<Option<i64>> {
        self.check_available()?;
        Ok(self
            .inner
            .statuses
            .iter()
            .filter(|entry| entry.value().not_after >= timestamp)
            .map(|entry| *entry.key())
            .min())
    }

    async fn statuses_from(
        &self,
        start_id: i64,
        limit: usize,
    ) -> StoreResult<Vec<CertificateStatus>> {
        self.check_available()?;
        let mut rows: Vec<CertificateStatus> = self
            .inner
            .statuses
            .iter()
            .filter(|entry| *entry.key() >= start_id)
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(|row| row.id);
        rows.truncate(limit);
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use futures::TryStreamExt;

    use super::*;
    use crate::domain::CertStatus;

    fn status(serial: &str, not_after: DateTime<Utc>) -> CertificateStatus {
        CertificateStatus {
            id: 0,
            serial: Serial::new(serial),
            status: CertStatus::Good,
            not_after,
            revoked_date: None,
            revoked_reason: None,
        }
    }

    #[tokio::test]
    async fn test_status_ids_are_monotonic() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let first = store.insert_status(status("01", now));
        let second = store.insert_status(status("02", now));
        assert!(second > first);

        let page = store.statuses_from(first, 10).await.unwrap();
        assert_eq!(
            page.iter().map(|s| s.id).collect::<Vec<_>>(),
            vec![first, second]
        );
        assert_eq!(store.statuses_from(first, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_expired_serials_are_filtered() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let account = AccountId(7);
        store.add_account_serial(account, "live", now + Duration::hours(1));
        store.add_account_serial(account, "dead", now - Duration::hours(1));

        let serials = store.serials_for(account, now).await.unwrap();
        assert_eq!(serials, vec![Serial::new("live")]);
        assert_eq!(store.serial_lookups(), 1);
    }

    #[tokio::test]
    async fn test_broken_incident_stream_yields_error() {
        let store = MemoryStore::new();
        store.add_incident("incident_a", ["1", "2", "3"]);
        store.break_incident_after("incident_a", 2);

        let result: StoreResult<Vec<Serial>> =
            store.open_stream("incident_a").await.unwrap().try_collect().await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(store.exists(AccountId(1)).await.is_err());
    }
}
