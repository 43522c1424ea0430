use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use crate::domain::{DistributedCache, Serial};
use crate::ocsp::errors::{OcspError, OcspResult};
use crate::ocsp::issuers::IssuerRegistry;
use crate::ocsp::response::ParsedResponse;

/// What a successful store wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
    pub key: String,
    pub serial: Serial,
    pub issuer_short_id: u32,
    pub ttl: Duration,
    pub next_update: DateTime<Utc>,
}

/// Cache key for a response: `r{<serial>}:<issuer short id>`.
///
/// The braces keep every entry for a serial in the same cluster slot.
pub fn cache_key(issuer_short_id: u32, serial: &Serial) -> String {
    format!("r{{{serial}}}:{issuer_short_id}")
}

/// Writes signed OCSP responses into the distributed cache.
#[derive(Clone)]
pub struct OcspWriter {
    cache: Arc<dyn DistributedCache>,
    issuers: Arc<IssuerRegistry>,
}

impl OcspWriter {
    pub fn new(cache: Arc<dyn DistributedCache>, issuers: Arc<IssuerRegistry>) -> Self {
        Self { cache, issuers }
    }

    pub fn issuers(&self) -> &IssuerRegistry {
        &self.issuers
    }

    /// Stores `der` for at most `requested_ttl`, never past its nextUpdate.
    ///
    /// With no requested ttl the entry lives until nextUpdate.
    pub async fn store_response(
        &self,
        der: &[u8],
        requested_ttl: Option<Duration>,
    ) -> OcspResult<StoredResponse> {
        self.store_response_at(der, requested_ttl, Utc::now()).await
    }

    #[instrument(skip(self, der), fields(len = der.len()))]
    pub async fn store_response_at(
        &self,
        der: &[u8],
        requested_ttl: Option<Duration>,
        now: DateTime<Utc>,
    ) -> OcspResult<StoredResponse> {
        let parsed = ParsedResponse::from_der(der)?;
        let issuer_short_id = self.issuers.short_id_for(&parsed.issuer)?;

        let next_update = parsed
            .next_update
            .ok_or_else(|| OcspError::MissingNextUpdate(parsed.serial.clone()))?;
        let expired = || OcspError::ExpiredResponse {
            serial: parsed.serial.clone(),
            next_update,
        };
        // Negative remaining validity fails the conversion.
        let remaining = (next_update - now).to_std().map_err(|_| expired())?;
        let ttl = match requested_ttl {
            Some(requested) => requested.min(remaining),
            None => remaining,
        };
        // The cache counts expiry in whole milliseconds.
        if ttl < Duration::from_millis(1) {
            return Err(expired());
        }

        let key = cache_key(issuer_short_id, &parsed.serial);
        self.cache.put(&key, der, ttl).await?;
        debug!(key = %key, ttl_ms = ttl.as_millis() as u64, "stored OCSP response");

        Ok(StoredResponse {
            key,
            serial: parsed.serial,
            issuer_short_id,
            ttl,
            next_update,
        })
    }

    /// Reads a cached response back, if one is live.
    pub async fn load_response(
        &self,
        issuer_short_id: u32,
        serial: &Serial,
    ) -> OcspResult<Option<Vec<u8>>> {
        Ok(self.cache.get(&cache_key(issuer_short_id, serial)).await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::cache::MemoryCache;
    use crate::cert_utils::{ResponseTemplate, build_response};
    use crate::ocsp::issuers::Issuer;

    const SHORT_ID: u32 = 23;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn setup() -> (OcspWriter, MemoryCache, Vec<u8>) {
        let key_hash = vec![0x42; 20];
        let issuer = Issuer {
            short_id: SHORT_ID,
            subject: "CN=test".to_string(),
            sha1_key_hash: key_hash.clone(),
            sha256_key_hash: vec![0x43; 32],
        };
        let registry = IssuerRegistry::new(vec![issuer]).unwrap();
        let cache = MemoryCache::new();
        let writer = OcspWriter::new(Arc::new(cache.clone()), Arc::new(registry));
        (writer, cache, key_hash)
    }

    #[test]
    fn test_cache_key() {
        assert_eq!(cache_key(7, &Serial::new("ABC")), "r{abc}:7");
    }

    #[tokio::test]
    async fn test_ttl_is_clamped_to_next_update() {
        let (writer, cache, key_hash) = setup();
        let der = build_response(
            &ResponseTemplate::new(key_hash, &[0x01], now())
                .next_update(now() + chrono::Duration::minutes(10)),
        )
        .unwrap();

        let stored = writer
            .store_response_at(&der, Some(Duration::from_secs(3600)), now())
            .await
            .unwrap();

        assert_eq!(stored.ttl, Duration::from_secs(600));
        assert_eq!(stored.issuer_short_id, SHORT_ID);
        let entry = cache.entry(&stored.key).unwrap();
        assert_eq!(entry.value, der);
        assert_eq!(entry.ttl, Duration::from_secs(600));
    }

    #[tokio::test]
    async fn test_shorter_requested_ttl_wins() {
        let (writer, cache, key_hash) = setup();
        let der = build_response(
            &ResponseTemplate::new(key_hash, &[0x01], now())
                .next_update(now() + chrono::Duration::hours(2)),
        )
        .unwrap();

        let stored = writer
            .store_response_at(&der, Some(Duration::from_secs(3600)), now())
            .await
            .unwrap();
        assert_eq!(cache.entry(&stored.key).unwrap().ttl, Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_missing_requested_ttl_uses_next_update() {
        let (writer, _, key_hash) = setup();
        let der = build_response(
            &ResponseTemplate::new(key_hash, &[0x01], now())
                .next_update(now() + chrono::Duration::hours(2)),
        )
        .unwrap();

        let stored = writer.store_response_at(&der, None, now()).await.unwrap();
        assert_eq!(stored.ttl, Duration::from_secs(7200));
    }

    #[tokio::test]
    async fn test_expired_response_is_not_written() {
        let (writer, cache, key_hash) = setup();
        for next_update in [now() - chrono::Duration::seconds(1), now()] {
            let this_update = now() - chrono::Duration::hours(1);
            let der = build_response(
                &ResponseTemplate::new(key_hash.clone(), &[0x01], this_update)
                    .next_update(next_update),
            )
            .unwrap();
            let result = writer
                .store_response_at(&der, Some(Duration::from_secs(3600)), now())
                .await;
            assert!(matches!(result, Err(OcspError::ExpiredResponse { .. })));
        }
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_sub_millisecond_ttl_is_treated_as_expired() {
        let (writer, cache, key_hash) = setup();
        let next_update = now() + chrono::Duration::hours(1);
        let der = build_response(
            &ResponseTemplate::new(key_hash, &[0x01], now()).next_update(next_update),
        )
        .unwrap();

        let result = writer
            .store_response_at(&der, Some(Duration::from_micros(500)), now())
            .await;
        assert!(matches!(result, Err(OcspError::ExpiredResponse { .. })));

        let almost_stale = next_update - chrono::Duration::microseconds(500);
        let result = writer.store_response_at(&der, None, almost_stale).await;
        assert!(matches!(result, Err(OcspError::ExpiredResponse { .. })));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_issuer_is_not_written() {
        let (writer, cache, _) = setup();
        let der = build_response(
            &ResponseTemplate::new(vec![0x99; 20], &[0x01], now())
                .next_update(now() + chrono::Duration::hours(1)),
        )
        .unwrap();

        let result = writer.store_response_at(&der, None, now()).await;
        assert!(matches!(result, Err(OcspError::UnknownIssuer(_))));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_missing_next_update() {
        let (writer, cache, key_hash) = setup();
        let der = build_response(&ResponseTemplate::new(key_hash, &[0x01], now())).unwrap();
        let result = writer.store_response_at(&der, None, now()).await;
        assert!(matches!(result, Err(OcspError::MissingNextUpdate(_))));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_cache_failure_is_reported() {
        let (writer, cache, key_hash) = setup();
        cache.set_failing(true);
        let der = build_response(
            &ResponseTemplate::new(key_hash, &[0x01], now())
                .next_update(now() + chrono::Duration::hours(1)),
        )
        .unwrap();
        let result = writer.store_response_at(&der, None, now()).await;
        assert!(matches!(result, Err(OcspError::Cache(_))));
    }

    #[tokio::test]
    async fn test_load_response() {
        let (writer, _, key_hash) = setup();
        let der = build_response(
            &ResponseTemplate::new(key_hash, &[0x05, 0x39], now())
                .next_update(Utc::now() + chrono::Duration::hours(1)),
        )
        .unwrap();
        let stored = writer.store_response(&der, None).await.unwrap();

        let loaded = writer.load_response(SHORT_ID, &stored.serial).await.unwrap();
        assert_eq!(loaded, Some(der));
        assert_eq!(
            writer
                .load_response(SHORT_ID + 1, &stored.serial)
                .await
                .unwrap(),
            None
        );
    }
}
