use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use tracing::{info, instrument, warn};

use crate::domain::{CertificateStatus, CertificateStatusStore, OcspSigner};
use crate::ocsp::errors::{OcspError, OcspResult};
use crate::ocsp::writer::OcspWriter;

/// Position of the first status row a backfill at `now` must still consider.
///
/// `None` means every row has expired (or the store is empty) and there is
/// nothing to do.
pub async fn get_starting_id(
    store: &dyn CertificateStatusStore,
    now: DateTime<Utc>,
) -> OcspResult<Option<i64>> {
    Ok(store.first_position_with_expiry_at_or_after(now).await?)
}

#[derive(Debug, Clone)]
pub struct BackfillOptions {
    pub batch_size: usize,
    pub parallelism: usize,
    pub ttl: Option<Duration>,
    /// Overrides the computed starting id.
    pub start_from_id: Option<i64>,
    pub max_rows: Option<usize>,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            parallelism: 10,
            ttl: None,
            start_from_id: None,
            max_rows: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillSummary {
    pub start_id: Option<i64>,
    pub scanned: usize,
    pub stored: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Signs and caches a response for every live status row.
pub struct Backfill {
    store: Arc<dyn CertificateStatusStore>,
    signer: Arc<dyn OcspSigner>,
    writer: OcspWriter,
    options: BackfillOptions,
}

impl Backfill {
    pub fn new(
        store: Arc<dyn CertificateStatusStore>,
        signer: Arc<dyn OcspSigner>,
        writer: OcspWriter,
        options: BackfillOptions,
    ) -> Self {
        Self {
            store,
            signer,
            writer,
            options,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(&self, now: DateTime<Utc>) -> OcspResult<BackfillSummary> {
        if self.options.batch_size == 0 || self.options.parallelism == 0 {
            return Err(OcspError::InvalidBackfillOptions);
        }

        let start_id = match self.options.start_from_id {
            Some(id) => id,
            None => match get_starting_id(self.store.as_ref(), now).await? {
                Some(id) => id,
                None => {
                    info!("no live certificate status rows; nothing to backfill");
                    return Ok(BackfillSummary::default());
                }
            },
        };

        let mut summary = BackfillSummary {
            start_id: Some(start_id),
            ..Default::default()
        };
        let mut cursor = start_id;
        loop {
            let limit = match self.options.max_rows {
                Some(max) => self.options.batch_size.min(max - summary.scanned),
                None => self.options.batch_size,
            };
            if limit == 0 {
                break;
            }

            let page = self.store.statuses_from(cursor, limit).await?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = last.id + 1;
            summary.scanned += page.len();
            let full_page = page.len() == limit;

            let (live, expired): (Vec<_>, Vec<_>) =
                page.into_iter().partition(|row| row.not_after >= now);
            summary.skipped += expired.len();

            let results: Vec<bool> = stream::iter(live)
                .map(|row| self.backfill_row(row, now))
                .buffer_unordered(self.options.parallelism)
                .collect()
                .await;
            let stored = results.iter().filter(|ok| **ok).count();
            summary.stored += stored;
            summary.failed += results.len() - stored;

            info!(
                cursor,
                scanned = summary.scanned,
                stored = summary.stored,
                "backfill progress"
            );
            if !full_page {
                break;
            }
        }

        info!(
            start_id,
            scanned = summary.scanned,
            stored = summary.stored,
            skipped = summary.skipped,
            failed = summary.failed,
            "backfill complete"
        );
        Ok(summary)
    }

    async fn backfill_row(&self, row: CertificateStatus, now: DateTime<Utc>) -> bool {
        let der = match self.signer.sign(&row).await {
            Ok(der) => der,
            Err(e) => {
                warn!(id = row.id, serial = %row.serial, "failed to sign OCSP response: {e:#}");
                return false;
            }
        };
        match self.writer.store_response_at(&der, self.options.ttl, now).await {
            Ok(_) => true,
            Err(e) => {
                warn!(id = row.id, serial = %row.serial, "failed to store OCSP response: {e}");
                false
            }
        }
    }
}
