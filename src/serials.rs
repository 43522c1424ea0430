//! Resolution of certificate serials from the sources an operator can name:
//! an incident table, a text file, a compromised private key, or an account.

mod errors;

pub use errors::{SerialSourceError, SerialSourceResult};

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use futures::TryStreamExt;
use openssl::pkey::PKey;
use tracing::{debug, info};

use crate::domain::{
    AccountDirectory, AccountId, IncidentStreamSource, KeyFingerprint, KeyFingerprintIndex, Serial,
};

/// Resolves serial lists from the registration store and local files.
#[derive(Clone)]
pub struct SerialResolver {
    incidents: Arc<dyn IncidentStreamSource>,
    keys: Arc<dyn KeyFingerprintIndex>,
    accounts: Arc<dyn AccountDirectory>,
}

impl SerialResolver {
    pub fn new(
        incidents: Arc<dyn IncidentStreamSource>,
        keys: Arc<dyn KeyFingerprintIndex>,
        accounts: Arc<dyn AccountDirectory>,
    ) -> Self {
        Self {
            incidents,
            keys,
            accounts,
        }
    }

    /// Builds a resolver whose every source is served by `store`.
    pub fn from_store<S>(store: S) -> Self
    where
        S: IncidentStreamSource + KeyFingerprintIndex + AccountDirectory + Clone + 'static,
    {
        Self::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store),
        )
    }

    /// Collects every serial of an incident table.
    ///
    /// A stream that breaks midway fails the whole call; partial lists are never returned.
    pub async fn from_incident_table(&self, table: &str) -> SerialSourceResult<Vec<Serial>> {
        let stream = self.incidents.open_stream(table).await?;
        let serials: Vec<Serial> = stream.try_collect().await?;
        info!("Found {} serials in incident table {}", serials.len(), table);
        Ok(serials)
    }

    /// Reads one serial per line. See [`read_serials_file`].
    pub async fn from_file(&self, path: impl AsRef<Path>) -> SerialSourceResult<Vec<Serial>> {
        read_serials_file(path).await
    }

    /// Finds the unexpired serials of every certificate issued for the key in `path`.
    pub async fn from_private_key(
        &self,
        path: impl AsRef<Path>,
    ) -> SerialSourceResult<Vec<Serial>> {
        let path = path.as_ref();
        let key_bytes = tokio::fs::read(path)
            .await
            .map_err(|source| SerialSourceError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let fingerprint = fingerprint_private_key(&key_bytes)?;
        debug!("Looking up serials for key {}", fingerprint.to_hex());

        let serials = self.keys.lookup(&fingerprint, Utc::now()).await?;
        info!(
            "Found {} unexpired serials for key {}",
            serials.len(),
            fingerprint.to_hex()
        );
        Ok(serials)
    }

    /// Finds the unexpired serials issued to `account`, after checking it exists.
    pub async fn from_account(&self, account: AccountId) -> SerialSourceResult<Vec<Serial>> {
        if !self.accounts.exists(account).await? {
            return Err(SerialSourceError::AccountNotFound(account));
        }
        let serials = self.accounts.serials_for(account, Utc::now()).await?;
        info!(
            "Found {} unexpired serials for account {}",
            serials.len(),
            account
        );
        Ok(serials)
    }
}

/// Reads one serial per line. Empty lines, including the one after a final newline, are skipped.
///
/// Needs no store, so callers holding only a file can skip connecting one.
pub async fn read_serials_file(path: impl AsRef<Path>) -> SerialSourceResult<Vec<Serial>> {
    let path = path.as_ref();
    let contents =
        tokio::fs::read_to_string(path)
            .await
            .map_err(|source| SerialSourceError::Read {
                path: path.to_path_buf(),
                source,
            })?;
    let serials = parse_serials(&contents);
    info!("Read {} serials from {}", serials.len(), path.display());
    Ok(serials)
}

pub fn parse_serials(contents: &str) -> Vec<Serial> {
    contents
        .split('\n')
        .filter(|line| !line.is_empty())
        .map(Serial::new)
        .collect()
}

/// Computes the SPKI fingerprint of the public half of a PEM or DER private key.
///
/// The PEM label is ignored: PKCS#8, PKCS#1 and SEC1 contents are all accepted.
pub fn fingerprint_private_key(key_bytes: &[u8]) -> SerialSourceResult<KeyFingerprint> {
    let der = match pem::parse(key_bytes) {
        Ok(block) => block.into_contents(),
        Err(_) => key_bytes.to_vec(),
    };
    let private_key = PKey::private_key_from_der(&der)?;
    let spki = private_key.public_key_to_der()?;
    Ok(KeyFingerprint::from_spki_der(&spki))
}
