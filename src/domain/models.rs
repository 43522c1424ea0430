use std::fmt;

use chrono::{DateTime, Utc};
use ring::digest::{SHA256, digest};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Width of a canonical serial rendered from raw integer bytes (18 bytes).
const SERIAL_HEX_WIDTH: usize = 36;

/// Identifier of one certificate, normalized to lowercase.
///
/// Sources may repeat serials; nothing here deduplicates them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Serial(String);

impl Serial {
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(value.as_ref().to_lowercase())
    }

    /// Renders a big-endian integer as zero-padded lowercase hex.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
        let digits = hex::encode(&bytes[first..]);
        Self(format!("{digits:0>SERIAL_HEX_WIDTH$}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Serial {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Serial {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for Serial {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Registration (account) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// SHA-256 digest of a DER-encoded SubjectPublicKeyInfo.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyFingerprint([u8; 32]);

impl KeyFingerprint {
    pub fn from_spki_der(spki_der: &[u8]) -> Self {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(digest(&SHA256, spki_der).as_ref());
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for KeyFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyFingerprint({})", self.to_hex())
    }
}

#[derive(Debug, Error)]
#[error("unsupported revocation reason code {0}")]
pub struct UnknownReasonCode(pub i64);

/// RFC 5280 CRLReason codes. Code 7 is unassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
#[repr(u8)]
pub enum RevocationReason {
    Unspecified = 0,
    KeyCompromise = 1,
    CaCompromise = 2,
    AffiliationChanged = 3,
    Superseded = 4,
    CessationOfOperation = 5,
    CertificateHold = 6,
    RemoveFromCrl = 8,
    PrivilegeWithdrawn = 9,
    AaCompromise = 10,
}

impl RevocationReason {
    pub fn code(self) -> i64 {
        self as u8 as i64
    }
}

impl TryFrom<i64> for RevocationReason {
    type Error = UnknownReasonCode;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        let reason = match code {
            0 => Self::Unspecified,
            1 => Self::KeyCompromise,
            2 => Self::CaCompromise,
            3 => Self::AffiliationChanged,
            4 => Self::Superseded,
            5 => Self::CessationOfOperation,
            6 => Self::CertificateHold,
            8 => Self::RemoveFromCrl,
            9 => Self::PrivilegeWithdrawn,
            10 => Self::AaCompromise,
            other => return Err(UnknownReasonCode(other)),
        };
        Ok(reason)
    }
}

impl From<RevocationReason> for i64 {
    fn from(reason: RevocationReason) -> Self {
        reason.code()
    }
}

impl fmt::Display for RevocationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.code())
    }
}

/// Batch-wide revocation parameters, copied into each request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevocationParams {
    pub reason: RevocationReason,
    pub skip_block_key: bool,
    pub malformed: bool,
}

impl RevocationParams {
    pub fn new(reason: RevocationReason) -> Self {
        Self {
            reason,
            skip_block_key: false,
            malformed: false,
        }
    }

    pub fn with_skip_block_key(mut self, skip_block_key: bool) -> Self {
        self.skip_block_key = skip_block_key;
        self
    }

    pub fn with_malformed(mut self, malformed: bool) -> Self {
        self.malformed = malformed;
        self
    }
}

/// A single revocation call, built fresh for every serial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevocationRequest {
    pub serial: Serial,
    pub reason: RevocationReason,
    pub skip_block_key: bool,
    pub malformed: bool,
}

impl RevocationRequest {
    pub fn new(serial: Serial, params: RevocationParams) -> Self {
        Self {
            serial,
            reason: params.reason,
            skip_block_key: params.skip_block_key,
            malformed: params.malformed,
        }
    }
}

/// Certificate status as tracked by the status table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertStatus {
    Good,
    Revoked,
}

/// One row of the time-ordered certificate status store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateStatus {
    pub id: i64,
    pub serial: Serial,
    pub status: CertStatus,
    pub not_after: DateTime<Utc>,
    pub revoked_date: Option<DateTime<Utc>>,
    pub revoked_reason: Option<RevocationReason>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_is_lowercased_without_trimming() {
        assert_eq!(Serial::new("AbC 12").as_str(), "abc 12");
    }

    #[test]
    fn test_serial_from_bytes_pads_to_canonical_width() {
        let serial = Serial::from_bytes(&[0x00, 0x05, 0x39]);
        assert_eq!(serial.as_str(), "000000000000000000000000000000000539");
        assert_eq!(serial.as_str().len(), 36);
    }

    #[test]
    fn test_reason_codes() {
        assert_eq!(
            RevocationReason::try_from(1).unwrap(),
            RevocationReason::KeyCompromise
        );
        assert_eq!(RevocationReason::AaCompromise.code(), 10);
        assert!(RevocationReason::try_from(7).is_err());
        assert!(RevocationReason::try_from(-1).is_err());
    }

    #[test]
    fn test_fingerprint_is_sha256_of_spki() {
        let fingerprint = KeyFingerprint::from_spki_der(b"spki");
        assert_eq!(fingerprint.as_bytes(), digest(&SHA256, b"spki").as_ref());
        assert_ne!(fingerprint, KeyFingerprint::from_spki_der(b"other"));
        assert_eq!(fingerprint.to_hex().len(), 64);
    }
}
