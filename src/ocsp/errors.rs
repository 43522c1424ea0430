use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::cache::CacheError;
use crate::domain::Serial;
use crate::ocsp::asn1::OcspResponseStatus;
use crate::store::StoreError;

pub type OcspResult<T> = Result<T, OcspError>;

#[derive(Debug, Error)]
pub enum OcspError {
    #[error("malformed OCSP response: {0}")]
    Malformed(#[from] der::Error),

    #[error("OCSP response status is {0:?}")]
    Unsuccessful(OcspResponseStatus),

    #[error("OCSP response carries no response bytes")]
    MissingResponseBytes,

    #[error("unsupported OCSP response type {0}")]
    UnsupportedResponseType(String),

    #[error("expected exactly one single response, found {0}")]
    ResponseCount(usize),

    #[error("unsupported CertID hash algorithm {0}")]
    UnsupportedHashAlgorithm(String),

    #[error("OCSP response time out of range")]
    InvalidTime,

    #[error("OCSP response for {0} has no nextUpdate")]
    MissingNextUpdate(Serial),

    #[error("unknown issuer (key hash {0})")]
    UnknownIssuer(String),

    #[error("OCSP response for {serial} expired at {next_update}")]
    ExpiredResponse {
        serial: Serial,
        next_update: DateTime<Utc>,
    },

    #[error("failed to load issuer {path}: {reason}")]
    IssuerLoad { path: PathBuf, reason: String },

    #[error("issuer short id {0} is assigned twice")]
    DuplicateShortId(u32),

    #[error("batch size and parallelism must be at least 1")]
    InvalidBackfillOptions,

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
