//! OCSP response distribution: parsing, issuer lookup, cache writes and backfill.

pub mod asn1;
mod backfill;
mod errors;
mod issuers;
mod response;
mod writer;

pub use backfill::{Backfill, BackfillOptions, BackfillSummary, get_starting_id};
pub use errors::{OcspError, OcspResult};
pub use issuers::{Issuer, IssuerRegistry};
pub use response::{HashAlgorithm, IssuerIdentity, ParsedResponse};
pub use writer::{OcspWriter, StoredResponse, cache_key};
