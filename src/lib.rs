pub mod authority;
pub mod cache;
pub mod cert_utils;
pub mod config;
pub mod domain;
pub mod ocsp;
pub mod revocation;
pub mod serials;
pub mod store;
pub mod telemetry;
