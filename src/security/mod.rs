//! Transport security utilities: TLS/mTLS termination (gated behind the
//! `tls` feature) and the client-certificate-fingerprint plumbing used to
//! attribute connections even when TLS is terminated upstream.
pub mod tls;

pub use tls::{ClientCertificateFingerprint, CLIENT_FINGERPRINT_HEADER_CANDIDATES};

#[cfg(feature = "tls")]
pub use tls::build_rustls_config;
