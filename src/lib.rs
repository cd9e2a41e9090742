//! Checks the TLS certificate of a web endpoint.
//!
//! A target such as `example.com` or `example.com:8443` is normalized into a
//! [`TargetAddress`], probed with a verified TLS handshake, and reported as the
//! number of whole days left before the leaf certificate expires. Failures
//! come back as a [`ProbeError`] whose [`FailureKind`] tells callers what went
//! wrong.
//!
//! ```no_run
//! use checkwebcert::{normalize, Prober};
//!
//! let prober = Prober::new()?;
//! let expiry = prober.probe(&normalize("example.com"))?;
//! println!("{} expires in {} days", expiry.hostname, expiry.days_remaining);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod address;
pub mod config;
pub mod error;
pub mod logger;
pub mod metrics;
pub mod probe;
pub mod report;

pub use address::{normalize, TargetAddress, DEFAULT_PORT};
pub use error::{FailureKind, ProbeError};
pub use probe::{days_between, probe, verify_hostname, CertificateExpiry, ProbeOutcome, Prober};
