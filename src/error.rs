//! Error types for certificate probing.
//!
//! Every failed probe ends in exactly one [`ProbeError`] variant. Callers that
//! only need to branch on the category use [`ProbeError::kind`]; the carried
//! text is diagnostic and may change between OpenSSL versions.

use serde::Serialize;
use std::fmt;
use strum_macros::{AsRefStr, Display, EnumIter};

/// The flat set of probe failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, AsRefStr, EnumIter)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    UntrustedIssuer,
    MalformedHandshakeRecord,
    HostnameMismatch,
    NoCertificatesPresented,
    OtherConnectionError,
}

/// Error returned when a certificate probe fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    /// The chain's issuing authority is not in the trust store
    UntrustedIssuer {
        /// The address that presented the chain
        address: String,
        /// Verification failure reported by OpenSSL
        details: String,
    },

    /// The peer answered with something that is not a TLS record
    MalformedHandshakeRecord {
        /// The address that answered
        address: String,
        /// The record-layer error reported by OpenSSL
        details: String,
    },

    /// The certificate is not valid for the requested hostname
    HostnameMismatch {
        /// The hostname that was requested
        hostname: String,
        /// Why the certificate was rejected
        details: String,
    },

    /// The handshake completed without a peer certificate
    NoCertificatesPresented {
        /// The address that presented no certificate
        address: String,
    },

    /// Any other network or TLS failure
    OtherConnectionError {
        /// The address (host:port) the probe was dialing
        address: String,
        /// The raw diagnostic
        details: String,
    },
}

impl ProbeError {
    /// The category of this failure.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::UntrustedIssuer { .. } => FailureKind::UntrustedIssuer,
            Self::MalformedHandshakeRecord { .. } => FailureKind::MalformedHandshakeRecord,
            Self::HostnameMismatch { .. } => FailureKind::HostnameMismatch,
            Self::NoCertificatesPresented { .. } => FailureKind::NoCertificatesPresented,
            Self::OtherConnectionError { .. } => FailureKind::OtherConnectionError,
        }
    }

    /// Builds the variant matching `kind`.
    ///
    /// `hostname` is reported for hostname mismatches, `address` for all other
    /// kinds.
    pub(crate) fn with_kind(
        kind: FailureKind,
        hostname: &str,
        address: &str,
        details: String,
    ) -> Self {
        let address = address.to_string();
        match kind {
            FailureKind::UntrustedIssuer => Self::UntrustedIssuer { address, details },
            FailureKind::MalformedHandshakeRecord => {
                Self::MalformedHandshakeRecord { address, details }
            }
            FailureKind::HostnameMismatch => Self::HostnameMismatch {
                hostname: hostname.to_string(),
                details,
            },
            FailureKind::NoCertificatesPresented => Self::NoCertificatesPresented { address },
            FailureKind::OtherConnectionError => Self::OtherConnectionError { address, details },
        }
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UntrustedIssuer { address, details } => {
                write!(
                    f,
                    "Unknown authority presented by {}: {}",
                    address, details
                )
            }
            Self::MalformedHandshakeRecord { address, details } => {
                write!(
                    f,
                    "Record header error from {}: {}. Verify the port serves TLS and not plaintext.",
                    address, details
                )
            }
            Self::HostnameMismatch { hostname, details } => {
                write!(f, "Certificate is not valid for {}: {}", hostname, details)
            }
            Self::NoCertificatesPresented { address } => {
                write!(f, "No certificates presented by {}", address)
            }
            Self::OtherConnectionError { address, details } => {
                write!(f, "Connection to {} failed: {}", address, details)
            }
        }
    }
}

impl std::error::Error for ProbeError {}
