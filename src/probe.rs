//! The certificate probe.
//!
//! [`Prober::probe`] dials a [`TargetAddress`], performs a verified TLS
//! handshake against the system trust store and turns the leaf certificate
//! into a [`CertificateExpiry`]. Failures are classified into the closed set
//! of [`FailureKind`]s.

use crate::address::TargetAddress;
use crate::error::{FailureKind, ProbeError};
use chrono::{DateTime, TimeDelta, Utc};
use log::debug;
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::error::ErrorStack;
use openssl::nid::Nid;
use openssl::ssl::{
    HandshakeError, SslConnector, SslConnectorBuilder, SslFiletype, SslMethod, SslStream,
    SslVerifyMode,
};
use openssl::x509::store::X509Lookup;
use openssl::x509::{X509NameRef, X509Ref, X509VerifyResult, X509};
use openssl_sys::{
    X509_V_ERR_CERT_HAS_EXPIRED, X509_V_ERR_CERT_UNTRUSTED, X509_V_ERR_DEPTH_ZERO_SELF_SIGNED_CERT,
    X509_V_ERR_EMAIL_MISMATCH, X509_V_ERR_HOSTNAME_MISMATCH, X509_V_ERR_IP_ADDRESS_MISMATCH,
    X509_V_ERR_SELF_SIGNED_CERT_IN_CHAIN, X509_V_ERR_UNABLE_TO_GET_ISSUER_CERT,
    X509_V_ERR_UNABLE_TO_GET_ISSUER_CERT_LOCALLY, X509_V_ERR_UNABLE_TO_VERIFY_LEAF_SIGNATURE,
};
use serde::Serialize;
use std::ffi::c_int;
use std::net::{IpAddr, TcpStream};

const SECONDS_PER_DAY: i64 = 86_400;

// ERR_LIB_SSL and the SSL_R_* reasons from openssl/err.h and
// openssl/sslerr.h; openssl-sys does not export them.
const ERR_LIB_SSL: c_int = 20;
const SSL_R_ENCRYPTED_LENGTH_TOO_LONG: c_int = 150;
const SSL_R_HTTPS_PROXY_REQUEST: c_int = 155;
const SSL_R_HTTP_REQUEST: c_int = 156;
const SSL_R_PACKET_LENGTH_TOO_LONG: c_int = 198;
const SSL_R_RECORD_LENGTH_MISMATCH: c_int = 213;
const SSL_R_UNKNOWN_PROTOCOL: c_int = 252;
const SSL_R_WRONG_VERSION_NUMBER: c_int = 267;
const SSL_R_BAD_RECORD_TYPE: c_int = 443;

/// SSL reasons raised when the peer's bytes do not frame as TLS records.
const MALFORMED_RECORD_REASONS: [c_int; 8] = [
    SSL_R_WRONG_VERSION_NUMBER,
    SSL_R_HTTP_REQUEST,
    SSL_R_HTTPS_PROXY_REQUEST,
    SSL_R_PACKET_LENGTH_TOO_LONG,
    SSL_R_RECORD_LENGTH_MISMATCH,
    SSL_R_UNKNOWN_PROTOCOL,
    SSL_R_BAD_RECORD_TYPE,
    SSL_R_ENCRYPTED_LENGTH_TOO_LONG,
];

/// Result of a single probe.
pub type ProbeOutcome = Result<CertificateExpiry, ProbeError>;

/// Expiry information for the leaf certificate of a probed endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateExpiry {
    pub hostname: String,
    pub address: String,
    /// The leaf's notAfter
    pub expiry_date: DateTime<Utc>,
    /// Whole days left, negative once expired
    pub days_remaining: i64,
    pub subject: Option<String>,
    pub issuer: Option<String>,
}

/// Verification failures the classifier distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VerifyFailure {
    UnknownIssuer,
    NameMismatch,
    Other,
}

impl VerifyFailure {
    fn from_result(result: X509VerifyResult) -> Option<VerifyFailure> {
        if result == X509VerifyResult::OK {
            return None;
        }
        Some(VerifyFailure::from_code(result.as_raw()))
    }

    fn from_code(code: c_int) -> VerifyFailure {
        match code {
            X509_V_ERR_UNABLE_TO_GET_ISSUER_CERT
            | X509_V_ERR_DEPTH_ZERO_SELF_SIGNED_CERT
            | X509_V_ERR_SELF_SIGNED_CERT_IN_CHAIN
            | X509_V_ERR_UNABLE_TO_GET_ISSUER_CERT_LOCALLY
            | X509_V_ERR_UNABLE_TO_VERIFY_LEAF_SIGNATURE
            | X509_V_ERR_CERT_UNTRUSTED => VerifyFailure::UnknownIssuer,
            X509_V_ERR_HOSTNAME_MISMATCH
            | X509_V_ERR_EMAIL_MISMATCH
            | X509_V_ERR_IP_ADDRESS_MISMATCH => VerifyFailure::NameMismatch,
            _ => VerifyFailure::Other,
        }
    }
}

/// What a failed handshake left behind.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct HandshakeSymptoms {
    verify_failure: Option<VerifyFailure>,
    malformed_record: bool,
}

/// Picks the failure kind for a failed handshake. The first arm that
/// matches wins.
fn classify(symptoms: HandshakeSymptoms) -> FailureKind {
    match symptoms {
        HandshakeSymptoms {
            verify_failure: Some(VerifyFailure::UnknownIssuer),
            ..
        } => FailureKind::UntrustedIssuer,
        HandshakeSymptoms {
            malformed_record: true,
            ..
        } => FailureKind::MalformedHandshakeRecord,
        HandshakeSymptoms {
            verify_failure: Some(VerifyFailure::NameMismatch),
            ..
        } => FailureKind::HostnameMismatch,
        _ => FailureKind::OtherConnectionError,
    }
}

fn is_malformed_record(stack: &ErrorStack) -> bool {
    stack.errors().iter().any(|error| {
        error.library_code() == ERR_LIB_SSL
            && MALFORMED_RECORD_REASONS.contains(&error.reason_code())
    })
}

/// Probes TLS endpoints with a connector built once over the system trust
/// store.
pub struct Prober {
    connector: SslConnector,
}

impl Prober {
    /// Creates a prober that trusts the platform's root certificates.
    pub fn new() -> Result<Prober, ErrorStack> {
        let builder = connector_builder()?;
        Ok(Prober {
            connector: builder.build(),
        })
    }

    /// Creates a prober that also trusts `roots`, for endpoints issued by a
    /// private CA.
    pub fn with_roots(roots: &[X509]) -> Result<Prober, ErrorStack> {
        let mut builder = connector_builder()?;
        for root in roots {
            builder.cert_store_mut().add_cert(root.clone())?;
        }
        Ok(Prober {
            connector: builder.build(),
        })
    }

    /// Probes `target` and reports how long its leaf certificate has left.
    ///
    /// The call blocks for one connection attempt; the connection is closed
    /// before it returns, whatever the outcome.
    pub fn probe(&self, target: &TargetAddress) -> ProbeOutcome {
        let address = target.authority();

        debug!("Connecting to: {}", address);
        let tcp_stream =
            TcpStream::connect(&address).map_err(|e| ProbeError::OtherConnectionError {
                address: address.clone(),
                details: e.to_string(),
            })?;

        let configuration =
            self.connector
                .configure()
                .map_err(|e| ProbeError::OtherConnectionError {
                    address: address.clone(),
                    details: e.to_string(),
                })?;

        let mut stream = configuration
            .connect(&target.hostname, tcp_stream)
            .map_err(|e| handshake_failure(target, &address, e))?;

        match stream.get_ref().peer_addr() {
            Ok(peer) => debug!("Connected to {}", peer),
            Err(_) => debug!("Connected to {}", address),
        }

        let outcome = read_expiry(target, &address, &stream, Utc::now());
        let _ = stream.shutdown();
        outcome
    }
}

/// Probes `target` with a fresh [`Prober`].
///
/// # Example
///
/// ```no_run
/// use checkwebcert::{normalize, probe};
///
/// match probe(&normalize("example.com")) {
///     Ok(expiry) => println!("{} days left", expiry.days_remaining),
///     Err(err) => eprintln!("{}: {}", err.kind(), err),
/// }
/// ```
pub fn probe(target: &TargetAddress) -> ProbeOutcome {
    let prober = Prober::new().map_err(|e| ProbeError::OtherConnectionError {
        address: target.authority(),
        details: e.to_string(),
    })?;
    prober.probe(target)
}

fn connector_builder() -> Result<SslConnectorBuilder, ErrorStack> {
    let mut builder = SslConnector::builder(SslMethod::tls_client())?;

    // the vendored OpenSSL does not know where the platform keeps its roots
    let trust_store = openssl_probe::probe();
    if let Some(cert_file) = trust_store.cert_file {
        builder.set_ca_file(cert_file)?;
    }
    if let Some(cert_dir) = trust_store.cert_dir {
        if let Some(cert_dir) = cert_dir.to_str() {
            builder
                .cert_store_mut()
                .add_lookup(X509Lookup::hash_dir())?
                .add_dir(cert_dir, SslFiletype::PEM)?;
        }
    }

    // An expired leaf is still reported so its negative day count reaches the caller.
    builder.set_verify_callback(SslVerifyMode::PEER, |preverified, context| {
        preverified || context.error().as_raw() == X509_V_ERR_CERT_HAS_EXPIRED
    });

    Ok(builder)
}

fn handshake_failure(
    target: &TargetAddress,
    address: &str,
    error: HandshakeError<TcpStream>,
) -> ProbeError {
    let (symptoms, details) = match error {
        HandshakeError::SetupFailure(stack) => (
            HandshakeSymptoms {
                verify_failure: None,
                malformed_record: is_malformed_record(&stack),
            },
            stack.to_string(),
        ),
        HandshakeError::Failure(mid) | HandshakeError::WouldBlock(mid) => {
            let verify_result = mid.ssl().verify_result();
            let verify_failure = VerifyFailure::from_result(verify_result);
            let malformed_record = mid.error().ssl_error().is_some_and(is_malformed_record);
            let details = match verify_failure {
                Some(_) => format!("{} ({})", verify_result.error_string(), mid.error()),
                None => mid.error().to_string(),
            };
            (
                HandshakeSymptoms {
                    verify_failure,
                    malformed_record,
                },
                details,
            )
        }
    };

    ProbeError::with_kind(classify(symptoms), &target.hostname, address, details)
}

fn read_expiry(
    target: &TargetAddress,
    address: &str,
    stream: &SslStream<TcpStream>,
    now: DateTime<Utc>,
) -> ProbeOutcome {
    let ssl = stream.ssl();
    let leaf = ssl
        .peer_certificate()
        .ok_or_else(|| ProbeError::NoCertificatesPresented {
            address: address.to_string(),
        })?;

    debug!("Verifying hostname: {}", target.hostname);
    verify_hostname(&leaf, &target.hostname).map_err(|details| {
        ProbeError::HostnameMismatch {
            hostname: target.hostname.clone(),
            details,
        }
    })?;

    debug!(
        "Reading certificate chain ({} certificates)",
        ssl.peer_cert_chain().map_or(1, |chain| chain.len())
    );
    let expiry_date =
        asn1_to_utc(leaf.not_after()).map_err(|details| ProbeError::OtherConnectionError {
            address: address.to_string(),
            details,
        })?;

    Ok(CertificateExpiry {
        hostname: target.hostname.clone(),
        address: address.to_string(),
        expiry_date,
        days_remaining: days_between(now, expiry_date),
        subject: common_name(leaf.subject_name()),
        issuer: common_name(leaf.issuer_name()),
    })
}

/// Whole days from `now` until `expiry`, rounded down.
///
/// Sub-second remainders count: an expiry half a second in the past is
/// already day -1.
pub fn days_between(now: DateTime<Utc>, expiry: DateTime<Utc>) -> i64 {
    let remaining = expiry - now;
    let mut seconds = remaining.num_seconds();
    if remaining < TimeDelta::seconds(seconds) {
        seconds -= 1;
    }
    seconds.div_euclid(SECONDS_PER_DAY)
}

fn asn1_to_utc(time: &Asn1TimeRef) -> Result<DateTime<Utc>, String> {
    let epoch = Asn1Time::from_unix(0).map_err(|e| e.to_string())?;
    let diff = epoch.diff(time).map_err(|e| e.to_string())?;
    let seconds = i64::from(diff.days) * SECONDS_PER_DAY + i64::from(diff.secs);
    DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| format!("certificate notAfter {} is out of range", time))
}

fn common_name(name: &X509NameRef) -> Option<String> {
    name.entries_by_nid(Nid::COMMONNAME)
        .next()
        .and_then(|entry| entry.data().as_utf8().ok())
        .map(|data| data.to_string())
}

/// Checks that `cert` is valid for `hostname`.
///
/// Only subjectAltName entries are considered; the subject common name is
/// ignored. IP literals match IP entries, everything else matches DNS entries
/// case-insensitively, with `*` allowed as the whole left-most label.
pub fn verify_hostname(cert: &X509Ref, hostname: &str) -> Result<(), String> {
    let host = hostname.trim_end_matches('.');
    let alt_names = cert
        .subject_alt_names()
        .ok_or_else(|| format!("certificate has no subjectAltName, cannot match {}", hostname))?;

    let ip_literal = host
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .ok();

    let mut presented = Vec::new();
    for name in alt_names.iter() {
        match ip_literal {
            Some(ip) => {
                if let Some(raw) = name.ipaddress() {
                    if ip_matches(ip, raw) {
                        return Ok(());
                    }
                    presented.push(format_ip(raw));
                }
            }
            None => {
                if let Some(dns_name) = name.dnsname() {
                    if dns_name_matches(dns_name, host) {
                        return Ok(());
                    }
                    presented.push(dns_name.to_string());
                }
            }
        }
    }

    if presented.is_empty() {
        Err(format!("certificate has no matching name entries for {}", hostname))
    } else {
        Err(format!(
            "certificate is valid for {}, not {}",
            presented.join(", "),
            hostname
        ))
    }
}

fn ip_matches(ip: IpAddr, raw: &[u8]) -> bool {
    match ip {
        IpAddr::V4(v4) => raw == v4.octets().as_slice(),
        IpAddr::V6(v6) => raw == v6.octets().as_slice(),
    }
}

fn format_ip(raw: &[u8]) -> String {
    if let Ok(octets) = <[u8; 4]>::try_from(raw) {
        return IpAddr::from(octets).to_string();
    }
    if let Ok(octets) = <[u8; 16]>::try_from(raw) {
        return IpAddr::from(octets).to_string();
    }
    format!("{:?}", raw)
}

fn dns_name_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.trim_end_matches('.');
    if pattern.is_empty() || host.is_empty() {
        return false;
    }

    let pattern_labels: Vec<&str> = pattern.split('.').collect();
    let host_labels: Vec<&str> = host.split('.').collect();
    if pattern_labels.len() != host_labels.len() {
        return false;
    }

    pattern_labels
        .iter()
        .zip(host_labels.iter())
        .enumerate()
        .all(|(index, (expected, actual))| {
            (index == 0 && *expected == "*" && !actual.is_empty())
                || expected.eq_ignore_ascii_case(actual)
        })
}
