//! Prometheus exporter.
//!
//! In exporter mode the target is probed on a fixed interval and the latest
//! result is published as gauges on a pull-based `/metrics` endpoint.
//!
//! # Submodules
//!
//! - `prom` - the certificate gauges and their registry
//! - `exporter` - polling loop and HTTP endpoint

pub mod exporter;
pub mod prom;

pub use exporter::Exporter;
pub use prom::CertificateMetrics;
