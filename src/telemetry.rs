//! Prometheus-backed counters.
//!
//! Tailers record through the [`Metrics`] trait; this implementation
//! forwards to the `metrics` facade, and the exporter serves the result over
//! HTTP at `/metrics`.

use std::net::{SocketAddr, ToSocketAddrs};

use anyhow::{Context, Result, anyhow};
use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::PrometheusBuilder;

use logforward_tail::{FileErrorKind, Metrics};

const LINES_TOTAL: &str = "log_forwarder_lines_total";
const FILE_ERRORS_TOTAL: &str = "log_forwarder_file_errors_total";

pub struct PrometheusMetrics;

impl PrometheusMetrics {
    /// Register counter descriptions with the installed recorder
    pub fn new() -> Self {
        describe_counter!(LINES_TOTAL, "Total number of log lines processed per file");
        describe_counter!(FILE_ERRORS_TOTAL, "Total number of file errors");
        Self
    }
}

impl Metrics for PrometheusMetrics {
    fn increment_lines_processed(&self, path: &str, group: &str) {
        counter!(LINES_TOTAL, "path" => path.to_owned(), "group" => group.to_owned()).increment(1);
    }

    fn increment_file_error(&self, path: &str, kind: FileErrorKind) {
        counter!(FILE_ERRORS_TOTAL, "path" => path.to_owned(), "error_type" => kind.as_str())
            .increment(1);
    }
}

/// Resolve the listen address. Empty disables the endpoint; a bare `:port`
/// listens on all interfaces.
pub fn parse_listen_addr(addr: &str) -> Result<Option<SocketAddr>> {
    let addr = addr.trim();
    if addr.is_empty() {
        return Ok(None);
    }

    let full = if addr.starts_with(':') {
        format!("0.0.0.0{}", addr)
    } else {
        addr.to_string()
    };

    full.to_socket_addrs()
        .with_context(|| format!("invalid metrics address '{}'", addr))?
        .next()
        .map(Some)
        .ok_or_else(|| anyhow!("metrics address '{}' did not resolve", addr))
}

/// Install the global recorder and start serving `/metrics`
pub fn install_exporter(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("starting metrics server on {}", addr))
}
