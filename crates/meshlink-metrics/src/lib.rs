//! Metric declarations for meshlink nodes.
//!
//! Every metric a node emits is declared once in [`metric_defs`] with its kind,
//! unit, description and label keys. Emission goes through the `metrics` facade
//! (re-exported here), so nothing is recorded until the embedding application
//! installs a recorder.
//!
//! # Example
//!
//! ```rust
//! use meshlink_metrics::{metric_defs, metrics, NodeLabels};
//!
//! let labels = NodeLabels::new(0x0001);
//! metrics::counter!(
//!     metric_defs::PACKET_TX.name,
//!     &labels.with("protocol", "unicast")
//! )
//! .increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// The kind of metric (counter, gauge, or histogram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A gauge that can go up and down.
    Gauge,
    /// A histogram for recording distributions.
    Histogram,
}

impl MetricKind {
    /// Returns the kind as a lowercase string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

/// A metric declaration with its metadata.
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name (e.g., "meshlink.packet.rx").
    pub name: &'static str,
    /// The kind of metric.
    pub kind: MetricKind,
    /// Human-readable description.
    pub description: &'static str,
    /// The unit of measurement.
    pub unit: Unit,
    /// Expected label keys.
    pub labels: &'static [&'static str],
}

impl Metric {
    const fn new(name: &'static str, kind: MetricKind) -> Self {
        Self {
            name,
            kind,
            description: "",
            unit: Unit::Count,
            labels: &["node"],
        }
    }

    /// Declare a counter.
    pub const fn counter(name: &'static str) -> Self {
        Self::new(name, MetricKind::Counter)
    }

    /// Declare a gauge.
    pub const fn gauge(name: &'static str) -> Self {
        Self::new(name, MetricKind::Gauge)
    }

    /// Declare a histogram.
    pub const fn histogram(name: &'static str) -> Self {
        Self::new(name, MetricKind::Histogram)
    }

    /// Sets the description.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Sets the unit.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = unit;
        self
    }

    /// Sets the expected label keys.
    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Registers this metric's description with the installed recorder.
    pub fn describe(&self) {
        match self.kind {
            MetricKind::Counter => describe_counter!(self.name, self.unit, self.description),
            MetricKind::Gauge => describe_gauge!(self.name, self.unit, self.description),
            MetricKind::Histogram => describe_histogram!(self.name, self.unit, self.description),
        }
    }
}

/// All metric definitions.
pub mod metric_defs {
    use super::{Metric, Unit};

    // ========================================================================
    // Framing
    // ========================================================================

    /// Frames pulled off the serial stream.
    pub const FRAME_RX: Metric = Metric::counter("meshlink.frame.rx")
        .with_description("SLIP frames decoded from the serial stream");

    /// Frames discarded because of bad escapes or size.
    pub const FRAME_ERRORS: Metric = Metric::counter("meshlink.frame.errors")
        .with_description("SLIP frames discarded as malformed");

    /// Failed reads from the serial link.
    pub const TRANSPORT_ERRORS: Metric = Metric::counter("meshlink.transport.errors")
        .with_description("Transport reads that returned an error");

    // ========================================================================
    // Packets
    // ========================================================================

    /// Packets accepted for dispatch.
    ///
    /// Labels: node, protocol
    pub const PACKET_RX: Metric = Metric::counter("meshlink.packet.rx")
        .with_description("Packets received and dispatched")
        .with_labels(&["node", "protocol"]);

    /// Packets written to the transport.
    ///
    /// Labels: node, protocol
    pub const PACKET_TX: Metric = Metric::counter("meshlink.packet.tx")
        .with_description("Packets written to the transport")
        .with_labels(&["node", "protocol"]);

    /// Packets discarded before or during dispatch.
    ///
    /// Labels: node, reason (not_for_us, too_short, length_mismatch,
    /// checksum_mismatch, unknown_protocol, bad_ack, device_command, malformed)
    pub const PACKET_DROPPED: Metric = Metric::counter("meshlink.packet.dropped")
        .with_description("Packets discarded instead of dispatched")
        .with_labels(&["node", "reason"]);

    // ========================================================================
    // Reliability
    // ========================================================================

    /// Retransmissions of unacknowledged packets.
    pub const RETRANSMISSIONS: Metric = Metric::counter("meshlink.reliability.retransmissions")
        .with_description("Packets sent again after the ack timeout");

    /// Reliable messages acknowledged by their destination.
    pub const DELIVERED: Metric = Metric::counter("meshlink.reliability.delivered")
        .with_description("Reliable messages acknowledged by the destination");

    /// Reliable messages abandoned after the retry budget ran out.
    pub const DELIVERY_FAILED: Metric = Metric::counter("meshlink.reliability.failed")
        .with_description("Reliable messages abandoned without an ack");

    /// Time from the first transmission to the matching Ack.
    pub const ACK_LATENCY: Metric = Metric::histogram("meshlink.reliability.ack_latency_ms")
        .with_description("Time from first transmission to acknowledgement")
        .with_unit(Unit::Milliseconds);

    /// Messages currently awaiting an Ack.
    pub const PENDING_ACKS: Metric = Metric::gauge("meshlink.reliability.pending")
        .with_description("Messages awaiting acknowledgement");

    // ========================================================================
    // Neighbors
    // ========================================================================

    /// Nodes heard from via Hello.
    pub const NEIGHBORS_KNOWN: Metric = Metric::gauge("meshlink.neighbors.known")
        .with_description("Nodes a Hello has been received from");

    /// Returns a slice of all defined metrics.
    pub const ALL: &[&Metric] = &[
        &FRAME_RX,
        &FRAME_ERRORS,
        &TRANSPORT_ERRORS,
        &PACKET_RX,
        &PACKET_TX,
        &PACKET_DROPPED,
        &RETRANSMISSIONS,
        &DELIVERED,
        &DELIVERY_FAILED,
        &ACK_LATENCY,
        &PENDING_ACKS,
        &NEIGHBORS_KNOWN,
    ];
}

/// Labels identifying the node a metric belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLabels {
    /// Node address, formatted as `0xNNNN`.
    pub node: String,
}

impl NodeLabels {
    /// Labels for the node with the given raw address.
    pub fn new(address: u16) -> Self {
        NodeLabels {
            node: format!("0x{:04X}", address),
        }
    }

    /// Converts the labels to the metrics crate label format.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![("node", self.node.clone())]
    }

    /// Returns the node label plus one extra key-value pair.
    pub fn with(&self, key: &'static str, value: impl Into<String>) -> Vec<(&'static str, String)> {
        let mut labels = self.to_labels();
        labels.push((key, value.into()));
        labels
    }
}

/// Describes every metric in [`metric_defs::ALL`].
///
/// Call once at startup, after installing a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_labels() {
        let labels = NodeLabels::new(0x2A);
        assert_eq!(labels.to_labels(), vec![("node", "0x002A".to_string())]);

        let extended = labels.with("reason", "not_for_us");
        assert_eq!(extended.len(), 2);
        assert!(extended.contains(&("reason", "not_for_us".to_string())));
    }

    #[test]
    fn test_metric_definitions() {
        assert_eq!(metric_defs::PACKET_RX.kind, MetricKind::Counter);
        assert_eq!(metric_defs::PACKET_RX.labels, &["node", "protocol"]);
        assert_eq!(metric_defs::ACK_LATENCY.kind, MetricKind::Histogram);
        assert_eq!(metric_defs::ACK_LATENCY.unit, Unit::Milliseconds);
        assert_eq!(metric_defs::NEIGHBORS_KNOWN.kind, MetricKind::Gauge);
        assert_eq!(metric_defs::FRAME_RX.labels, &["node"]);
    }

    #[test]
    fn test_metric_names_unique() {
        let mut names: Vec<&str> = metric_defs::ALL.iter().map(|m| m.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), metric_defs::ALL.len());
        assert!(names.iter().all(|n| n.starts_with("meshlink.")));
    }

    #[test]
    fn test_describe_without_recorder() {
        // No recorder installed: describing is a no-op and must not panic
        describe_metrics();
    }
}
