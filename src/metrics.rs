use prometheus::{CounterVec, Encoder, IntGauge, Registry, TextEncoder, opts};

/// Prometheus metrics registry and collectors for the authoritative DNS
/// daemon. Deliberately minimal: counters/gauges for query handling and
/// XFR/NOTIFY/UPDATE outcomes, with no HTTP exposition surface of its own —
/// a caller wanting `/metrics` wires `render()`'s output into whatever
/// scrape endpoint it already runs.
pub struct DnsMetrics {
    registry: Registry,

    queries_total: CounterVec,
    malformed_packets: CounterVec,
    error_responses: CounterVec,

    xfr_transfers_total: CounterVec,
    xfr_worker_occupancy: IntGauge,
    notify_total: CounterVec,
    updates_total: CounterVec,
}

impl DnsMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let queries_total = CounterVec::new(
            opts!("knotd_queries_total", "Total number of DNS queries processed"),
            &["protocol", "opcode", "rcode"],
        )?;

        let malformed_packets = CounterVec::new(
            opts!(
                "knotd_malformed_packets_total",
                "Total number of malformed DNS packets received"
            ),
            &["protocol"],
        )?;

        let error_responses = CounterVec::new(
            opts!("knotd_error_responses_total", "Total error responses by type"),
            &["response_type", "protocol"],
        )?;

        let xfr_transfers_total = CounterVec::new(
            opts!(
                "knotd_xfr_transfers_total",
                "Total zone transfers by kind and outcome"
            ),
            &["kind", "outcome"],
        )?;

        let xfr_worker_occupancy = IntGauge::with_opts(opts!(
            "knotd_xfr_worker_occupancy",
            "Number of XFR worker slots currently in use"
        ))?;

        let notify_total = CounterVec::new(
            opts!("knotd_notify_total", "Total NOTIFY messages by direction and result"),
            &["direction", "result"],
        )?;

        let updates_total = CounterVec::new(
            opts!("knotd_updates_total", "Total dynamic updates by result"),
            &["result"],
        )?;

        registry.register(Box::new(queries_total.clone()))?;
        registry.register(Box::new(malformed_packets.clone()))?;
        registry.register(Box::new(error_responses.clone()))?;
        registry.register(Box::new(xfr_transfers_total.clone()))?;
        registry.register(Box::new(xfr_worker_occupancy.clone()))?;
        registry.register(Box::new(notify_total.clone()))?;
        registry.register(Box::new(updates_total.clone()))?;

        Ok(DnsMetrics {
            registry,
            queries_total,
            malformed_packets,
            error_responses,
            xfr_transfers_total,
            xfr_worker_occupancy,
            notify_total,
            updates_total,
        })
    }

    pub fn record_query(&self, protocol: &str, opcode: &str, rcode: &str) {
        self.queries_total
            .with_label_values(&[protocol, opcode, rcode])
            .inc();
    }

    pub fn record_malformed_packet(&self, protocol: &str) {
        self.malformed_packets.with_label_values(&[protocol]).inc();
    }

    pub fn record_error_response(&self, response_type: &str, protocol: &str) {
        self.error_responses
            .with_label_values(&[response_type, protocol])
            .inc();
    }

    pub fn record_xfr_outcome(&self, kind: &str, outcome: &str) {
        self.xfr_transfers_total.with_label_values(&[kind, outcome]).inc();
    }

    pub fn set_xfr_worker_occupancy(&self, count: i64) {
        self.xfr_worker_occupancy.set(count);
    }

    pub fn record_notify(&self, direction: &str, result: &str) {
        self.notify_total.with_label_values(&[direction, result]).inc();
    }

    pub fn record_update(&self, result: &str) {
        self.updates_total.with_label_values(&[result]).inc();
    }

    /// Renders the registry in Prometheus text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).to_string())
    }
}

impl Default for DnsMetrics {
    fn default() -> Self {
        Self::new().expect("metric registration with fixed, non-conflicting names cannot fail")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_recorded_counters() {
        let metrics = DnsMetrics::new().unwrap();
        metrics.record_xfr_outcome("axfr", "success");
        metrics.record_query("udp", "query", "noerror");

        let text = metrics.render().unwrap();
        assert!(text.contains("knotd_xfr_transfers_total"));
        assert!(text.contains("knotd_queries_total"));
    }
}
