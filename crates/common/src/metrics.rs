use std::sync::Arc;

use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};

#[derive(Clone, Debug)]
pub struct MetricsRegistry {
    inner: Arc<MetricsInner>,
}

#[derive(Debug)]
struct MetricsInner {
    registry: Registry,
    operator_rows_in: CounterVec,
    operator_rows_out: CounterVec,
    operator_batches_in: CounterVec,
    operator_batches_out: CounterVec,
    operator_time_seconds: HistogramVec,
    scheduler_running_stages: GaugeVec,
    scheduler_stages_completed: CounterVec,
    scheduler_stages_failed: CounterVec,
    queries: CounterVec,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::new()),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record_operator(
        &self,
        query_id: &str,
        stage_id: usize,
        operator: &str,
        rows_in: u64,
        rows_out: u64,
        batches_in: u64,
        batches_out: u64,
        secs: f64,
    ) {
        let labels = [query_id, &stage_id.to_string(), operator];
        self.inner
            .operator_rows_in
            .with_label_values(&labels)
            .inc_by(rows_in as f64);
        self.inner
            .operator_rows_out
            .with_label_values(&labels)
            .inc_by(rows_out as f64);
        self.inner
            .operator_batches_in
            .with_label_values(&labels)
            .inc_by(batches_in as f64);
        self.inner
            .operator_batches_out
            .with_label_values(&labels)
            .inc_by(batches_out as f64);
        self.inner
            .operator_time_seconds
            .with_label_values(&labels)
            .observe(secs.max(0.0));
    }

    pub fn set_scheduler_running_stages(&self, query_id: &str, running: u64) {
        self.inner
            .scheduler_running_stages
            .with_label_values(&[query_id])
            .set(running as f64);
    }

    pub fn inc_stage_completed(&self, query_id: &str, stage_id: usize) {
        self.inner
            .scheduler_stages_completed
            .with_label_values(&[query_id, &stage_id.to_string()])
            .inc();
    }

    pub fn inc_stage_failed(&self, query_id: &str, stage_id: usize) {
        self.inner
            .scheduler_stages_failed
            .with_label_values(&[query_id, &stage_id.to_string()])
            .inc();
    }

    /// Count one finished query by statement kind and outcome (`ok` / `error`).
    pub fn inc_query(&self, kind: &str, status: &str) {
        self.inner
            .queries
            .with_label_values(&[kind, status])
            .inc();
    }

    pub fn render_prometheus(&self) -> String {
        let metric_families = self.inner.registry.gather();
        let mut out = Vec::new();
        let enc = TextEncoder::new();
        if enc.encode(&metric_families, &mut out).is_err() {
            return String::new();
        }
        String::from_utf8_lossy(&out).to_string()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsInner {
    fn new() -> Self {
        let registry = Registry::new();
        let op_labels = &["query_id", "stage_id", "operator"];

        let operator_rows_in = counter_vec(
            &registry,
            "quiver_operator_rows_in_total",
            "Input rows processed per operator",
            op_labels,
        );
        let operator_rows_out = counter_vec(
            &registry,
            "quiver_operator_rows_out_total",
            "Output rows produced per operator",
            op_labels,
        );
        let operator_batches_in = counter_vec(
            &registry,
            "quiver_operator_batches_in_total",
            "Input batches processed per operator",
            op_labels,
        );
        let operator_batches_out = counter_vec(
            &registry,
            "quiver_operator_batches_out_total",
            "Output batches produced per operator",
            op_labels,
        );
        let operator_time_seconds = histogram_vec(
            &registry,
            "quiver_operator_time_seconds",
            "Time spent in each operator",
            op_labels,
        );

        let scheduler_running_stages = gauge_vec(
            &registry,
            "quiver_scheduler_running_stages",
            "Pipeline stages currently running",
            &["query_id"],
        );
        let scheduler_stages_completed = counter_vec(
            &registry,
            "quiver_scheduler_stages_completed_total",
            "Pipeline stages that ran to completion",
            &["query_id", "stage_id"],
        );
        let scheduler_stages_failed = counter_vec(
            &registry,
            "quiver_scheduler_stages_failed_total",
            "Pipeline stages that failed",
            &["query_id", "stage_id"],
        );
        let queries = counter_vec(
            &registry,
            "quiver_queries_total",
            "Queries by statement kind and outcome",
            &["kind", "status"],
        );

        Self {
            registry,
            operator_rows_in,
            operator_rows_out,
            operator_batches_in,
            operator_batches_out,
            operator_time_seconds,
            scheduler_running_stages,
            scheduler_stages_completed,
            scheduler_stages_failed,
            queries,
        }
    }
}

fn counter_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> CounterVec {
    let c = CounterVec::new(Opts::new(name, help), labels).expect("counter vec");
    registry
        .register(Box::new(c.clone()))
        .expect("register counter");
    c
}

fn gauge_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> GaugeVec {
    let g = GaugeVec::new(Opts::new(name, help), labels).expect("gauge vec");
    registry
        .register(Box::new(g.clone()))
        .expect("register gauge");
    g
}

fn histogram_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> HistogramVec {
    let h = HistogramVec::new(HistogramOpts::new(name, help), labels).expect("histogram vec");
    registry
        .register(Box::new(h.clone()))
        .expect("register histogram");
    h
}

#[cfg(test)]
mod tests {
    use super::MetricsRegistry;

    #[test]
    fn renders_prometheus_text() {
        let m = MetricsRegistry::new();
        m.record_operator("q1", 0, "TableScan", 0, 10, 0, 1, 0.01);
        let text = m.render_prometheus();
        assert!(text.contains("quiver_operator_rows_out_total"));
        assert!(text.contains("TableScan"));
    }

    #[test]
    fn renders_scheduler_and_query_families() {
        let m = MetricsRegistry::new();
        m.set_scheduler_running_stages("q1", 2);
        m.inc_stage_completed("q1", 0);
        m.inc_stage_failed("q1", 1);
        m.inc_query("select", "ok");
        let text = m.render_prometheus();

        assert!(text.contains("quiver_scheduler_running_stages"));
        assert!(text.contains("quiver_scheduler_stages_completed_total"));
        assert!(text.contains("quiver_scheduler_stages_failed_total"));
        assert!(text.contains("quiver_queries_total"));
    }

    #[test]
    fn registries_are_independent() {
        let a = MetricsRegistry::new();
        let b = MetricsRegistry::new();
        a.inc_query("insert", "ok");
        assert!(a.render_prometheus().contains("insert"));
        assert!(!b.render_prometheus().contains("insert"));
    }
}
