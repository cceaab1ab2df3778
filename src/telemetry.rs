// src/telemetry.rs
use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up once a recorder is installed).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "leads_source_runs_total",
            "Per-source task outcomes, labelled by platform and status."
        );
        describe_counter!(
            "leads_adapter_errors_total",
            "Adapter errors by platform and kind (auth, rate_limited, unavailable, data_quality, timeout)."
        );
        describe_counter!("leads_retries_total", "Adapter call retries after backoff.");
        describe_counter!(
            "leads_records_dropped_total",
            "Raw records dropped by the normalizer as data quality failures."
        );
        describe_counter!(
            "leads_dedup_merged_total",
            "Raw prospects folded into another by deduplication."
        );
        describe_histogram!(
            "leads_source_latency_ms",
            "Adapter call latency in milliseconds."
        );
        describe_histogram!(
            "leads_run_duration_ms",
            "Wall-clock orchestration time in milliseconds."
        );
        describe_gauge!(
            "leads_last_run_ts",
            "Unix ts when the last orchestration run finished."
        );
    });
}

/// Short stable identifier for logging personal data (names, emails) without
/// writing the value itself.
pub fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.trim().to_lowercase().as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
