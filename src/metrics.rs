use prometheus::{
    CounterVec, Encoder, Gauge, HistogramVec, TextEncoder, histogram_opts, opts,
    register_counter_vec, register_gauge, register_histogram_vec,
};

use std::sync::LazyLock;

static MESSAGES_SENT_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    register_counter_vec!(
        opts!("messages_sent_total", "Chat messages appended"),
        &["kind"]
    )
    .unwrap()
});

static POSTS_CREATED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    register_counter_vec!(
        opts!("posts_created_total", "Feed records created"),
        &["collection"]
    )
    .unwrap()
});

static SNAPSHOTS_DELIVERED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    register_counter_vec!(
        opts!(
            "snapshots_delivered_total",
            "Live query snapshots delivered to observers"
        ),
        &["collection"]
    )
    .unwrap()
});

static SUBSCRIPTIONS_ACTIVE: LazyLock<Gauge> = LazyLock::new(|| {
    register_gauge!(opts!("subscriptions_active", "Open live query views")).unwrap()
});

static MEDIA_UPLOADS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    register_counter_vec!(
        opts!("media_uploads_total", "Media blobs uploaded"),
        &["purpose"]
    )
    .unwrap()
});

static STORE_OP_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "store_op_duration_seconds",
            "Duration of document store operations in seconds"
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        &["operation"]
    )
    .unwrap()
});

// ------------------------------------------------------------
// METRICS TEXT EXPORT
// ------------------------------------------------------------
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metrics = prometheus::gather();
    let mut buffer = Vec::new();

    encoder.encode(&metrics, &mut buffer)?;

    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

// ------------------------------------------------------------
// METRIC HELPERS
// ------------------------------------------------------------
pub struct Metrics;

impl Metrics {
    pub fn message_sent(kind: &str) {
        MESSAGES_SENT_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn record_created(collection: &str) {
        POSTS_CREATED_TOTAL.with_label_values(&[collection]).inc();
    }

    pub fn snapshot_delivered(collection: &str) {
        SNAPSHOTS_DELIVERED_TOTAL
            .with_label_values(&[collection])
            .inc();
    }

    pub fn subscription_opened() {
        SUBSCRIPTIONS_ACTIVE.inc();
    }

    pub fn subscription_closed() {
        SUBSCRIPTIONS_ACTIVE.dec();
    }

    pub fn media_uploaded(purpose: &str) {
        MEDIA_UPLOADS_TOTAL.with_label_values(&[purpose]).inc();
    }

    pub fn observe_store_op(operation: &str, duration: std::time::Duration) {
        STORE_OP_DURATION_SECONDS
            .with_label_values(&[operation])
            .observe(duration.as_secs_f64());
    }
}
