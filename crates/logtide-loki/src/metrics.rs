//! Prometheus counters owned by the Loki source.

use once_cell::sync::Lazy;
use prometheus::{opts, IntCounterVec};

/// Total lines read, labelled by source URL. Initialisation runs once per
/// process, so default-registry registration is idempotent.
pub static LINES_READ: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        opts!("lokisource_hits_total", "Total lines that were read."),
        &["source"],
    )
    .expect("lokisource_hits_total definition is valid");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("lokisource_hits_total registers once");
    counter
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_tracks_per_source_hits() {
        let before = LINES_READ.with_label_values(&["http://127.0.0.1:3100/"]).get();
        LINES_READ.with_label_values(&["http://127.0.0.1:3100/"]).inc();
        let after = LINES_READ.with_label_values(&["http://127.0.0.1:3100/"]).get();
        assert_eq!(after, before + 1);
    }
}
