//! Global initialization. Kept in its own test binary: the subscriber is process-wide.

use percolate_log::{Config, Format, LogError};

#[test]
fn second_init_is_a_noop() {
    let first = percolate_log::init_with(Config::default().with_format(Format::Json)).unwrap();
    assert!(first.installed());

    let second = percolate_log::auto_init().unwrap();
    assert!(!second.installed());

    tracing::info!(key = "barista-queue", "still logging");
}

#[test]
fn bad_filter_is_reported_before_install() {
    let config = Config::default().with_level("percolate_poll=loudest");
    let err = percolate_log::LoggerBuilder::from_config(config)
        .build()
        .unwrap_err();
    assert!(matches!(err, LogError::Filter { .. }));
}
