use tracing_subscriber::EnvFilter;

/// Compact, line-numbered `stdout` logging with an `RUST_LOG`-driven filter,
/// defaulting to `info` when unset. Grounded on the teacher's
/// `configure_tracing` (crates/core/src/startup.rs), stripped of the disk
/// rotation, tracy, and flamegraph layers SPEC_FULL.md has no use for.
pub fn init() {
    let format = tracing_subscriber::fmt::format()
        .with_timer(tracing_subscriber::fmt::time())
        .with_line_number(true)
        .with_file(true)
        .with_target(false)
        .compact();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().event_format(format).with_env_filter(filter).init();
}
