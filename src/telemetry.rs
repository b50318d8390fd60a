//! Tracing initialization for binaries embedding the core.

/// Initialize the global tracing subscriber with `RUST_LOG`-style filtering.
///
/// Call once at process startup; later calls are ignored rather than
/// panicking, so tests may call it freely.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}
