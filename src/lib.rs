pub mod artifact_cache;
pub mod cache;
pub mod config;
pub mod maven;
pub mod util;

#[cfg(test)]
pub(crate) fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}
