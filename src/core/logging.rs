//! Logging initialization and utilities

/// Initialize the logging system
///
/// Uses env_logger with default filter level of `info`.
/// Override with RUST_LOG environment variable, e.g. `RUST_LOG=voxtree=debug`
/// to see scheduling and paging activity.
///
/// # Example
/// ```
/// voxtree::core::logging::init();
/// log::info!("Volume service started");
/// ```
pub fn init() {
    // Leave an already installed logger in place
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")
    ).try_init();
}
