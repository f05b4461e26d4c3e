use tracing_subscriber::{fmt, EnvFilter};

/// Initialize tracing output for binaries and long-running callers.
///
/// Default: info for this workspace, overridable with `RUST_LOG`.
/// Calling it twice is harmless; the second init is ignored.
pub fn init(service_name: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("info,fp_core=info,{service_name}=info")));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .try_init();
}
