//! Logging utilities and invariant reporting

pub use log::{debug, error, info, trace, warn};

/// Initialize the logging system from `RUST_LOG`
///
/// Safe to call more than once; later calls are ignored.
pub fn init() {
    if env_logger::try_init().is_err() {
        log::debug!("Logger already initialized");
    }
}

/// Initialize logging with a default filter used when `RUST_LOG` is unset
pub fn init_with_level(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    if env_logger::Builder::from_env(env).try_init().is_err() {
        log::debug!("Logger already initialized");
    }
}

/// Report a broken internal invariant
///
/// Logs the message at error level and trips a `debug_assert!`. Evaluates to
/// the condition so release builds can skip the offending operation:
///
/// ```
/// # use lumen_engine::invariant;
/// let count = 0usize;
/// if !invariant!(count == 0, "{} components left", count) {
///     return;
/// }
/// ```
#[macro_export]
macro_rules! invariant {
    ($cond:expr, $($arg:tt)+) => {{
        let holds: bool = $cond;
        if !holds {
            ::log::error!("Invariant violated: {}", format_args!($($arg)+));
            debug_assert!(holds, $($arg)+);
        }
        holds
    }};
}
