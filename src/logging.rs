//! Log output for the router and its plugins.
//!
//! The crate never talks to a logging framework directly. Every message goes
//! through the macros below, which forward to [`log`](https://docs.rs/log)
//! or [`tracing`](https://docs.rs/tracing) depending on the enabled feature.
//! Enable one backend; with neither, messages are discarded.
//!
//! | Feature    | Backend         | Default |
//! |------------|-----------------|---------|
//! | `log`      | `log` crate     | yes     |
//! | `tracing`  | `tracing` crate | no      |
//!
//! Levels, as used across the crate:
//!
//! | Macro          | Used for                                              |
//! |----------------|-------------------------------------------------------|
//! | `trace_log!`   | per-navigation detail: classification, resolution     |
//! | `debug_log!`   | state changes: payload commits, tab and cache updates |
//! | `info_log!`    | committed navigations, host lifecycle                 |
//! | `warn_log!`    | blocked navigations, ignored overrides                |
//! | `error_log!`   | redirect loops                                        |
//! | `plugin_warn!` | recoverable plugin validation problems                |
//!
//! ```ignore
//! use navigator_plugins::{debug_log, plugin_warn, trace_log};
//!
//! trace_log!("Classified '{}' → '{}' as {:?}", from, to, direction);
//! debug_log!("Committing details for '{}'", key);
//! plugin_warn!("tabs", "cannot resolve tab id from index {}", index);
//! ```

/// Forward `format!`-style arguments to the enabled backend at `$level`.
#[doc(hidden)]
#[macro_export]
macro_rules! __dispatch_log {
    ($level:ident, $($arg:tt)*) => {{
        #[cfg(feature = "tracing")]
        ::tracing::$level!($($arg)*);
        #[cfg(feature = "log")]
        ::log::$level!($($arg)*);
    }};
}

/// Log at **trace** level.
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        $crate::__dispatch_log!(trace, $($arg)*)
    };
}

/// Log at **debug** level.
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        $crate::__dispatch_log!(debug, $($arg)*)
    };
}

/// Log at **info** level.
#[macro_export]
macro_rules! info_log {
    ($($arg:tt)*) => {
        $crate::__dispatch_log!(info, $($arg)*)
    };
}

/// Log at **warn** level.
#[macro_export]
macro_rules! warn_log {
    ($($arg:tt)*) => {
        $crate::__dispatch_log!(warn, $($arg)*)
    };
}

/// Log at **error** level.
#[macro_export]
macro_rules! error_log {
    ($($arg:tt)*) => {
        $crate::__dispatch_log!(error, $($arg)*)
    };
}

/// Warn with the emitting plugin's name in brackets.
///
/// `plugin_warn!("tabs", "missing page for '{}'", path)` logs
/// `[tabs] missing page for '/x'`. Validation problems are reported here and
/// the operation that hit them becomes a no-op.
#[macro_export]
macro_rules! plugin_warn {
    ($plugin:expr, $($arg:tt)*) => {
        $crate::warn_log!("[{}] {}", $plugin, format_args!($($arg)*))
    };
}
