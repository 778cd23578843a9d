//! Error and failure types.
//!
//! The crate separates three kinds of "things that went wrong":
//!
//! - [`NavigationFailure`]: an expected, frequent outcome of a navigation
//!   attempt (duplicate target, guard veto, superseded navigation). Failures
//!   are reported to after-hooks and returned from navigation calls, but the
//!   plugins never treat them as errors.
//! - [`RouterError`] / [`StorageError`]: problems in the host router or the
//!   persistence backend.
//! - [`PluginError`]: setup problems (missing router, plugin used before it
//!   was installed). These are the only errors surfaced as `Err` from plugin
//!   operations; validation problems are logged and policy vetoes are plain
//!   `bool` results.
//!
//! # Examples
//!
//! ```
//! use navigator_plugins::error::{NavigationFailure, PluginError};
//!
//! let failure = NavigationFailure::Duplicated { to: "/home".into() };
//! assert!(failure.is_duplicated());
//! assert_eq!(failure.to_string(), "Avoided redundant navigation to current location: /home");
//!
//! let err = PluginError::NotBound { plugin: "tabs" };
//! assert_eq!(err.to_string(), "Plugin 'tabs' is not installed into a plugin host yet");
//! ```

use std::fmt;

// ============================================================================
// Navigation failures
// ============================================================================

/// Why a navigation attempt did not commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationFailure {
    /// A guard denied the navigation (or there was no history entry to go to).
    Aborted { reason: String },

    /// A newer navigation started while this one was still running guards.
    Cancelled { to: String },

    /// The target is the current location.
    Duplicated { to: String },
}

impl NavigationFailure {
    /// Check if a guard aborted the navigation
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }

    /// Check if a newer navigation superseded this one
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Check if the navigation targeted the current location
    pub fn is_duplicated(&self) -> bool {
        matches!(self, Self::Duplicated { .. })
    }
}

impl fmt::Display for NavigationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aborted { reason } => write!(f, "Navigation aborted: {}", reason),
            Self::Cancelled { to } => {
                write!(f, "Navigation cancelled by a newer navigation: {}", to)
            }
            Self::Duplicated { to } => write!(
                f,
                "Avoided redundant navigation to current location: {}",
                to
            ),
        }
    }
}

impl std::error::Error for NavigationFailure {}

// ============================================================================
// Router errors
// ============================================================================

/// Errors raised by the host router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    /// A route record failed validation at registration time.
    InvalidRoute { path: String, message: String },

    /// An operation needed the current route before [`Router::start`](crate::router::Router::start) ran.
    NotStarted,
}

impl fmt::Display for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRoute { path, message } => {
                write!(f, "Invalid route '{}': {}", path, message)
            }
            Self::NotStarted => write!(f, "Router has not performed its initial navigation"),
        }
    }
}

impl std::error::Error for RouterError {}

// ============================================================================
// Storage errors
// ============================================================================

/// Errors raised by a [`Storage`](crate::storage::Storage) backend or a codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The backend failed to read or write.
    Backend(String),

    /// A value could not be encoded or decoded.
    Codec(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend(message) => write!(f, "Storage backend error: {}", message),
            Self::Codec(message) => write!(f, "Storage codec error: {}", message),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

// ============================================================================
// Plugin errors
// ============================================================================

/// Setup-time errors of the plugin host and its plugins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginError {
    /// The plugin host was built without a router.
    RouterMissing,

    /// A plugin was used before being installed into a host.
    NotBound { plugin: &'static str },

    /// A plugin instance was installed twice.
    AlreadyInstalled { plugin: &'static str },

    /// Persisted state could not be read during installation.
    Storage(StorageError),

    /// The host router rejected an operation.
    Router(RouterError),
}

impl fmt::Display for PluginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RouterMissing => {
                write!(f, "A router must be provided before installing plugins")
            }
            Self::NotBound { plugin } => {
                write!(f, "Plugin '{}' is not installed into a plugin host yet", plugin)
            }
            Self::AlreadyInstalled { plugin } => {
                write!(f, "Plugin '{}' is already installed", plugin)
            }
            Self::Storage(err) => write!(f, "{}", err),
            Self::Router(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for PluginError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            Self::Router(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for PluginError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

impl From<RouterError> for PluginError {
    fn from(err: RouterError) -> Self {
        Self::Router(err)
    }
}

// ============================================================================
// Tests
// ============================================================================
