//! Navigation guards and the action type they return.
//!
//! Guards run **before** a navigation commits and decide whether it may
//! proceed, must be denied, or should be redirected elsewhere. After-hooks
//! run once a navigation settled, committed or not, and receive the failure
//! when there was one.
//!
//! Guards are asynchronous: a guard may await user-supplied predicates or
//! lazily loaded components. The router awaits guards one at a time in
//! registration order, so two guards of the same navigation never interleave.
//!
//! # Example
//!
//! ```
//! use navigator_plugins::guards::{guard_fn, NavigationAction};
//!
//! let guard = guard_fn(|to, _from| async move {
//!     if to.path.starts_with("/admin") {
//!         NavigationAction::redirect("/login")
//!     } else {
//!         NavigationAction::Continue
//!     }
//! });
//! # let _ = guard;
//! ```

use crate::error::NavigationFailure;
use crate::route::Route;
use futures::future::{FutureExt, LocalBoxFuture};
use std::future::Future;
use std::rc::Rc;

// ============================================================================
// NavigationAction
// ============================================================================

/// Result of a guard or a start-of-navigation subscriber.
///
/// # Example
///
/// ```
/// use navigator_plugins::NavigationAction;
///
/// let action = NavigationAction::deny("Not authorized");
/// assert!(action.is_deny());
///
/// let action = NavigationAction::redirect("/login");
/// assert_eq!(action.redirect_path(), Some("/login"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NavigationAction {
    /// Allow navigation to proceed.
    #[default]
    Continue,

    /// Deny navigation with a reason.
    Deny {
        /// Human-readable reason for denying navigation.
        reason: String,
    },

    /// Redirect to a different location.
    Redirect {
        /// Location to redirect to.
        to: String,
        /// Optional human-readable reason for redirecting.
        reason: Option<String>,
    },
}

impl NavigationAction {
    /// Create a result that blocks navigation with a human-readable reason.
    pub fn deny(reason: impl Into<String>) -> Self {
        Self::Deny {
            reason: reason.into(),
        }
    }

    /// Create a result that redirects navigation to a different location.
    pub fn redirect(to: impl Into<String>) -> Self {
        Self::Redirect {
            to: to.into(),
            reason: None,
        }
    }

    /// Create a redirect result with a human-readable reason.
    pub fn redirect_with_reason(to: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Redirect {
            to: to.into(),
            reason: Some(reason.into()),
        }
    }

    /// Check if this action allows navigation to continue.
    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue)
    }

    /// Check if this action denies navigation.
    pub fn is_deny(&self) -> bool {
        matches!(self, Self::Deny { .. })
    }

    /// Check if this action redirects navigation.
    pub fn is_redirect(&self) -> bool {
        matches!(self, Self::Redirect { .. })
    }

    /// Get the redirect location, if this is a redirect action.
    pub fn redirect_path(&self) -> Option<&str> {
        match self {
            Self::Redirect { to, .. } => Some(to.as_str()),
            _ => None,
        }
    }
}

impl From<bool> for NavigationAction {
    /// `true` continues, `false` denies without a reason.
    fn from(allowed: bool) -> Self {
        if allowed {
            Self::Continue
        } else {
            Self::deny("Navigation vetoed")
        }
    }
}

// ============================================================================
// Guard and hook types
// ============================================================================

/// Handle returned by guard registration, used to remove the guard again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GuardId(pub(crate) usize);

/// A before-navigation guard receiving `(to, from)`.
pub type Guard = Rc<dyn Fn(Route, Route) -> LocalBoxFuture<'static, NavigationAction>>;

/// An after-navigation hook receiving `(to, from, failure)`.
pub type AfterHook =
    Rc<dyn Fn(Route, Route, Option<NavigationFailure>) -> LocalBoxFuture<'static, ()>>;

/// Create a [`Guard`] from an async closure.
pub fn guard_fn<F, Fut>(f: F) -> Guard
where
    F: Fn(Route, Route) -> Fut + 'static,
    Fut: Future<Output = NavigationAction> + 'static,
{
    Rc::new(move |to, from| f(to, from).boxed_local())
}

/// Create an [`AfterHook`] from an async closure.
pub fn after_fn<F, Fut>(f: F) -> AfterHook
where
    F: Fn(Route, Route, Option<NavigationFailure>) -> Fut + 'static,
    Fut: Future<Output = ()> + 'static,
{
    Rc::new(move |to, from, failure| f(to, from, failure).boxed_local())
}

/// Run guards in order; the first non-[`Continue`](NavigationAction::Continue)
/// result short-circuits.
pub async fn run_guards(guards: &[Guard], to: &Route, from: &Route) -> NavigationAction {
    for guard in guards {
        let action = guard(to.clone(), from.clone()).await;
        if !action.is_continue() {
            return action;
        }
    }
    NavigationAction::Continue
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_navigation_action_variants() {
        let action = NavigationAction::Continue;
        assert!(action.is_continue());
        assert_eq!(action.redirect_path(), None);

        let action = NavigationAction::redirect_with_reason("/login", "Auth required");
        assert!(action.is_redirect());
        assert_eq!(action.redirect_path(), Some("/login"));

        assert!(NavigationAction::deny("x").is_deny());
        assert_eq!(NavigationAction::default(), NavigationAction::Continue);
    }

    #[test]
    fn test_from_bool() {
        assert!(NavigationAction::from(true).is_continue());
        assert!(NavigationAction::from(false).is_deny());
    }

    #[test]
    fn test_run_guards_short_circuits() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let first = {
            let calls = calls.clone();
            guard_fn(move |_to, _from| {
                calls.borrow_mut().push("first");
                async { NavigationAction::Continue }
            })
        };
        let second = {
            let calls = calls.clone();
            guard_fn(move |_to, _from| {
                calls.borrow_mut().push("second");
                async { NavigationAction::redirect("/elsewhere") }
            })
        };
        let third = {
            let calls = calls.clone();
            guard_fn(move |_to, _from| {
                calls.borrow_mut().push("third");
                async { NavigationAction::Continue }
            })
        };

        let route = Route::start();
        let result = pollster::block_on(run_guards(&[first, second, third], &route, &route));

        assert_eq!(result.redirect_path(), Some("/elsewhere"));
        assert_eq!(*calls.borrow(), vec!["first", "second"]);
    }
}
