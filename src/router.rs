//! In-memory history router.
//!
//! The router owns the route table, the history stack and the guard chain.
//! Plugins never reach into it directly; they observe navigations through
//! the hook interface it exposes:
//!
//! - [`Router::before_each`]: guards run first, in registration order
//! - [`Router::before_resolve`]: guards run after every `before_each` guard
//! - [`Router::after_each`]: hooks run once a navigation settled, committed
//!   or failed
//!
//! # Navigation pipeline
//!
//! 1. Plan the history move (push, replace or pop) and resolve the target
//! 2. Reject a push/replace to the current location as a duplicate
//! 3. Await every guard; `Deny` aborts, `Redirect` restarts the pipeline
//!    (capped at [`MAX_REDIRECT_DEPTH`])
//! 4. Abandon the attempt if a newer navigation started meanwhile
//! 5. Commit the history move and run after-hooks
//!
//! Navigation futures are `'static`: they hold a clone of the router handle,
//! not a borrow of it, so a guard may itself start a navigation.
//!
//! # Example
//!
//! ```
//! use navigator_plugins::router::Router;
//! use navigator_plugins::route::RouteRecord;
//!
//! let router = Router::new();
//! router.add_route(RouteRecord::new("/")).unwrap();
//! router.add_route(RouteRecord::new("/users/:id")).unwrap();
//!
//! pollster::block_on(async {
//!     router.start("/").await.unwrap();
//!     let route = router.push("/users/7").await.unwrap();
//!     assert_eq!(route.params.get("id"), Some(&"7".to_string()));
//!     assert_eq!(route.position, Some(1));
//! });
//! ```

use crate::error::{NavigationFailure, RouterError};
use crate::guards::{AfterHook, Guard, GuardId, NavigationAction};
use crate::history::{History, HistoryMove};
use crate::params::{full_path, split_location};
use crate::resolve::resolve_matched;
use crate::route::{NavigationId, NavigationType, Route, RouteRecord};
use crate::{debug_log, error_log, info_log, trace_log, warn_log};
use futures::future::{FutureExt, LocalBoxFuture};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Maximum number of chained guard redirects before a navigation is aborted.
pub const MAX_REDIRECT_DEPTH: usize = 5;

/// Result of a navigation attempt.
pub type NavigationResult = Result<Route, NavigationFailure>;

/// Called with the id of a navigation once it starts running.
pub(crate) type StartHook = Box<dyn FnOnce(NavigationId)>;

#[derive(Debug, Clone)]
pub(crate) enum NavigateOp {
    Push(String),
    Replace(String),
    Go(isize),
}

// ============================================================================
// Router
// ============================================================================

/// Cheaply cloneable router handle.
#[derive(Clone, Default)]
pub struct Router {
    inner: Rc<RouterInner>,
}

#[derive(Default)]
struct RouterInner {
    routes: RefCell<Vec<Rc<RouteRecord>>>,
    history: RefCell<History>,
    current: RefCell<Option<Route>>,
    before_each: RefCell<Vec<(GuardId, Guard)>>,
    before_resolve: RefCell<Vec<(GuardId, Guard)>>,
    after_each: RefCell<Vec<(GuardId, AfterHook)>>,
    navigation_id: Cell<u64>,
    next_guard_id: Cell<usize>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.inner.routes.borrow().len())
            .field("history", &*self.inner.history.borrow())
            .finish_non_exhaustive()
    }
}

impl Router {
    /// Create a router with no routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a router from a set of route records.
    pub fn with_routes(routes: Vec<RouteRecord>) -> Result<Self, RouterError> {
        let router = Self::new();
        for route in routes {
            router.add_route(route)?;
        }
        Ok(router)
    }

    /// Register a top-level route.
    ///
    /// Page identities of the record and all its descendants are validated.
    pub fn add_route(&self, route: RouteRecord) -> Result<(), RouterError> {
        route
            .validate()
            .map_err(|(path, message)| RouterError::InvalidRoute { path, message })?;
        debug_log!("Registered route '{}'", route.path());
        self.inner.routes.borrow_mut().push(Rc::new(route));
        Ok(())
    }

    /// All registered top-level routes.
    pub fn routes(&self) -> Vec<Rc<RouteRecord>> {
        self.inner.routes.borrow().clone()
    }

    /// Check if the initial navigation has been committed
    pub fn is_started(&self) -> bool {
        self.inner.history.borrow().is_started()
    }

    /// Current route, or [`Route::start`] before the initial navigation.
    pub fn current_route(&self) -> Route {
        self.inner
            .current
            .borrow()
            .clone()
            .unwrap_or_else(Route::start)
    }

    /// Current route, or [`RouterError::NotStarted`] before the initial navigation.
    pub fn try_current_route(&self) -> Result<Route, RouterError> {
        self.inner
            .current
            .borrow()
            .clone()
            .ok_or(RouterError::NotStarted)
    }

    /// Current history position, if started.
    pub fn position(&self) -> Option<usize> {
        self.inner.history.borrow().position()
    }

    /// Resolve a location against the route table without navigating.
    pub fn resolve(&self, location: &str) -> Route {
        self.resolve_with(location, None, NavigationType::Push, None)
    }

    fn resolve_with(
        &self,
        location: &str,
        position: Option<usize>,
        navigation_type: NavigationType,
        navigation: Option<NavigationId>,
    ) -> Route {
        let (path, query) = split_location(location);
        let chain = resolve_matched(&self.inner.routes.borrow(), &path);
        if chain.is_empty() {
            trace_log!("No route matched '{}'", path);
        }
        Route {
            full_path: full_path(&path, &query),
            name: chain.name(),
            path,
            query,
            params: chain.params,
            matched: chain.records,
            position,
            navigation_type,
            navigation,
        }
    }

    // ------------------------------------------------------------------------
    // Hook registration
    // ------------------------------------------------------------------------

    /// Register a guard that runs before every navigation.
    pub fn before_each(&self, guard: Guard) -> GuardId {
        let id = self.next_guard_id();
        self.inner.before_each.borrow_mut().push((id, guard));
        id
    }

    /// Register a guard that runs after all `before_each` guards passed.
    pub fn before_resolve(&self, guard: Guard) -> GuardId {
        let id = self.next_guard_id();
        self.inner.before_resolve.borrow_mut().push((id, guard));
        id
    }

    /// Register a hook that runs after every navigation attempt.
    pub fn after_each(&self, hook: AfterHook) -> GuardId {
        let id = self.next_guard_id();
        self.inner.after_each.borrow_mut().push((id, hook));
        id
    }

    /// Remove a guard or hook; returns `false` if it was not registered.
    pub fn remove_guard(&self, id: GuardId) -> bool {
        let inner = &self.inner;
        let mut removed = false;
        inner.before_each.borrow_mut().retain(|(gid, _)| {
            let keep = *gid != id;
            removed |= !keep;
            keep
        });
        inner.before_resolve.borrow_mut().retain(|(gid, _)| {
            let keep = *gid != id;
            removed |= !keep;
            keep
        });
        inner.after_each.borrow_mut().retain(|(gid, _)| {
            let keep = *gid != id;
            removed |= !keep;
            keep
        });
        removed
    }

    fn next_guard_id(&self) -> GuardId {
        let id = self.inner.next_guard_id.get();
        self.inner.next_guard_id.set(id + 1);
        GuardId(id)
    }

    // ------------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------------

    /// Run the initial navigation.
    ///
    /// Calling it again after the router started behaves like [`push`](Self::push).
    pub fn start(&self, location: impl Into<String>) -> LocalBoxFuture<'static, NavigationResult> {
        self.navigate(NavigateOp::Push(location.into()), 0, None, None)
    }

    /// Push a new history entry.
    pub fn push(&self, location: impl Into<String>) -> LocalBoxFuture<'static, NavigationResult> {
        self.navigate(NavigateOp::Push(location.into()), 0, None, None)
    }

    /// Replace the current history entry.
    pub fn replace(
        &self,
        location: impl Into<String>,
    ) -> LocalBoxFuture<'static, NavigationResult> {
        self.navigate(NavigateOp::Replace(location.into()), 0, None, None)
    }

    /// Move `delta` entries through history.
    pub fn go(&self, delta: isize) -> LocalBoxFuture<'static, NavigationResult> {
        self.navigate(NavigateOp::Go(delta), 0, None, None)
    }

    /// Go back one entry.
    pub fn back(&self) -> LocalBoxFuture<'static, NavigationResult> {
        self.go(-1)
    }

    /// Go forward one entry.
    pub fn forward(&self) -> LocalBoxFuture<'static, NavigationResult> {
        self.go(1)
    }

    /// Navigate, reporting the navigation's id to `on_start` when the
    /// returned future is first polled.
    pub(crate) fn navigate_tracked(
        &self,
        op: NavigateOp,
        on_start: StartHook,
    ) -> LocalBoxFuture<'static, NavigationResult> {
        self.navigate(op, 0, None, Some(on_start))
    }

    fn navigate(
        &self,
        op: NavigateOp,
        redirect_depth: usize,
        origin: Option<NavigationId>,
        on_start: Option<StartHook>,
    ) -> LocalBoxFuture<'static, NavigationResult> {
        let router = self.clone();
        async move {
            router
                .run_pipeline(op, redirect_depth, origin, on_start)
                .await
        }
        .boxed_local()
    }

    async fn run_pipeline(
        &self,
        op: NavigateOp,
        redirect_depth: usize,
        origin: Option<NavigationId>,
        on_start: Option<StartHook>,
    ) -> NavigationResult {
        let navigation_id = self.inner.navigation_id.get() + 1;
        self.inner.navigation_id.set(navigation_id);
        let origin = origin.unwrap_or(NavigationId(navigation_id));
        if let Some(on_start) = on_start {
            on_start(origin);
        }

        let from = self.current_route();

        let planned = {
            let history = self.inner.history.borrow();
            match &op {
                NavigateOp::Push(location) => Some((history.plan_push(), location.clone())),
                NavigateOp::Replace(location) => {
                    Some((history.plan_replace(), location.clone()))
                }
                NavigateOp::Go(delta) => history
                    .plan_go(*delta)
                    .map(|(planned, location)| (planned, location.to_string())),
            }
        };

        let Some((planned, location)) = planned else {
            let reason = match op {
                NavigateOp::Go(delta) => format!("no history entry at offset {}", delta),
                _ => "history unavailable".to_string(),
            };
            warn_log!("Navigation from '{}' aborted: {}", from.full_path, reason);
            return Err(NavigationFailure::Aborted { reason });
        };

        let to = self.resolve_with(
            &location,
            Some(planned.position),
            planned.navigation_type,
            Some(origin),
        );
        info_log!(
            "Navigation {:?}: '{}' → '{}'",
            planned.navigation_type,
            from.full_path,
            to.full_path
        );

        if redirect_depth >= MAX_REDIRECT_DEPTH {
            error_log!(
                "Redirect loop detected (depth {}) navigating to '{}'",
                redirect_depth,
                to.full_path
            );
            let failure = NavigationFailure::Aborted {
                reason: format!(
                    "Redirect loop detected (depth {}): target '{}'",
                    redirect_depth, to.full_path
                ),
            };
            return self.fail(to, from, failure).await;
        }

        if self.is_duplicate(&planned, &to, &from) {
            debug_log!("Skipping redundant navigation to '{}'", to.full_path);
            let failure = NavigationFailure::Duplicated {
                to: to.full_path.clone(),
            };
            return self.fail(to, from, failure).await;
        }

        let guards: Vec<Guard> = {
            let before_each = self.inner.before_each.borrow();
            let before_resolve = self.inner.before_resolve.borrow();
            before_each
                .iter()
                .chain(before_resolve.iter())
                .map(|(_, guard)| Rc::clone(guard))
                .collect()
        };
        debug_log!("Running {} guards for '{}'", guards.len(), to.full_path);

        for guard in guards {
            let action = guard(to.clone(), from.clone()).await;

            if self.inner.navigation_id.get() != navigation_id {
                debug_log!("Navigation to '{}' superseded", to.full_path);
                let failure = NavigationFailure::Cancelled {
                    to: to.full_path.clone(),
                };
                return self.fail(to, from, failure).await;
            }

            match action {
                NavigationAction::Continue => {}
                NavigationAction::Deny { reason } => {
                    warn_log!("Navigation to '{}' blocked: {}", to.full_path, reason);
                    return self.fail(to, from, NavigationFailure::Aborted { reason }).await;
                }
                NavigationAction::Redirect { to: target, reason } => {
                    debug_log!(
                        "Guard redirecting from '{}' to '{}': {:?}",
                        to.full_path,
                        target,
                        reason
                    );
                    let op = match planned.navigation_type {
                        NavigationType::Replace => NavigateOp::Replace(target),
                        _ => NavigateOp::Push(target),
                    };
                    return self.navigate(op, redirect_depth + 1, Some(origin), None).await;
                }
            }
        }

        self.inner
            .history
            .borrow_mut()
            .commit(planned, to.full_path.clone());
        *self.inner.current.borrow_mut() = Some(to.clone());

        info_log!(
            "Navigation complete: '{}' (position {})",
            to.full_path,
            planned.position
        );
        self.run_after_hooks(&to, &from, None).await;
        Ok(to)
    }

    fn is_duplicate(&self, planned: &HistoryMove, to: &Route, from: &Route) -> bool {
        matches!(
            planned.navigation_type,
            NavigationType::Push | NavigationType::Replace
        ) && self.is_started()
            && to.full_path == from.full_path
    }

    async fn fail(&self, to: Route, from: Route, failure: NavigationFailure) -> NavigationResult {
        self.run_after_hooks(&to, &from, Some(failure.clone())).await;
        Err(failure)
    }

    async fn run_after_hooks(&self, to: &Route, from: &Route, failure: Option<NavigationFailure>) {
        let hooks: Vec<AfterHook> = self
            .inner
            .after_each
            .borrow()
            .iter()
            .map(|(_, hook)| Rc::clone(hook))
            .collect();
        for hook in hooks {
            hook(to.clone(), from.clone(), failure.clone()).await;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
