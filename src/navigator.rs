//! Direction-aware navigation pipeline.
//!
//! [`Navigator`] wraps a [`Router`] instead of mutating it: it registers one
//! guard and one after-hook on the router and exposes its own navigation
//! surface on top.
//!
//! # Per-navigation flow
//!
//! ```text
//! before_each ─┬─ classify direction (cursor before vs. target position)
//!              ├─ emit router:direction, then router:forward / router:backward
//!              │    (a handler's Deny/Redirect vetoes the navigation)
//!              └─ run before_once guards
//! after_each  ─┬─ take the payload this navigation claimed, re-arm before_once
//!              ├─ failure → stop (no end hooks, no details)
//!              ├─ advance the cursor
//!              ├─ backward → drop the details of the route being left
//!              ├─ payload → deliver details, emit router:details
//!              └─ emit router:direction:end, then router:forward:end /
//!                 router:backward:end
//! ```
//!
//! # Payload navigation
//!
//! `push_with_data` and friends stash the payload in a single slot and then
//! navigate. A second call before the first navigation settles overwrites
//! the slot, and the first navigation then carries nothing.
//!
//! When the navigation starts running it claims the slot with its
//! [`NavigationId`]. Only the navigation holding the claim may deliver or
//! discard the payload, so a payload never leaks into an unrelated
//! navigation and a settling navigation never drops a newer one's payload.

use crate::details::{DetailsStore, DetailsView, RouteDetails};
use crate::direction::{apply_override, classify, Direction, DirectionContext, IdentifyDirection};
use crate::error::NavigationFailure;
use crate::guards::{after_fn, guard_fn, Guard, GuardId, NavigationAction};
use crate::hooks::{Hook, HookBus, HookEvent, NavigationEvent};
use crate::route::{NavigationId, Route};
use crate::router::{NavigateOp, NavigationResult, Router};
use crate::scheduler::{maybe_with_timeout, ManualScheduler, Scheduler};
use crate::{debug_log, plugin_warn, trace_log};
use futures::future::{FutureExt, LocalBoxFuture};
use serde::Serialize;
use serde_json::Value;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

const PLUGIN: &str = "navigator";

// ============================================================================
// Options
// ============================================================================

/// Navigator configuration.
#[derive(Clone)]
pub struct NavigatorOptions {
    identify_direction: Option<IdentifyDirection>,
    remove_details_on_backward: bool,
    predicate_timeout: Option<Duration>,
}

impl Default for NavigatorOptions {
    fn default() -> Self {
        Self {
            identify_direction: None,
            remove_details_on_backward: true,
            predicate_timeout: None,
        }
    }
}

impl fmt::Debug for NavigatorOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavigatorOptions")
            .field("identify_direction", &self.identify_direction.is_some())
            .field("remove_details_on_backward", &self.remove_details_on_backward)
            .field("predicate_timeout", &self.predicate_timeout)
            .finish()
    }
}

impl NavigatorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the computed direction.
    ///
    /// The override may substitute `Forward` or `Backward`; returning
    /// `Unchanged` for a navigation that was not classified `Unchanged` is
    /// ignored with a warning.
    #[must_use]
    pub fn identify_direction(mut self, identify: IdentifyDirection) -> Self {
        self.identify_direction = Some(identify);
        self
    }

    /// Keep details of routes left by backward navigation.
    #[must_use]
    pub fn keep_details_on_backward(mut self) -> Self {
        self.remove_details_on_backward = false;
        self
    }

    /// Bound the direction override; on timeout the default direction is used.
    #[must_use]
    pub fn predicate_timeout(mut self, timeout: Duration) -> Self {
        self.predicate_timeout = Some(timeout);
        self
    }

    pub(crate) fn timeout(&self) -> Option<Duration> {
        self.predicate_timeout
    }
}

// ============================================================================
// Navigator
// ============================================================================

/// Handle returned by [`Navigator::before_once`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OnceGuardId(usize);

struct OnceGuard {
    id: OnceGuardId,
    locked: Cell<bool>,
    guard: Guard,
}

/// A payload waiting for its navigation.
struct PendingPayload {
    ticket: u64,
    navigation: Option<NavigationId>,
    data: Value,
}

struct NavigatorInner {
    router: Router,
    hooks: HookBus,
    details: DetailsStore,
    scheduler: Rc<dyn Scheduler>,
    options: NavigatorOptions,
    cursor: Cell<Option<usize>>,
    direction: Cell<Direction>,
    pending: RefCell<Option<PendingPayload>>,
    next_ticket: Cell<u64>,
    once_guards: RefCell<Vec<Rc<OnceGuard>>>,
    next_once_id: Cell<usize>,
    route_locked: Cell<bool>,
    router_hooks: RefCell<Vec<GuardId>>,
}

/// Direction-aware wrapper around a [`Router`].
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Navigator {
    inner: Rc<NavigatorInner>,
}

impl fmt::Debug for Navigator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Navigator")
            .field("cursor", &self.inner.cursor.get())
            .field("direction", &self.inner.direction.get())
            .field("pending", &self.inner.pending.borrow().is_some())
            .field("route_locked", &self.inner.route_locked.get())
            .finish_non_exhaustive()
    }
}

impl Navigator {
    /// Attach a navigator to `router`.
    pub fn new(
        router: Router,
        hooks: HookBus,
        details: DetailsStore,
        scheduler: Rc<dyn Scheduler>,
        options: NavigatorOptions,
    ) -> Self {
        let navigator = Self {
            inner: Rc::new(NavigatorInner {
                cursor: Cell::new(router.position()),
                router,
                hooks,
                details,
                scheduler,
                options,
                direction: Cell::new(Direction::Forward),
                pending: RefCell::new(None),
                next_ticket: Cell::new(0),
                once_guards: RefCell::new(Vec::new()),
                next_once_id: Cell::new(0),
                route_locked: Cell::new(false),
                router_hooks: RefCell::new(Vec::new()),
            }),
        };
        navigator.attach();
        navigator
    }

    /// Navigator with a private hook bus, in-memory details and a manual scheduler.
    pub fn standalone(router: Router) -> Self {
        Self::new(
            router,
            HookBus::new(),
            DetailsStore::in_memory(),
            Rc::new(ManualScheduler::new()),
            NavigatorOptions::default(),
        )
    }

    fn attach(&self) {
        let weak = Rc::downgrade(&self.inner);
        let before = guard_fn(move |to, from| {
            let weak = Weak::clone(&weak);
            async move {
                match weak.upgrade() {
                    Some(inner) => Navigator { inner }.on_before(to, from).await,
                    None => NavigationAction::Continue,
                }
            }
        });

        let weak = Rc::downgrade(&self.inner);
        let after = after_fn(move |to, from, failure| {
            let weak = Weak::clone(&weak);
            async move {
                if let Some(inner) = weak.upgrade() {
                    Navigator { inner }.on_after(to, from, failure).await;
                }
            }
        });

        let router = &self.inner.router;
        let ids = vec![router.before_each(before), router.after_each(after)];
        *self.inner.router_hooks.borrow_mut() = ids;
    }

    /// Unregister from the router.
    pub fn detach(&self) {
        for id in self.inner.router_hooks.borrow_mut().drain(..) {
            self.inner.router.remove_guard(id);
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn router(&self) -> &Router {
        &self.inner.router
    }

    pub fn hooks(&self) -> &HookBus {
        &self.inner.hooks
    }

    pub fn scheduler(&self) -> Rc<dyn Scheduler> {
        Rc::clone(&self.inner.scheduler)
    }

    pub fn details_store(&self) -> &DetailsStore {
        &self.inner.details
    }

    /// Direction of the most recent navigation attempt.
    pub fn direction(&self) -> Direction {
        self.inner.direction.get()
    }

    /// History position of the last committed navigation.
    pub fn cursor(&self) -> Option<usize> {
        self.inner.cursor.get()
    }

    /// Current route.
    pub fn current_route(&self) -> Route {
        self.inner.router.current_route()
    }

    /// Whether a payload is waiting for the next navigation.
    pub fn has_pending_payload(&self) -> bool {
        self.inner.pending.borrow().is_some()
    }

    // ------------------------------------------------------------------------
    // Route lock
    // ------------------------------------------------------------------------

    /// Whether navigation observers should ignore the running navigation.
    pub fn is_route_locked(&self) -> bool {
        self.inner.route_locked.get()
    }

    pub fn lock_route(&self) {
        self.inner.route_locked.set(true);
    }

    pub fn unlock_route(&self) {
        self.inner.route_locked.set(false);
    }

    // ------------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------------

    pub fn push(&self, location: impl Into<String>) -> LocalBoxFuture<'static, NavigationResult> {
        self.inner.router.push(location)
    }

    pub fn replace(
        &self,
        location: impl Into<String>,
    ) -> LocalBoxFuture<'static, NavigationResult> {
        self.inner.router.replace(location)
    }

    pub fn go(&self, delta: isize) -> LocalBoxFuture<'static, NavigationResult> {
        self.inner.router.go(delta)
    }

    pub fn back(&self) -> LocalBoxFuture<'static, NavigationResult> {
        self.inner.router.back()
    }

    pub fn forward(&self) -> LocalBoxFuture<'static, NavigationResult> {
        self.inner.router.forward()
    }

    /// Push `location`, delivering `data` to it once committed.
    pub fn push_with_data(
        &self,
        location: impl Into<String>,
        data: impl Serialize,
    ) -> LocalBoxFuture<'static, NavigationResult> {
        self.navigate_with_data(NavigateOp::Push(location.into()), data)
    }

    /// Replace with `location`, delivering `data` to it once committed.
    pub fn replace_with_data(
        &self,
        location: impl Into<String>,
        data: impl Serialize,
    ) -> LocalBoxFuture<'static, NavigationResult> {
        self.navigate_with_data(NavigateOp::Replace(location.into()), data)
    }

    /// Move `delta` entries, delivering `data` to the target once committed.
    pub fn go_with_data(
        &self,
        delta: isize,
        data: impl Serialize,
    ) -> LocalBoxFuture<'static, NavigationResult> {
        self.navigate_with_data(NavigateOp::Go(delta), data)
    }

    pub fn back_with_data(&self, data: impl Serialize) -> LocalBoxFuture<'static, NavigationResult> {
        self.go_with_data(-1, data)
    }

    pub fn forward_with_data(
        &self,
        data: impl Serialize,
    ) -> LocalBoxFuture<'static, NavigationResult> {
        self.go_with_data(1, data)
    }

    fn navigate_with_data(
        &self,
        op: NavigateOp,
        data: impl Serialize,
    ) -> LocalBoxFuture<'static, NavigationResult> {
        let ticket = self.stash(data);

        let weak = Rc::downgrade(&self.inner);
        let navigation = self.inner.router.navigate_tracked(
            op,
            Box::new(move |id| {
                if let Some(inner) = weak.upgrade() {
                    Navigator { inner }.claim(ticket, id);
                }
            }),
        );

        let this = self.clone();
        async move {
            let result = navigation.await;
            if result.is_err() {
                this.discard(ticket);
            }
            result
        }
        .boxed_local()
    }

    /// Put `data` in the slot under a fresh ticket, replacing any payload
    /// still waiting there.
    fn stash(&self, data: impl Serialize) -> u64 {
        let ticket = self.inner.next_ticket.get() + 1;
        self.inner.next_ticket.set(ticket);

        let payload = match serde_json::to_value(data) {
            Ok(data) => Some(PendingPayload {
                ticket,
                navigation: None,
                data,
            }),
            Err(e) => {
                plugin_warn!(PLUGIN, "payload is not serializable, navigating without it: {}", e);
                None
            }
        };
        let replaced = self.inner.pending.replace(payload);
        if replaced.is_some() {
            debug_log!("Overwriting pending navigation payload");
        }
        ticket
    }

    /// Bind the slot to navigation `id` if it still holds `ticket`'s payload.
    fn claim(&self, ticket: u64, id: NavigationId) {
        if let Some(pending) = self.inner.pending.borrow_mut().as_mut() {
            if pending.ticket == ticket {
                trace_log!("Payload {} claimed by navigation {:?}", ticket, id);
                pending.navigation = Some(id);
            }
        }
    }

    /// Drop `ticket`'s payload if it is still waiting.
    fn discard(&self, ticket: u64) {
        let mut pending = self.inner.pending.borrow_mut();
        if pending.as_ref().is_some_and(|p| p.ticket == ticket) {
            pending.take();
        }
    }

    /// Take the payload claimed by `navigation`, if any.
    fn take_payload(&self, navigation: Option<NavigationId>) -> Option<Value> {
        let navigation = navigation?;
        let mut pending = self.inner.pending.borrow_mut();
        if pending.as_ref()?.navigation != Some(navigation) {
            return None;
        }
        pending.take().map(|p| p.data)
    }

    // ------------------------------------------------------------------------
    // Single-shot guards
    // ------------------------------------------------------------------------

    /// Register a guard that fires at most once per navigation.
    ///
    /// The guard is locked when it fires and re-armed when the navigation
    /// settles, so a guard that redirects does not run again for the
    /// redirected navigation.
    pub fn before_once(&self, guard: Guard) -> OnceGuardId {
        let id = OnceGuardId(self.inner.next_once_id.get());
        self.inner.next_once_id.set(id.0 + 1);
        self.inner.once_guards.borrow_mut().push(Rc::new(OnceGuard {
            id,
            locked: Cell::new(false),
            guard,
        }));
        id
    }

    /// Remove a single-shot guard.
    pub fn remove_once(&self, id: OnceGuardId) -> bool {
        let mut guards = self.inner.once_guards.borrow_mut();
        let before = guards.len();
        guards.retain(|g| g.id != id);
        guards.len() != before
    }

    // ------------------------------------------------------------------------
    // Details
    // ------------------------------------------------------------------------

    /// Details delivered to a full path.
    pub fn details(&self, full_path: &str) -> Option<RouteDetails> {
        self.inner.details.get(full_path)
    }

    /// Reactive view of the current route's details, creating the entry if needed.
    pub async fn use_details(&self) -> DetailsView {
        let key = self.current_route().full_path;
        self.inner.details.ensure(&key).await;
        self.inner.details.view(key)
    }

    /// Drop every delivered payload.
    pub async fn clear_details(&self) {
        self.inner.details.clear().await;
    }

    // ------------------------------------------------------------------------
    // Router callbacks
    // ------------------------------------------------------------------------

    async fn on_before(&self, to: Route, from: Route) -> NavigationAction {
        let direction = self.identify(&to, &from).await;
        self.inner.direction.set(direction);
        trace_log!(
            "Classified '{}' → '{}' as {}",
            from.full_path,
            to.full_path,
            direction
        );

        let event = HookEvent::Navigation(NavigationEvent {
            direction,
            to: to.clone(),
            from: from.clone(),
            failure: None,
        });

        let action = self.inner.hooks.emit(Hook::Direction, event.clone()).await;
        if !action.is_continue() {
            return action;
        }
        if let Some(hook) = Hook::for_direction(direction, false) {
            let action = self.inner.hooks.emit(hook, event).await;
            if !action.is_continue() {
                return action;
            }
        }

        let once_guards: Vec<Rc<OnceGuard>> = self.inner.once_guards.borrow().clone();
        for once in once_guards {
            if once.locked.replace(true) {
                continue;
            }
            let action = (once.guard)(to.clone(), from.clone()).await;
            if !action.is_continue() {
                return action;
            }
        }

        NavigationAction::Continue
    }

    async fn identify(&self, to: &Route, from: &Route) -> Direction {
        let default = classify(self.inner.cursor.get(), to.position);
        let Some(identify) = self.inner.options.identify_direction.clone() else {
            return default;
        };

        let ctx = DirectionContext {
            to: to.clone(),
            from: from.clone(),
            direction: default,
        };
        let overridden = maybe_with_timeout(
            &*self.inner.scheduler,
            self.inner.options.timeout(),
            identify(ctx),
            default,
        )
        .await;
        apply_override(default, overridden)
    }

    async fn on_after(&self, to: Route, from: Route, failure: Option<NavigationFailure>) {
        let payload = self.take_payload(to.navigation);
        for once in self.inner.once_guards.borrow().iter() {
            once.locked.set(false);
        }

        if let Some(failure) = failure {
            debug_log!("Navigation to '{}' failed: {}", to.full_path, failure);
            return;
        }

        self.inner.cursor.set(to.position);
        let direction = self.inner.direction.get();

        if direction.is_backward()
            && self.inner.options.remove_details_on_backward
            && from.full_path != to.full_path
        {
            self.inner.details.remove(&from.full_path).await;
        }

        if let Some(data) = payload {
            let details = self.inner.details.commit(&to, &from, data).await;
            debug_log!(
                "Delivered details to '{}' (change {})",
                to.full_path,
                details.change_count
            );
            self.inner
                .hooks
                .notify(
                    Hook::Details,
                    HookEvent::Details {
                        to: to.clone(),
                        details,
                    },
                )
                .await;
        }

        let event = HookEvent::Navigation(NavigationEvent {
            direction,
            to,
            from,
            failure: None,
        });
        self.inner.hooks.notify(Hook::DirectionEnd, event.clone()).await;
        if let Some(hook) = Hook::for_direction(direction, true) {
            self.inner.hooks.notify(hook, event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::direction::identify_fn;
    use crate::route::RouteRecord;
    use serde_json::json;

    fn navigator() -> Navigator {
        let router = Router::with_routes(vec![
            RouteRecord::new("/"),
            RouteRecord::new("/list"),
            RouteRecord::new("/detail"),
        ])
        .unwrap();
        Navigator::standalone(router)
    }

    #[test]
    fn test_directions_follow_history() {
        let nav = navigator();
        pollster::block_on(async {
            nav.push("/").await.unwrap();
            assert_eq!(nav.direction(), Direction::Forward);
            nav.push("/list").await.unwrap();
            assert_eq!(nav.direction(), Direction::Forward);
            nav.replace("/detail").await.unwrap();
            assert_eq!(nav.direction(), Direction::Unchanged);
            nav.back().await.unwrap();
            assert_eq!(nav.direction(), Direction::Backward);
            nav.forward().await.unwrap();
            assert_eq!(nav.direction(), Direction::Forward);
        });
        assert_eq!(nav.cursor(), Some(1));
    }

    #[test]
    fn test_failed_navigation_keeps_cursor_and_clears_payload() {
        let nav = navigator();
        pollster::block_on(async {
            nav.push("/list").await.unwrap();
            let err = nav.push_with_data("/list", json!(1)).await.unwrap_err();
            assert!(err.is_duplicated());
            assert!(!nav.has_pending_payload());

            let err = nav.back_with_data(json!(2)).await.unwrap_err();
            assert!(err.is_aborted());
            assert!(!nav.has_pending_payload());
        });
        assert_eq!(nav.cursor(), Some(0));
        assert!(nav.details("/list").is_none());
    }

    #[test]
    fn test_plain_navigation_leaves_unclaimed_payload() {
        let nav = navigator();
        pollster::block_on(async {
            nav.push("/").await.unwrap();
            let with_data = nav.push_with_data("/detail", json!("x"));

            nav.push("/list").await.unwrap();
            assert!(nav.details("/list").is_none());
            assert!(nav.has_pending_payload());

            with_data.await.unwrap();
        });
        assert_eq!(nav.details("/detail").unwrap().data, Some(json!("x")));
        assert!(!nav.has_pending_payload());
    }

    #[test]
    fn test_unchanged_override_is_ignored() {
        let router = Router::with_routes(vec![RouteRecord::new("/"), RouteRecord::new("/a")])
            .unwrap();
        let options = NavigatorOptions::new()
            .identify_direction(identify_fn(|_ctx| async { Direction::Unchanged }));
        let nav = Navigator::new(
            router,
            HookBus::new(),
            DetailsStore::in_memory(),
            Rc::new(ManualScheduler::new()),
            options,
        );

        pollster::block_on(async {
            nav.push("/").await.unwrap();
            nav.push("/a").await.unwrap();
        });
        assert_eq!(nav.direction(), Direction::Forward);
    }

    #[test]
    fn test_backward_override() {
        let router = Router::with_routes(vec![RouteRecord::new("/"), RouteRecord::new("/a")])
            .unwrap();
        let options = NavigatorOptions::new().identify_direction(identify_fn(|ctx| async move {
            if ctx.to.path == "/a" {
                Direction::Backward
            } else {
                ctx.direction
            }
        }));
        let nav = Navigator::new(
            router,
            HookBus::new(),
            DetailsStore::in_memory(),
            Rc::new(ManualScheduler::new()),
            options,
        );

        pollster::block_on(async {
            nav.push("/").await.unwrap();
            nav.push("/a").await.unwrap();
        });
        assert_eq!(nav.direction(), Direction::Backward);
    }

    #[test]
    fn test_detach_stops_classification() {
        let nav = navigator();
        pollster::block_on(nav.push("/")).unwrap();
        nav.detach();
        pollster::block_on(nav.push("/list")).unwrap();
        assert_eq!(nav.cursor(), Some(0));
    }
}
