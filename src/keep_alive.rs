//! Keep-alive component cache.
//!
//! [`KeepAlive`] maintains the set of component names whose instances the
//! host should retain instead of destroying them on navigation. The host
//! renders from [`KeepAlive::names`] and observes changes with
//! [`KeepAlive::subscribe`].
//!
//! # Modes
//!
//! - **Auto** (default): committed forward or replacing navigations add the
//!   target's matched chain; backward navigations remove the records only
//!   the origin matched. Both directions consult a user predicate per record.
//! - **Takeover**: auto mode is off and an external owner (usually the tab
//!   registry) replaces the whole set with [`KeepAlive::set`].
//!
//! # Stale eviction
//!
//! With [`KeepAliveOptions::stale_after`] set, a self-rearming timer drops
//! names that were not (re)added within that duration. The timer is
//! cancelled on cleanup.

use crate::cache::ComponentNameCache;
use crate::direction::Direction;
use crate::error::PluginError;
use crate::guards::NavigationAction;
use crate::hooks::{hook_fn, Hook, HookEvent, HookId};
use crate::plugin::{on_cleanup, Plugin, PluginContext};
use crate::route::{Route, RouteRecord};
use crate::scheduler::{Scheduler, TimerId};
use crate::{debug_log, trace_log};
use futures::future::{FutureExt, LocalBoxFuture};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

pub(crate) const PLUGIN: &str = "keep-alive";

/// Async per-record predicate.
pub type RecordPredicate = Rc<dyn Fn(Rc<RouteRecord>) -> LocalBoxFuture<'static, bool>>;

/// Create a [`RecordPredicate`] from an async closure.
pub fn record_predicate<F, Fut>(f: F) -> RecordPredicate
where
    F: Fn(Rc<RouteRecord>) -> Fut + 'static,
    Fut: Future<Output = bool> + 'static,
{
    Rc::new(move |record| f(record).boxed_local())
}

// ============================================================================
// Options
// ============================================================================

/// Keep-alive configuration.
#[derive(Clone)]
pub struct KeepAliveOptions {
    auto: bool,
    before_route_add: Option<RecordPredicate>,
    before_route_remove: Option<RecordPredicate>,
    stale_after: Option<Duration>,
    memo_capacity: usize,
}

impl Default for KeepAliveOptions {
    fn default() -> Self {
        Self {
            auto: true,
            before_route_add: None,
            before_route_remove: None,
            stale_after: None,
            memo_capacity: ComponentNameCache::DEFAULT_CAPACITY,
        }
    }
}

impl fmt::Debug for KeepAliveOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeepAliveOptions")
            .field("auto", &self.auto)
            .field("before_route_add", &self.before_route_add.is_some())
            .field("before_route_remove", &self.before_route_remove.is_some())
            .field("stale_after", &self.stale_after)
            .field("memo_capacity", &self.memo_capacity)
            .finish()
    }
}

impl KeepAliveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start in takeover mode.
    #[must_use]
    pub fn manual(mut self) -> Self {
        self.auto = false;
        self
    }

    /// Veto caching of individual records on forward navigation.
    #[must_use]
    pub fn before_route_add(mut self, predicate: RecordPredicate) -> Self {
        self.before_route_add = Some(predicate);
        self
    }

    /// Veto releasing of individual records on backward navigation.
    #[must_use]
    pub fn before_route_remove(mut self, predicate: RecordPredicate) -> Self {
        self.before_route_remove = Some(predicate);
        self
    }

    /// Evict names not (re)added within `duration`. Zero disables eviction.
    #[must_use]
    pub fn stale_after(mut self, duration: Duration) -> Self {
        self.stale_after = (!duration.is_zero()).then_some(duration);
        self
    }

    /// Number of route records whose component names are memoized.
    #[must_use]
    pub fn memo_capacity(mut self, capacity: usize) -> Self {
        self.memo_capacity = capacity;
        self
    }
}

// ============================================================================
// KeepAlive
// ============================================================================

type Listener = Rc<dyn Fn(&[String])>;

struct KeepAliveInner {
    options: KeepAliveOptions,
    auto: Cell<bool>,
    names: RefCell<Vec<String>>,
    touched: RefCell<HashMap<String, Duration>>,
    memo: ComponentNameCache,
    listeners: RefCell<Vec<(usize, Listener)>>,
    next_listener: Cell<usize>,
    ctx: RefCell<Option<PluginContext>>,
    hook_ids: RefCell<Vec<HookId>>,
    timer: Cell<Option<TimerId>>,
}

/// Keep-alive cache plugin.
#[derive(Clone)]
pub struct KeepAlive {
    inner: Rc<KeepAliveInner>,
}

impl fmt::Debug for KeepAlive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeepAlive")
            .field("auto", &self.inner.auto.get())
            .field("names", &*self.inner.names.borrow())
            .finish_non_exhaustive()
    }
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self::new(KeepAliveOptions::default())
    }
}

impl KeepAlive {
    pub fn new(options: KeepAliveOptions) -> Self {
        Self {
            inner: Rc::new(KeepAliveInner {
                auto: Cell::new(options.auto),
                memo: ComponentNameCache::with_capacity(options.memo_capacity),
                options,
                names: RefCell::new(Vec::new()),
                touched: RefCell::new(HashMap::new()),
                listeners: RefCell::new(Vec::new()),
                next_listener: Cell::new(0),
                ctx: RefCell::new(None),
                hook_ids: RefCell::new(Vec::new()),
                timer: Cell::new(None),
            }),
        }
    }

    // ------------------------------------------------------------------------
    // Mode
    // ------------------------------------------------------------------------

    /// Whether navigation events drive the cache.
    pub fn is_auto(&self) -> bool {
        self.inner.auto.get()
    }

    /// Switch between auto and takeover mode.
    pub fn set_auto(&self, auto: bool) {
        if self.inner.auto.replace(auto) != auto {
            debug_log!("Keep-alive {} mode", if auto { "auto" } else { "takeover" });
        }
    }

    // ------------------------------------------------------------------------
    // Cache contents
    // ------------------------------------------------------------------------

    /// Cached component names, in insertion order.
    pub fn names(&self) -> Vec<String> {
        self.inner.names.borrow().clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.names.borrow().iter().any(|n| n == name)
    }

    /// Add a name, refreshing its timestamp if already present.
    pub fn add(&self, name: impl Into<String>) {
        let name = name.into();
        self.touch(&name);
        if self.contains(&name) {
            return;
        }
        trace_log!("Keep-alive add '{}'", name);
        self.inner.names.borrow_mut().push(name);
        self.notify();
    }

    /// Remove a name; returns whether it was cached.
    pub fn remove(&self, name: &str) -> bool {
        let removed = {
            let mut names = self.inner.names.borrow_mut();
            let before = names.len();
            names.retain(|n| n != name);
            names.len() != before
        };
        if removed {
            trace_log!("Keep-alive remove '{}'", name);
            self.inner.touched.borrow_mut().remove(name);
            self.notify();
        }
        removed
    }

    /// Replace the whole set.
    ///
    /// Names that were already cached keep their timestamp; new names are
    /// stamped now. Duplicates are dropped.
    pub fn set(&self, names: impl IntoIterator<Item = String>) {
        let mut next: Vec<String> = Vec::new();
        for name in names {
            if !next.contains(&name) {
                next.push(name);
            }
        }
        if *self.inner.names.borrow() == next {
            return;
        }

        let now = self.now();
        {
            let mut touched = self.inner.touched.borrow_mut();
            touched.retain(|name, _| next.contains(name));
            for name in &next {
                touched.entry(name.clone()).or_insert(now);
            }
        }
        *self.inner.names.borrow_mut() = next;
        self.notify();
    }

    /// Empty the set.
    pub fn clear(&self) {
        self.set(Vec::new());
    }

    /// Observe every change of the set.
    pub fn subscribe(&self, f: impl Fn(&[String]) + 'static) -> usize {
        let id = self.inner.next_listener.get();
        self.inner.next_listener.set(id + 1);
        self.inner.listeners.borrow_mut().push((id, Rc::new(f)));
        id
    }

    pub fn unsubscribe(&self, id: usize) -> bool {
        let mut listeners = self.inner.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    // ------------------------------------------------------------------------
    // Component names
    // ------------------------------------------------------------------------

    /// Memoized component name of a record.
    pub async fn resolve_name(&self, record: &Rc<RouteRecord>) -> Option<String> {
        self.inner.memo.resolve(record).await
    }

    /// Component names of a route's matched chain, root first.
    pub async fn names_for(&self, route: &Route) -> Vec<String> {
        let mut names = Vec::new();
        for record in &route.matched {
            if let Some(name) = self.resolve_name(record).await {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Memoization statistics.
    pub fn memo_stats(&self) -> crate::cache::CacheStats {
        self.inner.memo.stats()
    }

    // ------------------------------------------------------------------------
    // Auto mode
    // ------------------------------------------------------------------------

    async fn on_navigation_end(&self, direction: Direction, to: &Route, from: &Route) {
        if !self.is_auto() {
            return;
        }
        match direction {
            Direction::Forward | Direction::Unchanged => {
                for record in &to.matched {
                    if !self
                        .allowed(self.inner.options.before_route_add.as_ref(), record)
                        .await
                    {
                        continue;
                    }
                    if let Some(name) = self.resolve_name(record).await {
                        self.add(name);
                    }
                }
            }
            Direction::Backward => {
                let leaving = from.matched.iter().filter(|r| !to.has_matched(r.id()));
                for record in leaving {
                    if !self
                        .allowed(self.inner.options.before_route_remove.as_ref(), record)
                        .await
                    {
                        continue;
                    }
                    if let Some(name) = self.resolve_name(record).await {
                        self.remove(&name);
                    }
                }
            }
        }
    }

    async fn allowed(&self, predicate: Option<&RecordPredicate>, record: &Rc<RouteRecord>) -> bool {
        let Some(predicate) = predicate else {
            return true;
        };
        let check = predicate(Rc::clone(record));
        let ctx = self.inner.ctx.borrow().clone();
        match ctx {
            Some(ctx) => ctx.bounded(check, false).await,
            None => check.await,
        }
    }

    // ------------------------------------------------------------------------
    // Stale eviction
    // ------------------------------------------------------------------------

    fn now(&self) -> Duration {
        self.inner
            .ctx
            .borrow()
            .as_ref()
            .map(|ctx| ctx.scheduler().now())
            .unwrap_or_default()
    }

    fn touch(&self, name: &str) {
        let now = self.now();
        self.inner.touched.borrow_mut().insert(name.to_string(), now);
    }

    /// Drop names whose last (re)add is older than the stale duration.
    ///
    /// Returns the evicted names.
    pub fn evict_stale(&self) -> Vec<String> {
        let Some(stale_after) = self.inner.options.stale_after else {
            return Vec::new();
        };
        let now = self.now();
        let (survivors, evicted): (Vec<String>, Vec<String>) = {
            let touched = self.inner.touched.borrow();
            self.inner.names.borrow().iter().cloned().partition(|name| {
                touched
                    .get(name)
                    .map_or(true, |at| now.saturating_sub(*at) < stale_after)
            })
        };
        if !evicted.is_empty() {
            debug_log!("Evicting stale keep-alive entries: {:?}", evicted);
            self.set(survivors);
        }
        evicted
    }

    fn arm_eviction(&self, scheduler: Rc<dyn Scheduler>, every: Duration) {
        let weak = Rc::downgrade(&self.inner);
        let next = Rc::clone(&scheduler);
        let id = scheduler.set_timeout(
            every,
            Box::new(move || {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let keep_alive = KeepAlive { inner };
                keep_alive.evict_stale();
                keep_alive.arm_eviction(next, every);
            }),
        );
        self.inner.timer.set(Some(id));
    }

    fn cancel_eviction(&self) {
        let Some(id) = self.inner.timer.take() else {
            return;
        };
        if let Some(ctx) = self.inner.ctx.borrow().as_ref() {
            ctx.scheduler().clear_timeout(id);
        }
    }

    fn notify(&self) {
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .map(|(_, f)| Rc::clone(f))
            .collect();
        if listeners.is_empty() {
            return;
        }
        let names = self.names();
        for listener in listeners {
            listener(&names);
        }
    }
}

impl Plugin for KeepAlive {
    fn name(&self) -> &'static str {
        PLUGIN
    }

    fn install<'a>(&'a self, ctx: &'a PluginContext) -> LocalBoxFuture<'a, Result<(), PluginError>> {
        async move {
            *self.inner.ctx.borrow_mut() = Some(ctx.clone());

            let weak = Rc::downgrade(&self.inner);
            let end = ctx.hooks().on(
                Hook::DirectionEnd,
                hook_fn(move |event| {
                    let inner = weak.upgrade();
                    async move {
                        if let (Some(inner), HookEvent::Navigation(nav)) = (inner, event) {
                            KeepAlive { inner }
                                .on_navigation_end(nav.direction, &nav.to, &nav.from)
                                .await;
                        }
                        NavigationAction::Continue
                    }
                }),
            );

            let weak = Rc::downgrade(&self.inner);
            let cleanup = on_cleanup(ctx.hooks(), move || {
                if let Some(inner) = weak.upgrade() {
                    let keep_alive = KeepAlive { inner };
                    keep_alive.cancel_eviction();
                    keep_alive.clear();
                }
                async {}
            });
            self.inner.hook_ids.borrow_mut().extend([end, cleanup]);

            if let Some(every) = self.inner.options.stale_after {
                self.arm_eviction(ctx.scheduler(), every);
            }
            Ok(())
        }
        .boxed_local()
    }

    fn uninstall<'a>(&'a self, ctx: &'a PluginContext) -> LocalBoxFuture<'a, ()> {
        async move {
            self.cancel_eviction();
            for id in self.inner.hook_ids.borrow_mut().drain(..) {
                ctx.hooks().off(id);
            }
            self.inner.ctx.borrow_mut().take();
        }
        .boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_dedups_and_notifies() {
        let keep_alive = KeepAlive::default();
        let seen = Rc::new(RefCell::new(Vec::new()));
        {
            let seen = seen.clone();
            keep_alive.subscribe(move |names| seen.borrow_mut().push(names.to_vec()));
        }

        keep_alive.set(vec!["A".to_string(), "B".to_string(), "A".to_string()]);
        keep_alive.set(vec!["A".to_string(), "B".to_string()]);
        keep_alive.add("C");
        keep_alive.add("C");
        assert!(keep_alive.remove("A"));
        assert!(!keep_alive.remove("A"));

        assert_eq!(keep_alive.names(), vec!["B".to_string(), "C".to_string()]);
        assert_eq!(seen.borrow().len(), 3);
    }

    #[test]
    fn test_mode_switch() {
        let keep_alive = KeepAlive::new(KeepAliveOptions::new().manual());
        assert!(!keep_alive.is_auto());
        keep_alive.set_auto(true);
        assert!(keep_alive.is_auto());
    }

    #[test]
    fn test_names_for_matched_chain() {
        let layout = Rc::new(RouteRecord::new("/").component("Layout"));
        let page = Rc::new(RouteRecord::new("list").component("ListPage"));
        let bare = Rc::new(RouteRecord::new("x"));
        let mut route = Route::start();
        route.matched = vec![layout, page, bare];

        let keep_alive = KeepAlive::default();
        let names = pollster::block_on(keep_alive.names_for(&route));
        assert_eq!(names, vec!["Layout".to_string(), "ListPage".to_string()]);
    }

    #[test]
    fn test_zero_stale_duration_disables_eviction() {
        let options = KeepAliveOptions::new().stale_after(Duration::ZERO);
        let keep_alive = KeepAlive::new(options);
        keep_alive.add("A");
        assert!(keep_alive.evict_stale().is_empty());
        assert!(keep_alive.contains("A"));
    }
}
