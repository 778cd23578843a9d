//! Tab registry.
//!
//! A tab is one open "page session": a record keyed by the page identity of
//! the route it was opened on. The registry follows committed navigations:
//!
//! | Direction   | Effect                                                  |
//! |-------------|---------------------------------------------------------|
//! | `Forward`   | open (or re-activate) the target's tab                  |
//! | `Backward`  | close the origin's tab, then activate the target's      |
//! | `Unchanged` | replace the origin's tab in place with the target's     |
//!
//! # Tab identity
//!
//! A tab id is derived, never stored opaquely: a unique page (`is_uniq`) has
//! id `page_id`; any other page has id `page_id:full_path`. Opening the same
//! id again refreshes the existing record instead of adding another.
//!
//! # Removal
//!
//! Affixed tabs are never removed by bulk operations. Bulk removals ask
//! `before_remove` for every candidate and only mutate the list when all of
//! them agree. Removing the active tab first activates its neighbor
//! (preferring the one before it), so the active id always names a present
//! tab.
//!
//! # Keep-alive takeover
//!
//! When a [`KeepAlive`] plugin is installed, the registry switches it to
//! takeover mode on first access and from then on recomputes its set from
//! the keep-alive tabs after every change.

use crate::direction::Direction;
use crate::error::PluginError;
use crate::guards::NavigationAction;
use crate::hooks::{hook_fn, Hook, HookEvent, HookId, NavigationEvent};
use crate::keep_alive::{self, KeepAlive};
use crate::plugin::{on_cleanup, Plugin, PluginContext};
use crate::route::{PageIdentity, Route};
use crate::storage::PersistedCell;
use crate::{debug_log, plugin_warn, trace_log};
use futures::future::{FutureExt, LocalBoxFuture};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

const PLUGIN: &str = "tabs";

// ============================================================================
// Records
// ============================================================================

/// One open tab.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabRecord {
    pub id: String,
    pub page_id: String,
    pub full_path: String,
    pub is_affix: bool,
    pub is_keep_alive: bool,
    pub is_uniq: bool,
    pub title: String,
    pub icon: Option<String>,
    /// Component name of the deepest matched record.
    pub component_name: Option<String>,
    /// Component names of the matched chain, kept alive while the tab is open.
    #[serde(default)]
    pub cached_components: Vec<String>,
}

impl TabRecord {
    /// Derive a tab id from a page identity and a full path.
    ///
    /// ```
    /// use navigator_plugins::route::PageIdentity;
    /// use navigator_plugins::tabs::TabRecord;
    ///
    /// let page = PageIdentity::new("order");
    /// assert_eq!(TabRecord::derive_id(&page, "/order?id=1"), "order:/order?id=1");
    /// assert_eq!(TabRecord::derive_id(&page.uniq(), "/order?id=1"), "order");
    /// ```
    pub fn derive_id(page: &PageIdentity, full_path: &str) -> String {
        if page.is_uniq {
            page.page_id.clone()
        } else {
            format!("{}:{}", page.page_id, full_path)
        }
    }

    fn refresh_from(&mut self, other: &TabRecord) {
        self.full_path.clone_from(&other.full_path);
        self.title.clone_from(&other.title);
        self.icon.clone_from(&other.icon);
        self.component_name.clone_from(&other.component_name);
        self.cached_components.clone_from(&other.cached_components);
    }
}

/// Persisted registry state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabsState {
    pub tabs: Vec<TabRecord>,
    /// Id of the active tab, empty when none.
    pub active: String,
}

impl TabsState {
    fn index_of(&self, id: &str) -> Option<usize> {
        self.tabs.iter().position(|tab| tab.id == id)
    }
}

/// Anything a tab can be looked up by.
#[derive(Debug, Clone)]
pub enum TabRef {
    Id(String),
    Index(usize),
    Tab(TabRecord),
    Route(Route),
}

impl From<&str> for TabRef {
    fn from(id: &str) -> Self {
        Self::Id(id.to_string())
    }
}

impl From<String> for TabRef {
    fn from(id: String) -> Self {
        Self::Id(id)
    }
}

impl From<usize> for TabRef {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<&TabRecord> for TabRef {
    fn from(tab: &TabRecord) -> Self {
        Self::Tab(tab.clone())
    }
}

impl From<&Route> for TabRef {
    fn from(route: &Route) -> Self {
        Self::Route(route.clone())
    }
}

/// Answer of a `before_replace` check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceDecision {
    /// Replace the old tab with the new one.
    Replace,
    /// Open the new tab next to the old one.
    Open,
    /// Veto the navigation.
    Cancel,
}

/// Side of a source tab for [`Tabs::remove_by_side`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

// ============================================================================
// Options
// ============================================================================

/// Async check on a route about to get a tab.
pub type RoutePredicate = Rc<dyn Fn(Route) -> LocalBoxFuture<'static, bool>>;
/// Async check on a tab about to be removed.
pub type TabPredicate = Rc<dyn Fn(TabRecord) -> LocalBoxFuture<'static, bool>>;
/// Async decision on `(new, old)` in replace mode.
pub type ReplacePredicate =
    Rc<dyn Fn(TabRecord, TabRecord) -> LocalBoxFuture<'static, ReplaceDecision>>;
/// Whether two tabs of the same page show the same content.
pub type TabEquality = Rc<dyn Fn(&TabRecord, &TabRecord) -> bool>;

/// Create a [`TabPredicate`] from an async closure.
pub fn tab_predicate<F, Fut>(f: F) -> TabPredicate
where
    F: Fn(TabRecord) -> Fut + 'static,
    Fut: Future<Output = bool> + 'static,
{
    Rc::new(move |tab| f(tab).boxed_local())
}

/// Create a [`RoutePredicate`] from an async closure.
pub fn route_predicate<F, Fut>(f: F) -> RoutePredicate
where
    F: Fn(Route) -> Fut + 'static,
    Fut: Future<Output = bool> + 'static,
{
    Rc::new(move |route| f(route).boxed_local())
}

/// Create a [`ReplacePredicate`] from an async closure.
pub fn replace_predicate<F, Fut>(f: F) -> ReplacePredicate
where
    F: Fn(TabRecord, TabRecord) -> Fut + 'static,
    Fut: Future<Output = ReplaceDecision> + 'static,
{
    Rc::new(move |new, old| f(new, old).boxed_local())
}

/// Tab registry configuration.
#[derive(Clone)]
pub struct TabsOptions {
    before_add: Option<RoutePredicate>,
    before_remove: Option<TabPredicate>,
    before_replace: Option<ReplacePredicate>,
    is_same: TabEquality,
    remove_on_backward: bool,
    keep_alive_takeover: bool,
}

impl Default for TabsOptions {
    fn default() -> Self {
        Self {
            before_add: None,
            before_remove: None,
            before_replace: None,
            is_same: Rc::new(|a: &TabRecord, b: &TabRecord| a.full_path == b.full_path),
            remove_on_backward: true,
            keep_alive_takeover: true,
        }
    }
}

impl fmt::Debug for TabsOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TabsOptions")
            .field("before_add", &self.before_add.is_some())
            .field("before_remove", &self.before_remove.is_some())
            .field("replace_mode", &self.before_replace.is_some())
            .field("remove_on_backward", &self.remove_on_backward)
            .field("keep_alive_takeover", &self.keep_alive_takeover)
            .finish_non_exhaustive()
    }
}

impl TabsOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Veto opening a tab for a route.
    #[must_use]
    pub fn before_add(mut self, predicate: RoutePredicate) -> Self {
        self.before_add = Some(predicate);
        self
    }

    /// Veto closing a tab.
    #[must_use]
    pub fn before_remove(mut self, predicate: TabPredicate) -> Self {
        self.before_remove = Some(predicate);
        self
    }

    /// Enable replace mode: when a navigation would open a second tab for a
    /// page that already has exactly one differing tab, ask `decide`.
    #[must_use]
    pub fn replace_mode(mut self, decide: ReplacePredicate) -> Self {
        self.before_replace = Some(decide);
        self
    }

    /// Equality used to match a new tab against open tabs of the same page.
    #[must_use]
    pub fn is_same(mut self, is_same: impl Fn(&TabRecord, &TabRecord) -> bool + 'static) -> Self {
        self.is_same = Rc::new(is_same);
        self
    }

    /// Keep the origin's tab open on backward navigation.
    #[must_use]
    pub fn keep_on_backward(mut self) -> Self {
        self.remove_on_backward = false;
        self
    }

    /// Leave an installed keep-alive plugin in its own mode.
    #[must_use]
    pub fn without_keep_alive_takeover(mut self) -> Self {
        self.keep_alive_takeover = false;
        self
    }
}

// ============================================================================
// Tabs
// ============================================================================

struct Bound {
    ctx: PluginContext,
    state: PersistedCell<TabsState>,
}

struct TabsInner {
    options: TabsOptions,
    bound: RefCell<Option<Bound>>,
    hook_ids: RefCell<Vec<HookId>>,
    pending_replace: RefCell<Option<String>>,
    taken_over: Cell<bool>,
}

/// Tab registry plugin.
#[derive(Clone)]
pub struct Tabs {
    inner: Rc<TabsInner>,
}

impl fmt::Debug for Tabs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self
            .inner
            .bound
            .borrow()
            .as_ref()
            .map(|bound| bound.state.get());
        f.debug_struct("Tabs")
            .field("options", &self.inner.options)
            .field("state", &state)
            .finish_non_exhaustive()
    }
}

impl Default for Tabs {
    fn default() -> Self {
        Self::new(TabsOptions::default())
    }
}

impl Tabs {
    pub fn new(options: TabsOptions) -> Self {
        Self {
            inner: Rc::new(TabsInner {
                options,
                bound: RefCell::new(None),
                hook_ids: RefCell::new(Vec::new()),
                pending_replace: RefCell::new(None),
                taken_over: Cell::new(false),
            }),
        }
    }

    fn bound(&self) -> Result<(PluginContext, PersistedCell<TabsState>), PluginError> {
        self.inner
            .bound
            .borrow()
            .as_ref()
            .map(|bound| (bound.ctx.clone(), bound.state.clone()))
            .ok_or(PluginError::NotBound { plugin: PLUGIN })
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Open tabs, in display order.
    pub fn tabs(&self) -> Result<Vec<TabRecord>, PluginError> {
        let (_, state) = self.bound()?;
        Ok(state.with(|s| s.tabs.clone()))
    }

    /// Id of the active tab (empty when none).
    pub fn active_id(&self) -> Result<String, PluginError> {
        let (_, state) = self.bound()?;
        Ok(state.with(|s| s.active.clone()))
    }

    pub fn active_tab(&self) -> Result<Option<TabRecord>, PluginError> {
        let (_, state) = self.bound()?;
        Ok(state.with(|s| s.tabs.iter().find(|t| t.id == s.active).cloned()))
    }

    /// Tab matching `target`, if open.
    pub fn find(&self, target: impl Into<TabRef>) -> Result<Option<TabRecord>, PluginError> {
        let id = self.resolve_id(target)?;
        let (_, state) = self.bound()?;
        Ok(state.with(|s| s.tabs.iter().find(|t| t.id == id).cloned()))
    }

    /// Canonical tab id for `target`.
    ///
    /// Unresolvable input (an index out of range, a route without page
    /// identity) is logged and yields an empty string.
    pub fn resolve_id(&self, target: impl Into<TabRef>) -> Result<String, PluginError> {
        let (_, state) = self.bound()?;
        let id = match target.into() {
            TabRef::Id(id) => id,
            TabRef::Tab(tab) => tab.id,
            TabRef::Index(index) => match state.with(|s| s.tabs.get(index).map(|t| t.id.clone())) {
                Some(id) => id,
                None => {
                    plugin_warn!(PLUGIN, "no tab at index {}", index);
                    String::new()
                }
            },
            TabRef::Route(route) => match route.page() {
                Some(page) => TabRecord::derive_id(page, &route.full_path),
                None => {
                    plugin_warn!(PLUGIN, "route '{}' has no page identity", route.full_path);
                    String::new()
                }
            },
        };
        Ok(id)
    }

    // ------------------------------------------------------------------------
    // Route lock
    // ------------------------------------------------------------------------

    pub fn is_route_locked(&self) -> Result<bool, PluginError> {
        Ok(self.bound()?.0.navigator().is_route_locked())
    }

    pub fn lock_route(&self) -> Result<(), PluginError> {
        self.bound()?.0.navigator().lock_route();
        Ok(())
    }

    pub fn unlock_route(&self) -> Result<(), PluginError> {
        self.bound()?.0.navigator().unlock_route();
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Open (or re-activate) the tab for `route`.
    ///
    /// Returns `false` when the route has no page identity or `before_add`
    /// vetoed it.
    pub async fn add_one(&self, route: &Route) -> Result<bool, PluginError> {
        let (ctx, state) = self.bound()?;
        let Some(page) = route.page() else {
            plugin_warn!(PLUGIN, "route '{}' has no page identity; no tab opened", route.full_path);
            return Ok(false);
        };

        if let Some(before_add) = &self.inner.options.before_add {
            if !ctx.bounded(before_add(route.clone()), false).await {
                debug_log!("before_add vetoed tab for '{}'", route.full_path);
                return Ok(false);
            }
        }

        let candidate = self.make_record(&ctx, route, page).await;
        let is_same = Rc::clone(&self.inner.options.is_same);
        state
            .update(|s| {
                if let Some(existing) = s.tabs.iter_mut().find(|t| t.id == candidate.id) {
                    trace_log!("Refreshing tab '{}'", existing.id);
                    existing.refresh_from(&candidate);
                    s.active = existing.id.clone();
                    return;
                }
                let similar = s
                    .tabs
                    .iter()
                    .find(|t| t.page_id == candidate.page_id && is_same(t, &candidate));
                if let Some(existing) = similar {
                    s.active = existing.id.clone();
                    return;
                }
                trace_log!("Opening tab '{}'", candidate.id);
                s.active = candidate.id.clone();
                s.tabs.push(candidate);
            })
            .await;

        self.sync_keep_alive(&ctx, &state);
        Ok(true)
    }

    /// Activate a tab, navigating to it if it is not the current route.
    pub async fn set_active(&self, target: impl Into<TabRef>) -> Result<bool, PluginError> {
        let id = self.resolve_id(target)?;
        let (ctx, state) = self.bound()?;
        if state.with(|s| s.index_of(&id)).is_none() {
            plugin_warn!(PLUGIN, "cannot activate unknown tab '{}'", id);
            return Ok(false);
        }
        self.activate(&ctx, &state, &id, true).await;
        Ok(true)
    }

    /// Close one tab.
    ///
    /// Missing and affixed tabs are left alone and count as success; a
    /// `before_remove` veto returns `false`.
    pub async fn remove_one(&self, target: impl Into<TabRef>) -> Result<bool, PluginError> {
        let id = self.resolve_id(target)?;
        let (ctx, state) = self.bound()?;
        let Some(tab) = state.with(|s| s.tabs.iter().find(|t| t.id == id).cloned()) else {
            return Ok(true);
        };
        if tab.is_affix {
            return Ok(true);
        }
        self.remove_set(&ctx, &state, vec![tab], None, false, true)
            .await
    }

    /// Close every non-affixed tab except `source`.
    pub async fn remove_other(&self, source: impl Into<TabRef>) -> Result<bool, PluginError> {
        let source = self.resolve_id(source)?;
        let (ctx, state) = self.bound()?;
        let candidates: Vec<TabRecord> = state.with(|s| {
            s.tabs
                .iter()
                .filter(|t| !t.is_affix && t.id != source)
                .cloned()
                .collect()
        });
        self.remove_set(&ctx, &state, candidates, Some(source), false, true)
            .await
    }

    /// Close every non-affixed tab on one side of `source`.
    pub async fn remove_by_side(
        &self,
        side: Side,
        source: impl Into<TabRef>,
    ) -> Result<bool, PluginError> {
        let source = self.resolve_id(source)?;
        let (ctx, state) = self.bound()?;
        let Some(index) = state.with(|s| s.index_of(&source)) else {
            plugin_warn!(PLUGIN, "cannot remove beside unknown tab '{}'", source);
            return Ok(false);
        };
        let candidates: Vec<TabRecord> = state.with(|s| {
            let range = match side {
                Side::Left => &s.tabs[..index],
                Side::Right => &s.tabs[index + 1..],
            };
            range.iter().filter(|t| !t.is_affix).cloned().collect()
        });
        self.remove_set(&ctx, &state, candidates, Some(source), false, true)
            .await
    }

    /// Close every non-affixed tab. `force` skips `before_remove` and does
    /// not navigate to the newly active tab.
    pub async fn remove_all(&self, force: bool) -> Result<bool, PluginError> {
        let (ctx, state) = self.bound()?;
        let candidates: Vec<TabRecord> =
            state.with(|s| s.tabs.iter().filter(|t| !t.is_affix).cloned().collect());
        self.remove_set(&ctx, &state, candidates, None, force, !force)
            .await
    }

    async fn remove_set(
        &self,
        ctx: &PluginContext,
        state: &PersistedCell<TabsState>,
        candidates: Vec<TabRecord>,
        prefer_active: Option<String>,
        force: bool,
        navigate: bool,
    ) -> Result<bool, PluginError> {
        if candidates.is_empty() {
            return Ok(true);
        }

        if !force {
            if let Some(before_remove) = &self.inner.options.before_remove {
                let mut allowed = true;
                for tab in &candidates {
                    allowed &= ctx.bounded(before_remove(tab.clone()), false).await;
                }
                if !allowed {
                    debug_log!("before_remove vetoed removal of {} tabs", candidates.len());
                    return Ok(false);
                }
            }
        }

        let removed: HashSet<String> = candidates.into_iter().map(|t| t.id).collect();
        let next_active = state.with(|s| {
            if !removed.contains(&s.active) {
                return None;
            }
            if let Some(preferred) = prefer_active.filter(|id| !removed.contains(id)) {
                return Some(preferred);
            }
            let index = s.index_of(&s.active)?;
            let before = s.tabs[..index].iter().rev();
            let after = s.tabs[index + 1..].iter();
            before
                .chain(after)
                .find(|t| !removed.contains(&t.id))
                .map(|t| t.id.clone())
        });

        if let Some(next) = next_active {
            self.activate(ctx, state, &next, navigate).await;
        }

        state
            .update(|s| {
                s.tabs.retain(|t| !removed.contains(&t.id));
                if removed.contains(&s.active) {
                    s.active.clear();
                }
            })
            .await;
        debug_log!("Closed {} tabs", removed.len());

        self.sync_keep_alive(ctx, state);
        Ok(true)
    }

    async fn activate(
        &self,
        ctx: &PluginContext,
        state: &PersistedCell<TabsState>,
        id: &str,
        navigate: bool,
    ) {
        let Some(tab) = state.with(|s| s.tabs.iter().find(|t| t.id == id).cloned()) else {
            return;
        };
        state.update(|s| s.active = tab.id.clone()).await;

        let navigator = ctx.navigator();
        if !navigate || navigator.current_route().full_path == tab.full_path {
            return;
        }
        navigator.lock_route();
        let result = navigator.push(tab.full_path.clone()).await;
        navigator.unlock_route();
        if let Err(failure) = result {
            plugin_warn!(PLUGIN, "navigation to tab '{}' failed: {}", tab.id, failure);
        }
    }

    /// Replace the tab `old_id` in place with the tab for `route`.
    async fn replace_tab(&self, old_id: &str, route: &Route) -> Result<bool, PluginError> {
        let (ctx, state) = self.bound()?;
        let Some(page) = route.page() else {
            return Ok(false);
        };
        let old = state.with(|s| s.tabs.iter().find(|t| t.id == old_id).cloned());
        let Some(old) = old.filter(|t| !t.is_affix) else {
            return self.add_one(route).await;
        };

        let candidate = self.make_record(&ctx, route, page).await;
        state
            .update(|s| {
                let Some(index) = s.index_of(&old.id) else {
                    return;
                };
                if let Some(existing) = s.index_of(&candidate.id).filter(|i| *i != index) {
                    s.tabs[existing].refresh_from(&candidate);
                    s.tabs.remove(index);
                } else {
                    s.tabs[index] = candidate.clone();
                }
                s.active = candidate.id.clone();
            })
            .await;
        trace_log!("Replaced tab '{}' with '{}'", old.id, route.full_path);

        self.sync_keep_alive(&ctx, &state);
        Ok(true)
    }

    async fn make_record(&self, ctx: &PluginContext, route: &Route, page: &PageIdentity) -> TabRecord {
        let keep_alive = ctx.get::<KeepAlive>();
        let component_name = match (route.leaf(), &keep_alive) {
            (Some(leaf), Some(keep_alive)) => keep_alive.resolve_name(leaf).await,
            (Some(leaf), None) => leaf.load_component_name().await,
            (None, _) => None,
        };
        let cached_components = match (&keep_alive, page.is_keep_alive) {
            (Some(keep_alive), true) => keep_alive.names_for(route).await,
            _ => Vec::new(),
        };

        TabRecord {
            id: TabRecord::derive_id(page, &route.full_path),
            page_id: page.page_id.clone(),
            full_path: route.full_path.clone(),
            is_affix: page.is_affix,
            is_keep_alive: page.is_keep_alive,
            is_uniq: page.is_uniq,
            title: page.title.clone(),
            icon: page.icon.clone(),
            component_name,
            cached_components,
        }
    }

    // ------------------------------------------------------------------------
    // Keep-alive takeover
    // ------------------------------------------------------------------------

    fn keep_alive(&self, ctx: &PluginContext) -> Option<KeepAlive> {
        if !self.inner.options.keep_alive_takeover {
            return None;
        }
        let keep_alive = ctx.get::<KeepAlive>()?;
        if !self.inner.taken_over.replace(true) {
            debug_log!("Tabs taking over keep-alive");
            keep_alive.set_auto(false);
        }
        Some(keep_alive)
    }

    fn sync_keep_alive(&self, ctx: &PluginContext, state: &PersistedCell<TabsState>) {
        let Some(keep_alive) = self.keep_alive(ctx) else {
            return;
        };
        let names: Vec<String> = state.with(|s| {
            s.tabs
                .iter()
                .filter(|t| t.is_keep_alive)
                .flat_map(|t| t.cached_components.iter().cloned())
                .collect()
        });
        keep_alive.set(names);
    }

    // ------------------------------------------------------------------------
    // Navigation events
    // ------------------------------------------------------------------------

    async fn on_start(&self, nav: NavigationEvent) -> NavigationAction {
        self.inner.pending_replace.borrow_mut().take();
        let Some(before_replace) = self.inner.options.before_replace.clone() else {
            return NavigationAction::Continue;
        };
        let Ok((ctx, state)) = self.bound() else {
            return NavigationAction::Continue;
        };
        if ctx.navigator().is_route_locked() {
            return NavigationAction::Continue;
        }
        let Some(page) = nav.to.page() else {
            return NavigationAction::Continue;
        };
        if page.is_uniq {
            return NavigationAction::Continue;
        }

        let candidate = self.make_record(&ctx, &nav.to, page).await;
        let is_same = Rc::clone(&self.inner.options.is_same);
        let old = state.with(|s| {
            if s.index_of(&candidate.id).is_some() {
                return None;
            }
            let mut same_page = s.tabs.iter().filter(|t| t.page_id == candidate.page_id);
            match (same_page.next(), same_page.next()) {
                (Some(only), None) if !is_same(only, &candidate) => Some(only.clone()),
                _ => None,
            }
        });
        let Some(old) = old else {
            return NavigationAction::Continue;
        };

        let old_id = old.id.clone();
        match ctx
            .bounded(before_replace(candidate, old), ReplaceDecision::Open)
            .await
        {
            ReplaceDecision::Replace => {
                *self.inner.pending_replace.borrow_mut() = Some(old_id);
                NavigationAction::Continue
            }
            ReplaceDecision::Open => NavigationAction::Continue,
            ReplaceDecision::Cancel => NavigationAction::deny("Tab replacement cancelled"),
        }
    }

    async fn on_end(&self, nav: NavigationEvent) -> Result<(), PluginError> {
        let (ctx, state) = self.bound()?;
        let pending = self.inner.pending_replace.borrow_mut().take();
        if ctx.navigator().is_route_locked() {
            return Ok(());
        }
        self.keep_alive(&ctx);

        if let Some(old_id) = pending {
            self.replace_tab(&old_id, &nav.to).await?;
            return Ok(());
        }

        match nav.direction {
            Direction::Forward => {
                self.add_one(&nav.to).await?;
            }
            Direction::Backward => {
                if self.inner.options.remove_on_backward {
                    self.close_origin(&ctx, &state, &nav).await;
                }
                self.add_one(&nav.to).await?;
            }
            Direction::Unchanged => {
                let from_id = match nav.from.page() {
                    Some(page) => TabRecord::derive_id(page, &nav.from.full_path),
                    None => String::new(),
                };
                let from_open = state.with(|s| s.index_of(&from_id).is_some());
                if from_open && nav.to.page().is_some() {
                    self.replace_tab(&from_id, &nav.to).await?;
                } else {
                    self.add_one(&nav.to).await?;
                }
            }
        }
        Ok(())
    }

    async fn close_origin(
        &self,
        ctx: &PluginContext,
        state: &PersistedCell<TabsState>,
        nav: &NavigationEvent,
    ) {
        let Some(page) = nav.from.page() else {
            return;
        };
        let from_id = TabRecord::derive_id(page, &nav.from.full_path);
        let to_id = nav.to.page().map(|p| TabRecord::derive_id(p, &nav.to.full_path));
        if to_id.as_deref() == Some(from_id.as_str()) {
            return;
        }
        let Some(tab) = state.with(|s| s.tabs.iter().find(|t| t.id == from_id).cloned()) else {
            return;
        };
        if tab.is_affix {
            return;
        }
        if let Err(e) = self.remove_set(ctx, state, vec![tab], to_id, false, false).await {
            plugin_warn!(PLUGIN, "failed to close tab '{}': {}", from_id, e);
        }
    }
}

// ============================================================================
// Plugin
// ============================================================================

fn merge_state(mut stored: TabsState, session: TabsState) -> TabsState {
    for tab in session.tabs {
        match stored.index_of(&tab.id) {
            Some(index) => stored.tabs[index] = tab,
            None => stored.tabs.push(tab),
        }
    }
    if !session.active.is_empty() {
        stored.active = session.active;
    }
    stored
}

impl Plugin for Tabs {
    fn name(&self) -> &'static str {
        PLUGIN
    }

    fn install<'a>(&'a self, ctx: &'a PluginContext) -> LocalBoxFuture<'a, Result<(), PluginError>> {
        async move {
            let state = PersistedCell::persisted(
                ctx.storage_key("tabs"),
                TabsState::default(),
                ctx.storage(),
            );
            state.hydrate(merge_state).await;
            *self.inner.bound.borrow_mut() = Some(Bound {
                ctx: ctx.clone(),
                state: state.clone(),
            });

            let weak = Rc::downgrade(&self.inner);
            let start = ctx.hooks().on(
                Hook::Direction,
                hook_fn(move |event| {
                    let inner = weak.upgrade();
                    async move {
                        match (inner, event) {
                            (Some(inner), HookEvent::Navigation(nav)) => {
                                Tabs { inner }.on_start(nav).await
                            }
                            _ => NavigationAction::Continue,
                        }
                    }
                }),
            );

            let weak = Rc::downgrade(&self.inner);
            let end = ctx.hooks().on(
                Hook::DirectionEnd,
                hook_fn(move |event| {
                    let inner = weak.upgrade();
                    async move {
                        if let (Some(inner), HookEvent::Navigation(nav)) = (inner, event) {
                            if let Err(e) = (Tabs { inner }).on_end(nav).await {
                                plugin_warn!(PLUGIN, "{}", e);
                            }
                        }
                        NavigationAction::Continue
                    }
                }),
            );

            let weak = Rc::downgrade(&self.inner);
            let cleanup = on_cleanup(ctx.hooks(), move || {
                let inner = weak.upgrade();
                async move {
                    let Some(inner) = inner else {
                        return;
                    };
                    let tabs = Tabs { inner };
                    if let Ok((_, state)) = tabs.bound() {
                        let _ = tabs.remove_all(true).await;
                        state.clear().await;
                    }
                }
            });
            self.inner.hook_ids.borrow_mut().extend([start, end, cleanup]);

            self.sync_keep_alive(ctx, &state);
            Ok(())
        }
        .boxed_local()
    }

    fn uninstall<'a>(&'a self, ctx: &'a PluginContext) -> LocalBoxFuture<'a, ()> {
        async move {
            for id in self.inner.hook_ids.borrow_mut().drain(..) {
                ctx.hooks().off(id);
            }
            self.inner.bound.borrow_mut().take();
            self.inner.taken_over.set(false);
        }
        .boxed_local()
    }

    fn plugin_installed(&self, ctx: &PluginContext, name: &'static str) {
        if name != keep_alive::PLUGIN {
            return;
        }
        if let Ok((_, state)) = self.bound() {
            self.inner.taken_over.set(false);
            self.sync_keep_alive(ctx, &state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tab(id: &str) -> TabRecord {
        TabRecord {
            id: id.to_string(),
            page_id: id.to_string(),
            full_path: format!("/{}", id),
            is_affix: false,
            is_keep_alive: false,
            is_uniq: true,
            title: id.to_string(),
            icon: None,
            component_name: None,
            cached_components: Vec::new(),
        }
    }

    #[test]
    fn test_derive_id() {
        let page = PageIdentity::new("p");
        assert_eq!(TabRecord::derive_id(&page, "/p?x=1"), "p:/p?x=1");
        assert_ne!(
            TabRecord::derive_id(&page, "/p?x=1"),
            TabRecord::derive_id(&page, "/p?x=2")
        );
        let uniq = PageIdentity::new("p").uniq();
        assert_eq!(
            TabRecord::derive_id(&uniq, "/p?x=1"),
            TabRecord::derive_id(&uniq, "/p?x=2")
        );
    }

    #[test]
    fn test_merge_state_prefers_session() {
        let stored = TabsState {
            tabs: vec![tab("a"), tab("b")],
            active: "a".to_string(),
        };
        let mut updated_b = tab("b");
        updated_b.title = "B!".to_string();
        let session = TabsState {
            tabs: vec![updated_b, tab("c")],
            active: "c".to_string(),
        };

        let merged = merge_state(stored, session);
        let ids: Vec<&str> = merged.tabs.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(merged.tabs[1].title, "B!");
        assert_eq!(merged.active, "c");
    }

    #[test]
    fn test_unbound_tabs_report_not_bound() {
        let tabs = Tabs::default();
        assert!(matches!(
            tabs.tabs(),
            Err(PluginError::NotBound { plugin: "tabs" })
        ));
        assert!(pollster::block_on(tabs.remove_all(false)).is_err());
    }

    #[test]
    fn test_tab_record_serde_camel_case() {
        let json = serde_json::to_value(tab("a")).unwrap();
        assert_eq!(json["pageId"], "a");
        assert_eq!(json["isAffix"], false);
    }
}
