//! Route records and resolved routes.
//!
//! A [`RouteRecord`] is a route *definition*: a path pattern, optional page
//! identity, component source and children. Records are registered once on
//! the [`Router`](crate::router::Router) and shared as `Rc<RouteRecord>`.
//!
//! A [`Route`] is a *resolved location*: the concrete path and query a
//! navigation points at, together with the chain of records it matched. Every
//! guard, hook and plugin receives `Route` snapshots.
//!
//! # Page identity
//!
//! Pages that take part in tab management carry an explicit [`PageIdentity`]
//! instead of conventionally named meta fields. The router validates it when
//! the record is registered.
//!
//! ```
//! use navigator_plugins::route::{PageIdentity, RouteRecord};
//!
//! let record = RouteRecord::new("/orders/:id")
//!     .name("order")
//!     .component("OrderPage")
//!     .page(PageIdentity::new("order").title("Order").keep_alive());
//!
//! let page = record.page_identity().unwrap();
//! assert_eq!(page.page_id, "order");
//! assert!(page.is_keep_alive);
//! ```

use crate::params::{QueryParams, RouteParams};
use futures::future::{FutureExt, LocalBoxFuture};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

// ============================================================================
// RecordId
// ============================================================================

/// Process-unique identity of a [`RouteRecord`].
///
/// Used as a cache key wherever "the route record itself" identifies
/// something (memoized component names, matched-chain diffs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId(usize);

impl RecordId {
    fn next() -> Self {
        static COUNTER: AtomicUsize = AtomicUsize::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

// ============================================================================
// PageIdentity
// ============================================================================

/// Explicit identity of a page, used by the tab registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageIdentity {
    /// Stable page identifier. Must not be empty.
    pub page_id: String,
    /// Tab title.
    pub title: String,
    /// Optional icon name.
    pub icon: Option<String>,
    /// Affixed tabs survive every bulk removal.
    pub is_affix: bool,
    /// Whether the page's components should be kept alive while its tab is open.
    pub is_keep_alive: bool,
    /// One tab per page regardless of the query/params it was opened with.
    pub is_uniq: bool,
}

impl PageIdentity {
    /// Create a page identity with the given id, titled after the id.
    pub fn new(page_id: impl Into<String>) -> Self {
        let page_id = page_id.into();
        Self {
            title: page_id.clone(),
            page_id,
            icon: None,
            is_affix: false,
            is_keep_alive: false,
            is_uniq: false,
        }
    }

    /// Set the tab title.
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the tab icon.
    #[must_use]
    pub fn icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// Mark the page's tab as affixed.
    #[must_use]
    pub fn affix(mut self) -> Self {
        self.is_affix = true;
        self
    }

    /// Keep the page's components alive while its tab is open.
    #[must_use]
    pub fn keep_alive(mut self) -> Self {
        self.is_keep_alive = true;
        self
    }

    /// Allow only one tab for this page.
    #[must_use]
    pub fn uniq(mut self) -> Self {
        self.is_uniq = true;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.page_id.trim().is_empty() {
            return Err("page identity requires a non-empty page id".to_string());
        }
        Ok(())
    }
}

// ============================================================================
// ComponentSource
// ============================================================================

/// Async loader resolving a lazily loaded component to its name.
pub type ComponentLoader = Rc<dyn Fn() -> LocalBoxFuture<'static, String>>;

/// Where a record's component name comes from.
#[derive(Clone)]
pub enum ComponentSource {
    /// The name is known up front.
    Named(String),
    /// The component is loaded on demand; its name is known once loaded.
    Lazy(ComponentLoader),
}

impl fmt::Debug for ComponentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Self::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

// ============================================================================
// RouteRecord
// ============================================================================

/// A route definition.
pub struct RouteRecord {
    id: RecordId,
    path: String,
    name: Option<String>,
    page: Option<PageIdentity>,
    component: Option<ComponentSource>,
    required_features: Vec<String>,
    requires_auth: bool,
    meta: HashMap<String, serde_json::Value>,
    children: Vec<Rc<RouteRecord>>,
}

impl RouteRecord {
    /// Create a record for a path pattern.
    ///
    /// Patterns use `:name` for dynamic segments. Child patterns are relative
    /// to their parent; an empty child path is an index route.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            id: RecordId::next(),
            path: path.into(),
            name: None,
            page: None,
            component: None,
            required_features: Vec::new(),
            requires_auth: false,
            meta: HashMap::new(),
            children: Vec::new(),
        }
    }

    /// Name the route.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach a page identity.
    #[must_use]
    pub fn page(mut self, page: PageIdentity) -> Self {
        self.page = Some(page);
        self
    }

    /// Use a statically named component.
    #[must_use]
    pub fn component(mut self, name: impl Into<String>) -> Self {
        self.component = Some(ComponentSource::Named(name.into()));
        self
    }

    /// Use a lazily loaded component; `loader` resolves to its name.
    #[must_use]
    pub fn lazy_component<F, Fut>(mut self, loader: F) -> Self
    where
        F: Fn() -> Fut + 'static,
        Fut: Future<Output = String> + 'static,
    {
        self.component = Some(ComponentSource::Lazy(Rc::new(move || {
            loader().boxed_local()
        })));
        self
    }

    /// Require a feature to be granted for navigations into this route.
    #[must_use]
    pub fn requires_feature(mut self, feature: impl Into<String>) -> Self {
        self.required_features.push(feature.into());
        self
    }

    /// Require an authenticated session for navigations into this route.
    #[must_use]
    pub fn requires_auth(mut self) -> Self {
        self.requires_auth = true;
        self
    }

    /// Attach an arbitrary meta value.
    #[must_use]
    pub fn meta(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    /// Set child routes.
    #[must_use]
    pub fn children(mut self, children: Vec<RouteRecord>) -> Self {
        self.children = children.into_iter().map(Rc::new).collect();
        self
    }

    /// Unique record identity.
    pub fn id(&self) -> RecordId {
        self.id
    }

    /// Path pattern as registered.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Route name, if any.
    pub fn route_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Page identity, if any.
    pub fn page_identity(&self) -> Option<&PageIdentity> {
        self.page.as_ref()
    }

    /// Component source, if any.
    pub fn component_source(&self) -> Option<&ComponentSource> {
        self.component.as_ref()
    }

    /// Features that must be granted to enter this route.
    pub fn required_features(&self) -> &[String] {
        &self.required_features
    }

    /// Whether entering this route needs an authenticated session.
    pub fn is_auth_required(&self) -> bool {
        self.requires_auth
    }

    /// Meta value by key.
    pub fn meta_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.meta.get(key)
    }

    /// Child records.
    pub fn child_records(&self) -> &[Rc<RouteRecord>] {
        &self.children
    }

    /// Resolve the component name, awaiting the loader for lazy components.
    ///
    /// Every call to a lazy source runs the loader again; callers that need
    /// the name repeatedly should memoize it (see
    /// [`KeepAlive::resolve_name`](crate::keep_alive::KeepAlive::resolve_name)).
    pub async fn load_component_name(&self) -> Option<String> {
        match self.component.as_ref()? {
            ComponentSource::Named(name) => Some(name.clone()),
            ComponentSource::Lazy(loader) => Some(loader().await),
        }
    }

    /// Validate this record and all its descendants.
    pub(crate) fn validate(&self) -> Result<(), (String, String)> {
        if let Some(page) = &self.page {
            page.validate().map_err(|msg| (self.path.clone(), msg))?;
        }
        for child in &self.children {
            child.validate()?;
        }
        Ok(())
    }
}

impl fmt::Debug for RouteRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteRecord")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("name", &self.name)
            .field("page", &self.page)
            .field("children", &self.children.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Route
// ============================================================================

/// How a navigation moved through history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NavigationType {
    /// The first navigation after the router started.
    #[default]
    Initial,
    /// A new entry was pushed.
    Push,
    /// The current entry was replaced.
    Replace,
    /// An existing entry was revisited (back/forward/go).
    Pop,
}

/// Identifies one navigation attempt.
///
/// Legs started by a guard redirect keep the id of the attempt that was
/// redirected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NavigationId(pub(crate) u64);

/// A resolved location.
#[derive(Debug, Clone)]
pub struct Route {
    /// Normalized path without query.
    pub path: String,
    /// Path plus canonical query string.
    pub full_path: String,
    /// Query parameters.
    pub query: QueryParams,
    /// Path parameters accumulated over the matched chain.
    pub params: RouteParams,
    /// Name of the deepest named record.
    pub name: Option<String>,
    /// Matched records, root first.
    pub matched: Vec<Rc<RouteRecord>>,
    /// History position this location occupies (or will occupy).
    pub position: Option<usize>,
    /// How the navigation producing this route moved through history.
    pub navigation_type: NavigationType,
    /// Navigation that produced this route; `None` for plain resolution.
    pub navigation: Option<NavigationId>,
}

impl Route {
    /// The location the router reports before its first navigation.
    pub fn start() -> Self {
        Self {
            path: "/".to_string(),
            full_path: "/".to_string(),
            query: QueryParams::new(),
            params: RouteParams::new(),
            name: None,
            matched: Vec::new(),
            position: None,
            navigation_type: NavigationType::Initial,
            navigation: None,
        }
    }

    /// Page identity of the deepest matched record that has one.
    pub fn page(&self) -> Option<&PageIdentity> {
        self.matched.iter().rev().find_map(|r| r.page_identity())
    }

    /// The deepest matched record.
    pub fn leaf(&self) -> Option<&Rc<RouteRecord>> {
        self.matched.last()
    }

    /// Meta value by key, searching the matched chain from the leaf up.
    pub fn meta(&self, key: &str) -> Option<&serde_json::Value> {
        self.matched.iter().rev().find_map(|r| r.meta_value(key))
    }

    /// Whether `record` is part of this route's matched chain.
    pub fn has_matched(&self, record: RecordId) -> bool {
        self.matched.iter().any(|r| r.id() == record)
    }

    /// Whether this route revisits an existing history entry.
    pub fn is_pop(&self) -> bool {
        self.navigation_type == NavigationType::Pop
    }

    /// Serializable subset of this route.
    pub fn snapshot(&self) -> RouteSnapshot {
        RouteSnapshot {
            path: self.path.clone(),
            full_path: self.full_path.clone(),
            name: self.name.clone(),
            query: self.query.clone(),
            params: self.params.clone(),
        }
    }
}

/// Frozen, serializable identity of a route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSnapshot {
    pub path: String,
    pub full_path: String,
    pub name: Option<String>,
    pub query: QueryParams,
    pub params: RouteParams,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_ids_are_unique() {
        let a = RouteRecord::new("/a");
        let b = RouteRecord::new("/a");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_page_validation() {
        let record = RouteRecord::new("/x").children(vec![
            RouteRecord::new("y").page(PageIdentity::new("  ")),
        ]);
        let (path, _) = record.validate().unwrap_err();
        assert_eq!(path, "y");

        let ok = RouteRecord::new("/x").page(PageIdentity::new("x"));
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_lazy_component_name() {
        let record = RouteRecord::new("/lazy").lazy_component(|| async { "LazyPage".to_string() });
        let name = pollster::block_on(record.load_component_name());
        assert_eq!(name.as_deref(), Some("LazyPage"));

        let none = RouteRecord::new("/none");
        assert!(pollster::block_on(none.load_component_name()).is_none());
    }

    #[test]
    fn test_route_page_prefers_leaf() {
        let parent = Rc::new(RouteRecord::new("/a").page(PageIdentity::new("parent")));
        let child = Rc::new(RouteRecord::new("b").page(PageIdentity::new("child")));
        let mut route = Route::start();
        route.matched = vec![parent, child];
        assert_eq!(route.page().unwrap().page_id, "child");
    }
}
