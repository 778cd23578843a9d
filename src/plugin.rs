//! Plugin host.
//!
//! The host owns the router handle, the [`Navigator`] wrapping it, the hook
//! bus, the storage backend and the scheduler, and hands all of them to each
//! plugin through a [`PluginContext`] when the plugin is installed. Plugins
//! never reach for a global: anything they need comes from the context, and
//! a plugin used before installation reports [`PluginError::NotBound`].
//!
//! # Example
//!
//! ```
//! use navigator_plugins::plugin::PluginHost;
//! use navigator_plugins::route::{PageIdentity, RouteRecord};
//! use navigator_plugins::router::Router;
//! use navigator_plugins::tabs::{Tabs, TabsOptions};
//!
//! let router = Router::with_routes(vec![
//!     RouteRecord::new("/home").page(PageIdentity::new("home").affix()),
//! ])
//! .unwrap();
//!
//! pollster::block_on(async {
//!     let host = PluginHost::builder().router(router).build().await.unwrap();
//!     let tabs = host.install(Tabs::new(TabsOptions::default())).await.unwrap();
//!
//!     host.navigator().push("/home").await.unwrap();
//!     assert_eq!(tabs.active_id().unwrap(), "home:/home");
//!
//!     host.teardown().await;
//! });
//! ```

use crate::details::DetailsStore;
use crate::error::PluginError;
use crate::hooks::{hook_fn, Hook, HookBus, HookEvent};
use crate::guards::NavigationAction;
use crate::navigator::{Navigator, NavigatorOptions};
use crate::router::Router;
use crate::scheduler::{maybe_with_timeout, ManualScheduler, Scheduler};
use crate::storage::{MemoryStorage, Storage};
use crate::{debug_log, info_log};
use futures::future::{FutureExt, LocalBoxFuture};
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

/// Default prefix of every persisted storage key.
pub const DEFAULT_STORAGE_PREFIX: &str = "navigator";

// ============================================================================
// Plugin trait
// ============================================================================

/// A plugin installed into a [`PluginHost`].
///
/// Plugins are cheap handles (`Clone`, `Rc` inside): the host keeps one
/// clone for typed lookup and teardown, the caller keeps another.
pub trait Plugin {
    /// Unique plugin name, used in warnings and to reject double installs.
    fn name(&self) -> &'static str;

    /// Bind to the host.
    fn install<'a>(&'a self, ctx: &'a PluginContext) -> LocalBoxFuture<'a, Result<(), PluginError>>;

    /// Release host resources. Runs after the `cleanup` hook.
    fn uninstall<'a>(&'a self, _ctx: &'a PluginContext) -> LocalBoxFuture<'a, ()> {
        async {}.boxed_local()
    }

    /// Another plugin named `name` finished installing on the same host.
    fn plugin_installed(&self, _ctx: &PluginContext, _name: &'static str) {}
}

// ============================================================================
// PluginContext
// ============================================================================

struct Installed {
    type_id: TypeId,
    name: &'static str,
    handle: Box<dyn Any>,
    plugin: Rc<dyn Plugin>,
}

struct ContextInner {
    router: Router,
    navigator: Navigator,
    hooks: HookBus,
    storage: Rc<dyn Storage>,
    scheduler: Rc<dyn Scheduler>,
    storage_prefix: String,
    predicate_timeout: Option<Duration>,
    installed: RefCell<Vec<Installed>>,
}

/// Everything a plugin may use from its host.
#[derive(Clone)]
pub struct PluginContext {
    inner: Rc<ContextInner>,
}

impl fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginContext")
            .field("storage_prefix", &self.inner.storage_prefix)
            .field("predicate_timeout", &self.inner.predicate_timeout)
            .field("plugins", &self.plugin_names())
            .finish_non_exhaustive()
    }
}

impl PluginContext {
    pub fn router(&self) -> &Router {
        &self.inner.router
    }

    pub fn navigator(&self) -> &Navigator {
        &self.inner.navigator
    }

    pub fn hooks(&self) -> &HookBus {
        &self.inner.hooks
    }

    pub fn storage(&self) -> Rc<dyn Storage> {
        Rc::clone(&self.inner.storage)
    }

    pub fn scheduler(&self) -> Rc<dyn Scheduler> {
        Rc::clone(&self.inner.scheduler)
    }

    /// Timeout applied to user predicates, if any.
    pub fn predicate_timeout(&self) -> Option<Duration> {
        self.inner.predicate_timeout
    }

    /// Storage key for a plugin's persisted state: `"{prefix}:{name}"`.
    pub fn storage_key(&self, name: &str) -> String {
        format!("{}:{}", self.inner.storage_prefix, name)
    }

    /// Await a user predicate, resolving to `fallback` on timeout.
    pub async fn bounded<T, F>(&self, future: F, fallback: T) -> T
    where
        F: Future<Output = T>,
    {
        maybe_with_timeout(
            &*self.inner.scheduler,
            self.inner.predicate_timeout,
            future,
            fallback,
        )
        .await
    }

    /// Installed plugin of type `P`.
    pub fn get<P: Clone + 'static>(&self) -> Option<P> {
        let type_id = TypeId::of::<P>();
        self.inner
            .installed
            .borrow()
            .iter()
            .find(|installed| installed.type_id == type_id)
            .and_then(|installed| installed.handle.downcast_ref::<P>())
            .cloned()
    }

    /// Names of installed plugins, in install order.
    pub fn plugin_names(&self) -> Vec<&'static str> {
        self.inner
            .installed
            .borrow()
            .iter()
            .map(|installed| installed.name)
            .collect()
    }
}

// ============================================================================
// PluginHost
// ============================================================================

/// Builder for [`PluginHost`].
#[derive(Default)]
pub struct PluginHostBuilder {
    router: Option<Router>,
    storage: Option<Rc<dyn Storage>>,
    scheduler: Option<Rc<dyn Scheduler>>,
    navigator_options: NavigatorOptions,
    storage_prefix: Option<String>,
    predicate_timeout: Option<Duration>,
}

impl PluginHostBuilder {
    /// Router to decorate. Required.
    #[must_use]
    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    /// Storage backend for persisted plugin state (in-memory by default).
    #[must_use]
    pub fn storage(mut self, storage: Rc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Host event loop services (a [`ManualScheduler`] by default).
    #[must_use]
    pub fn scheduler(mut self, scheduler: Rc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    #[must_use]
    pub fn navigator_options(mut self, options: NavigatorOptions) -> Self {
        self.navigator_options = options;
        self
    }

    /// Prefix of every persisted key (default `"navigator"`).
    #[must_use]
    pub fn storage_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.storage_prefix = Some(prefix.into());
        self
    }

    /// Bound every user predicate (direction override, tab and keep-alive
    /// checks) by `timeout`.
    #[must_use]
    pub fn predicate_timeout(mut self, timeout: Duration) -> Self {
        self.predicate_timeout = Some(timeout);
        self
    }

    /// Attach the navigator to the router and restore persisted details.
    pub async fn build(self) -> Result<PluginHost, PluginError> {
        let router = self.router.ok_or(PluginError::RouterMissing)?;
        let storage = self
            .storage
            .unwrap_or_else(|| Rc::new(MemoryStorage::new()));
        let scheduler = self
            .scheduler
            .unwrap_or_else(|| Rc::new(ManualScheduler::new()));
        let storage_prefix = self
            .storage_prefix
            .unwrap_or_else(|| DEFAULT_STORAGE_PREFIX.to_string());

        let mut navigator_options = self.navigator_options;
        if let (Some(timeout), None) = (self.predicate_timeout, navigator_options.timeout()) {
            navigator_options = navigator_options.predicate_timeout(timeout);
        }

        let hooks = HookBus::new();
        let details = DetailsStore::persisted(
            format!("{}:details", storage_prefix),
            Rc::clone(&storage),
        );
        details.hydrate().await;

        let navigator = Navigator::new(
            router.clone(),
            hooks.clone(),
            details,
            Rc::clone(&scheduler),
            navigator_options,
        );

        let ctx = PluginContext {
            inner: Rc::new(ContextInner {
                router,
                navigator,
                hooks,
                storage,
                scheduler,
                storage_prefix,
                predicate_timeout: self.predicate_timeout,
                installed: RefCell::new(Vec::new()),
            }),
        };
        info_log!("Plugin host ready (storage prefix '{}')", ctx.inner.storage_prefix);

        Ok(PluginHost { ctx })
    }
}

/// Composes the router, navigator and plugins.
#[derive(Debug)]
pub struct PluginHost {
    ctx: PluginContext,
}

impl PluginHost {
    pub fn builder() -> PluginHostBuilder {
        PluginHostBuilder::default()
    }

    pub fn context(&self) -> &PluginContext {
        &self.ctx
    }

    pub fn router(&self) -> &Router {
        self.ctx.router()
    }

    pub fn navigator(&self) -> &Navigator {
        self.ctx.navigator()
    }

    pub fn hooks(&self) -> &HookBus {
        self.ctx.hooks()
    }

    /// Install a plugin and return the caller's handle to it.
    pub async fn install<P>(&self, plugin: P) -> Result<P, PluginError>
    where
        P: Plugin + Clone + 'static,
    {
        let name = plugin.name();
        if self.ctx.plugin_names().contains(&name) {
            return Err(PluginError::AlreadyInstalled { plugin: name });
        }

        plugin.install(&self.ctx).await?;

        self.ctx.inner.installed.borrow_mut().push(Installed {
            type_id: TypeId::of::<P>(),
            name,
            handle: Box::new(plugin.clone()),
            plugin: Rc::new(plugin.clone()),
        });
        debug_log!("Installed plugin '{}'", name);

        let others: Vec<Rc<dyn Plugin>> = self
            .ctx
            .inner
            .installed
            .borrow()
            .iter()
            .filter(|installed| installed.name != name)
            .map(|installed| Rc::clone(&installed.plugin))
            .collect();
        for other in others {
            other.plugin_installed(&self.ctx, name);
        }
        Ok(plugin)
    }

    /// Installed plugin of type `P`.
    pub fn get<P: Clone + 'static>(&self) -> Option<P> {
        self.ctx.get::<P>()
    }

    /// Notify `cleanup`, uninstall every plugin (last installed first), drop
    /// delivered details and detach from the router.
    pub async fn teardown(&self) {
        let hooks = self.ctx.hooks();
        hooks.notify(Hook::Cleanup, HookEvent::Cleanup).await;

        let installed: Vec<Installed> = self.ctx.inner.installed.borrow_mut().drain(..).collect();
        for installed in installed.iter().rev() {
            debug_log!("Uninstalling plugin '{}'", installed.name);
            installed.plugin.uninstall(&self.ctx).await;
        }

        let navigator = self.ctx.navigator();
        navigator.clear_details().await;
        navigator.detach();
        hooks.clear();
        info_log!("Plugin host torn down");
    }
}

/// Subscribe `f` to the `cleanup` hook.
pub(crate) fn on_cleanup<F, Fut>(hooks: &HookBus, f: F) -> crate::hooks::HookId
where
    F: Fn() -> Fut + 'static,
    Fut: Future<Output = ()> + 'static,
{
    hooks.on(
        Hook::Cleanup,
        hook_fn(move |_event| {
            let done = f();
            async move {
                done.await;
                NavigationAction::Continue
            }
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::RouteRecord;
    use std::cell::Cell;

    #[derive(Clone, Default, Debug)]
    struct Counter {
        installs: Rc<Cell<u32>>,
        uninstalls: Rc<Cell<u32>>,
    }

    impl Plugin for Counter {
        fn name(&self) -> &'static str {
            "counter"
        }

        fn install<'a>(
            &'a self,
            _ctx: &'a PluginContext,
        ) -> LocalBoxFuture<'a, Result<(), PluginError>> {
            self.installs.set(self.installs.get() + 1);
            async { Ok(()) }.boxed_local()
        }

        fn uninstall<'a>(&'a self, _ctx: &'a PluginContext) -> LocalBoxFuture<'a, ()> {
            self.uninstalls.set(self.uninstalls.get() + 1);
            async {}.boxed_local()
        }
    }

    fn router() -> Router {
        Router::with_routes(vec![RouteRecord::new("/")]).unwrap()
    }

    #[test]
    fn test_router_is_required() {
        let err = pollster::block_on(PluginHost::builder().build()).unwrap_err();
        assert!(matches!(err, PluginError::RouterMissing));
    }

    #[test]
    fn test_install_get_and_teardown() {
        pollster::block_on(async {
            let host = PluginHost::builder().router(router()).build().await.unwrap();
            let counter = host.install(Counter::default()).await.unwrap();
            assert_eq!(counter.installs.get(), 1);

            let found = host.get::<Counter>().unwrap();
            assert!(Rc::ptr_eq(&found.installs, &counter.installs));

            let again = host.install(Counter::default()).await.unwrap_err();
            assert!(matches!(again, PluginError::AlreadyInstalled { plugin: "counter" }));

            host.teardown().await;
            assert_eq!(counter.uninstalls.get(), 1);
            assert!(host.get::<Counter>().is_none());
        });
    }

    #[test]
    fn test_storage_keys() {
        pollster::block_on(async {
            let host = PluginHost::builder()
                .router(router())
                .storage_prefix("app")
                .build()
                .await
                .unwrap();
            assert_eq!(host.context().storage_key("tabs"), "app:tabs");
        });
    }
}
