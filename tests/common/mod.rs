//! Test utilities for navigator plugin tests
//!
//! Provides a route table, host builders and recording helpers shared by the
//! integration tests.

#![allow(dead_code)]

use navigator_plugins::hooks::{Hook, HookEvent};
use navigator_plugins::scheduler::ManualScheduler;
use navigator_plugins::storage::MemoryStorage;
use navigator_plugins::*;
use std::cell::RefCell;
use std::rc::Rc;

/// Install `env_logger` once; repeated calls are ignored.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Route table used across tests.
///
/// | Path        | Page       | Flags                 | Component    |
/// |-------------|------------|-----------------------|--------------|
/// | `/home`     | `home`     | affix, keep-alive     | `HomePage`   |
/// | `/list`     | `list`     | keep-alive            | `ListPage`   |
/// | `/detail`   | `detail`   |                       | `DetailPage` |
/// | `/order`    | `order`    | uniq                  | `OrderPage`  |
/// | `/settings` | `settings` |                       | `Settings`   |
/// | `/a` `/b` `/c` | none    |                       |              |
pub fn app_routes() -> Vec<RouteRecord> {
    vec![
        RouteRecord::new("/home")
            .page(PageIdentity::new("home").title("Home").affix().keep_alive())
            .component("HomePage"),
        RouteRecord::new("/list")
            .page(PageIdentity::new("list").title("List").keep_alive())
            .component("ListPage"),
        RouteRecord::new("/detail")
            .page(PageIdentity::new("detail").title("Detail"))
            .component("DetailPage"),
        RouteRecord::new("/order")
            .page(PageIdentity::new("order").title("Order").uniq())
            .component("OrderPage"),
        RouteRecord::new("/settings")
            .page(PageIdentity::new("settings").title("Settings"))
            .component("Settings"),
        RouteRecord::new("/a"),
        RouteRecord::new("/b"),
        RouteRecord::new("/c"),
        RouteRecord::new("/login"),
        RouteRecord::new("/forbidden"),
        RouteRecord::new("/account").requires_auth(),
        RouteRecord::new("/beta").requires_feature("beta"),
    ]
}

pub fn app_router() -> Router {
    Router::with_routes(app_routes()).expect("valid route table")
}

/// Everything a test needs to drive a host.
pub struct Fixture {
    pub host: PluginHost,
    pub scheduler: ManualScheduler,
    pub storage: Rc<MemoryStorage>,
}

impl Fixture {
    pub fn navigator(&self) -> &Navigator {
        self.host.navigator()
    }

    /// Push `location`, panicking on failure.
    pub async fn go_to(&self, location: &str) -> Route {
        self.host
            .navigator()
            .push(location)
            .await
            .unwrap_or_else(|e| panic!("push '{}' failed: {}", location, e))
    }
}

/// Host over [`app_routes`] with fresh storage.
pub async fn fixture() -> Fixture {
    fixture_with_storage(Rc::new(MemoryStorage::new())).await
}

/// Host over [`app_routes`] sharing `storage`.
pub async fn fixture_with_storage(storage: Rc<MemoryStorage>) -> Fixture {
    init_logging();
    let scheduler = ManualScheduler::new();
    let host = PluginHost::builder()
        .router(app_router())
        .storage(storage.clone())
        .scheduler(Rc::new(scheduler.clone()))
        .build()
        .await
        .expect("host builds");
    Fixture {
        host,
        scheduler,
        storage,
    }
}

/// Record the names of every emitted navigation hook.
pub fn record_hooks(hooks: &HookBus, names: &[Hook]) -> Rc<RefCell<Vec<String>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    for hook in names {
        let log = log.clone();
        let hook = *hook;
        hooks.on_sync(hook, move |event: &HookEvent| {
            let target = event
                .navigation()
                .map(|nav| nav.to.full_path.clone())
                .unwrap_or_default();
            log.borrow_mut().push(format!("{} {}", hook.name(), target));
        });
    }
    log
}

/// Ids of the open tabs, in order.
pub fn tab_ids(tabs: &navigator_plugins::tabs::Tabs) -> Vec<String> {
    tabs.tabs()
        .expect("tabs installed")
        .into_iter()
        .map(|tab| tab.id)
        .collect()
}
