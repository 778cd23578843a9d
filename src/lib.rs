//! # navigator-plugins
//!
//! Direction-aware plugins for an in-memory history router.
//!
//! A [`Router`] resolves locations against nested [`RouteRecord`]s and runs
//! async guards. A [`Navigator`] wraps it, classifies every navigation as
//! forward, backward or unchanged, publishes that on a [`HookBus`] and
//! delivers data payloads to the target route. Plugins installed into a
//! [`PluginHost`] subscribe to those hooks:
//!
//! | Plugin             | Module          | Feature      |
//! |--------------------|-----------------|--------------|
//! | [`Tabs`]           | [`tabs`]        | always       |
//! | [`KeepAlive`]      | [`keep_alive`]  | always       |
//! | `Scroll`           | `scroll`        | `scroll`     |
//! | `TransitionPlugin` | `transition`    | `transition` |
//! | `TokenAuth`, `FeatureAuth` | `auth`  | `auth`       |
//!
//! Everything is single-threaded: handles are cheap `Rc` clones and futures
//! are `!Send`. Drive them with any local executor.
//!
//! # Example
//!
//! ```
//! use navigator_plugins::{Direction, PageIdentity, PluginHost, RouteRecord, Router};
//! use serde_json::json;
//!
//! let router = Router::with_routes(vec![
//!     RouteRecord::new("/list").page(PageIdentity::new("list")),
//!     RouteRecord::new("/detail").page(PageIdentity::new("detail")),
//! ])
//! .unwrap();
//!
//! pollster::block_on(async {
//!     let host = PluginHost::builder().router(router).build().await.unwrap();
//!     let navigator = host.navigator();
//!
//!     navigator.push("/list").await.unwrap();
//!     navigator.push_with_data("/detail?id=1", json!({ "msg": "x" })).await.unwrap();
//!     assert_eq!(navigator.direction(), Direction::Forward);
//!
//!     let details = navigator.details("/detail?id=1").unwrap();
//!     assert_eq!(details.data.unwrap()["msg"], "x");
//!     assert_eq!(details.change_count, 1);
//! });
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod logging;

pub mod cache;
pub mod details;
pub mod direction;
pub mod error;
pub mod guards;
pub mod history;
pub mod hooks;
pub mod keep_alive;
pub mod navigator;
pub mod params;
pub mod plugin;
pub mod resolve;
pub mod route;
pub mod router;
pub mod scheduler;
pub mod storage;
pub mod tabs;

#[cfg(feature = "auth")]
#[cfg_attr(docsrs, doc(cfg(feature = "auth")))]
pub mod auth;
#[cfg(feature = "scroll")]
#[cfg_attr(docsrs, doc(cfg(feature = "scroll")))]
pub mod scroll;
#[cfg(feature = "transition")]
#[cfg_attr(docsrs, doc(cfg(feature = "transition")))]
pub mod transition;

pub use details::{DetailsStore, DetailsView, RouteDetails};
pub use direction::{classify, Direction};
pub use error::{NavigationFailure, PluginError, RouterError, StorageError};
pub use guards::{guard_fn, NavigationAction};
pub use hooks::{hook_fn, Hook, HookBus, HookEvent};
pub use keep_alive::{KeepAlive, KeepAliveOptions};
pub use navigator::{Navigator, NavigatorOptions};
pub use params::{QueryParams, RouteParams};
pub use plugin::{Plugin, PluginContext, PluginHost};
pub use route::{NavigationType, PageIdentity, Route, RouteRecord};
pub use router::{NavigationResult, Router};
pub use scheduler::{ManualScheduler, Scheduler};
pub use storage::{FileStorage, MemoryStorage, PersistedCell, Storage};
pub use tabs::{TabRecord, Tabs, TabsOptions};
