//! Per-route navigation payloads.
//!
//! A payload attached to a navigation (`push_with_data` and friends) is
//! delivered to the route it lands on and kept in a persisted map keyed by
//! full path. Each entry counts its deliveries: `change_count` increases
//! exactly when a new payload replaces the entry's data, so observers can
//! tell a fresh delivery from the same value seen again.
//!
//! Entries are created lazily (the first time a page asks for its details,
//! or on the first delivery) and dropped when a backward navigation leaves
//! their route.
//!
//! # Example
//!
//! ```
//! use navigator_plugins::details::DetailsStore;
//! use navigator_plugins::route::Route;
//! use serde_json::json;
//!
//! let store = DetailsStore::in_memory();
//! let mut to = Route::start();
//! to.full_path = "/detail?id=1".into();
//!
//! pollster::block_on(async {
//!     store.commit(&to, &Route::start(), json!({ "msg": "x" })).await;
//!     let details = store.get("/detail?id=1").unwrap();
//!     assert_eq!(details.change_count, 1);
//!     assert_eq!(details.data, Some(json!({ "msg": "x" })));
//! });
//! ```

use crate::route::{Route, RouteSnapshot};
use crate::storage::{PersistedCell, Storage, SubscriptionId};
use crate::trace_log;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Payload delivered to a route.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDetails {
    /// Route the payload was sent from.
    pub from: Option<RouteSnapshot>,
    /// The payload, if one was delivered.
    pub data: Option<Value>,
    /// Number of payload deliveries to this route.
    pub change_count: u64,
}

impl RouteDetails {
    /// Deserialize the payload into `T`.
    pub fn data_as<T: DeserializeOwned>(&self) -> Option<T> {
        self.data
            .as_ref()
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}

type DetailsMap = BTreeMap<String, RouteDetails>;

/// Persisted map from full path to [`RouteDetails`].
#[derive(Debug, Clone)]
pub struct DetailsStore {
    cell: PersistedCell<DetailsMap>,
}

impl DetailsStore {
    /// Store persisted under `key`.
    pub fn persisted(key: impl Into<String>, storage: Rc<dyn Storage>) -> Self {
        Self {
            cell: PersistedCell::persisted(key, DetailsMap::new(), storage),
        }
    }

    /// Store that lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            cell: PersistedCell::new("details", DetailsMap::new()),
        }
    }

    /// Restore persisted entries, keeping deliveries made this session.
    pub async fn hydrate(&self) {
        self.cell
            .hydrate(|mut stored, session| {
                stored.extend(session);
                stored
            })
            .await;
    }

    /// Entry for a full path, if it exists.
    pub fn get(&self, key: &str) -> Option<RouteDetails> {
        self.cell.with(|map| map.get(key).cloned())
    }

    /// Entry for a full path, created empty if missing.
    pub async fn ensure(&self, key: &str) -> RouteDetails {
        if let Some(details) = self.get(key) {
            return details;
        }
        trace_log!("Creating details entry for '{}'", key);
        self.cell
            .update(|map| map.entry(key.to_string()).or_default().clone())
            .await
    }

    /// Deliver `data` to `to`, bumping its change count.
    pub async fn commit(&self, to: &Route, from: &Route, data: Value) -> RouteDetails {
        let from = from.snapshot();
        self.cell
            .update(|map| {
                let entry = map.entry(to.full_path.clone()).or_default();
                entry.from = Some(from);
                entry.data = Some(data);
                entry.change_count += 1;
                entry.clone()
            })
            .await
    }

    /// Remove the entry for a full path; returns whether one existed.
    pub async fn remove(&self, key: &str) -> bool {
        if self.get(key).is_none() {
            return false;
        }
        self.cell.update(|map| map.remove(key).is_some()).await
    }

    /// Remove every entry and the persisted copy.
    pub async fn clear(&self) {
        self.cell.clear().await;
    }

    /// Full paths that currently have an entry.
    pub fn keys(&self) -> Vec<String> {
        self.cell.with(|map| map.keys().cloned().collect())
    }

    /// Read-only view of one route's entry.
    pub fn view(&self, key: impl Into<String>) -> DetailsView {
        DetailsView {
            cell: self.cell.clone(),
            key: key.into(),
        }
    }
}

/// Read-only, reactive view of one route's details.
#[derive(Debug, Clone)]
pub struct DetailsView {
    cell: PersistedCell<DetailsMap>,
    key: String,
}

impl DetailsView {
    /// Full path this view watches.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current entry.
    pub fn get(&self) -> Option<RouteDetails> {
        self.cell.with(|map| map.get(&self.key).cloned())
    }

    /// Current payload.
    pub fn data(&self) -> Option<Value> {
        self.get().and_then(|details| details.data)
    }

    /// Current payload deserialized into `T`.
    pub fn data_as<T: DeserializeOwned>(&self) -> Option<T> {
        self.get().and_then(|details| details.data_as())
    }

    /// Current change count (0 when the entry does not exist).
    pub fn change_count(&self) -> u64 {
        self.get().map_or(0, |details| details.change_count)
    }

    /// Call `f` for every new delivery to this route.
    ///
    /// Changes that leave the change count untouched (other routes, the same
    /// value re-observed) are filtered out.
    pub fn subscribe(&self, f: impl Fn(&RouteDetails) + 'static) -> SubscriptionId {
        let key = self.key.clone();
        let last = Cell::new(self.change_count());
        self.cell.subscribe(move |map| {
            let Some(details) = map.get(&key) else {
                return;
            };
            if details.change_count != last.get() {
                last.set(details.change_count);
                f(details);
            }
        })
    }

    /// Stop receiving deliveries.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.cell.unsubscribe(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    fn route(full_path: &str) -> Route {
        let mut route = Route::start();
        route.full_path = full_path.to_string();
        route
    }

    #[test]
    fn test_change_count_strictly_increases() {
        let store = DetailsStore::in_memory();
        pollster::block_on(async {
            let mut last = 0;
            for i in 0..5 {
                let details = store.commit(&route("/a"), &route("/"), json!(i)).await;
                assert!(details.change_count > last);
                last = details.change_count;
            }
        });
        assert_eq!(store.get("/a").unwrap().data_as::<i32>(), Some(4));
    }

    #[test]
    fn test_ensure_creates_lazily() {
        let store = DetailsStore::in_memory();
        pollster::block_on(async {
            assert!(store.get("/x").is_none());
            let details = store.ensure("/x").await;
            assert_eq!(details.change_count, 0);
            assert!(details.data.is_none());
            assert!(store.remove("/x").await);
            assert!(!store.remove("/x").await);
        });
    }

    #[test]
    fn test_view_filters_same_delivery() {
        let store = DetailsStore::in_memory();
        let view = store.view("/a");
        let seen = Rc::new(RefCell::new(Vec::new()));
        {
            let seen = seen.clone();
            view.subscribe(move |details| seen.borrow_mut().push(details.change_count));
        }

        pollster::block_on(async {
            store.commit(&route("/a"), &route("/"), json!(1)).await;
            store.commit(&route("/b"), &route("/"), json!(2)).await;
            store.ensure("/a").await;
            store.commit(&route("/a"), &route("/b"), json!(3)).await;
        });

        assert_eq!(*seen.borrow(), vec![1, 2]);
        assert_eq!(view.data(), Some(json!(3)));
        assert_eq!(view.get().unwrap().from.unwrap().full_path, "/b");
    }

    #[test]
    fn test_persisted_round_trip() {
        let storage: Rc<dyn Storage> = Rc::new(crate::storage::MemoryStorage::new());
        pollster::block_on(async {
            let store = DetailsStore::persisted("nav:details", storage.clone());
            store.commit(&route("/a"), &route("/"), json!({"k": 1})).await;

            let restored = DetailsStore::persisted("nav:details", storage);
            restored.hydrate().await;
            assert_eq!(restored.get("/a").unwrap().change_count, 1);
        });
    }
}
