//! Integration tests for direction classification and payload delivery

mod common;

use common::*;
use navigator_plugins::guards::guard_fn;
use navigator_plugins::hooks::{hook_fn, Hook};
use navigator_plugins::*;
use futures::channel::oneshot;
use serde_json::json;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[test]
fn test_direction_follows_history_cursor() {
    pollster::block_on(async {
        let fx = fixture().await;
        let nav = fx.navigator();

        let mut seen = Vec::new();
        fx.go_to("/a").await;
        seen.push(nav.direction());
        fx.go_to("/b").await;
        seen.push(nav.direction());
        fx.go_to("/c").await;
        seen.push(nav.direction());
        nav.back().await.unwrap();
        seen.push(nav.direction());
        nav.go(-1).await.unwrap();
        seen.push(nav.direction());
        nav.forward().await.unwrap();
        seen.push(nav.direction());
        nav.replace("/settings").await.unwrap();
        seen.push(nav.direction());

        assert_eq!(
            seen,
            vec![
                Direction::Forward,
                Direction::Forward,
                Direction::Forward,
                Direction::Backward,
                Direction::Backward,
                Direction::Forward,
                Direction::Unchanged,
            ]
        );
        assert_eq!(nav.cursor(), Some(1));
        assert_eq!(nav.current_route().path, "/settings");
    });
}

#[test]
fn test_hooks_fire_in_order() {
    pollster::block_on(async {
        let fx = fixture().await;
        let log = record_hooks(
            fx.host.hooks(),
            &[
                Hook::Direction,
                Hook::Forward,
                Hook::Backward,
                Hook::DirectionEnd,
                Hook::ForwardEnd,
                Hook::BackwardEnd,
            ],
        );

        fx.go_to("/a").await;
        fx.go_to("/b").await;
        fx.navigator().back().await.unwrap();

        let log = log.borrow();
        assert_eq!(
            log[log.len() - 4..],
            [
                "router:direction /a".to_string(),
                "router:backward /a".to_string(),
                "router:direction:end /a".to_string(),
                "router:backward:end /a".to_string(),
            ]
        );
        assert_eq!(log.len(), 12);
    });
}

#[test]
fn test_start_hook_veto_aborts_navigation() {
    pollster::block_on(async {
        let fx = fixture().await;
        fx.go_to("/a").await;

        fx.host.hooks().on(
            Hook::Forward,
            hook_fn(|event| async move {
                match event.navigation() {
                    Some(nav) if nav.to.path == "/b" => NavigationAction::deny("no /b"),
                    _ => NavigationAction::Continue,
                }
            }),
        );
        let ends = record_hooks(fx.host.hooks(), &[Hook::DirectionEnd]);

        let err = fx.navigator().push("/b").await.unwrap_err();
        assert!(err.is_aborted());
        assert_eq!(fx.navigator().current_route().path, "/a");
        assert_eq!(fx.navigator().cursor(), Some(0));
        assert!(ends.borrow().is_empty());

        fx.go_to("/c").await;
        assert_eq!(ends.borrow().len(), 1);
    });
}

#[test]
fn test_payload_delivered_and_removed_on_backward() {
    pollster::block_on(async {
        let fx = fixture().await;
        let nav = fx.navigator();

        fx.go_to("/list").await;
        nav.push_with_data("/detail?id=1", json!({ "msg": "x" }))
            .await
            .unwrap();

        let details = nav.details("/detail?id=1").expect("details delivered");
        assert_eq!(details.data.as_ref().unwrap()["msg"], "x");
        assert_eq!(details.change_count, 1);
        assert_eq!(details.from.as_ref().unwrap().full_path, "/list");

        nav.back().await.unwrap();
        assert_eq!(nav.direction(), Direction::Backward);
        assert!(nav.details("/detail?id=1").is_none());
    });
}

#[test]
fn test_change_count_increases_per_delivery() {
    pollster::block_on(async {
        let fx = fixture().await;
        let nav = fx.navigator();

        fx.go_to("/list").await;
        nav.push_with_data("/detail?id=1", json!(1)).await.unwrap();

        let view = nav.use_details().await;
        let seen = Rc::new(RefCell::new(Vec::new()));
        {
            let seen = seen.clone();
            view.subscribe(move |details| seen.borrow_mut().push(details.change_count));
        }

        fx.go_to("/a").await;
        nav.push_with_data("/detail?id=1", json!(2)).await.unwrap();
        fx.go_to("/b").await;
        nav.push_with_data("/detail?id=1", json!(3)).await.unwrap();

        assert_eq!(view.change_count(), 3);
        assert_eq!(view.data(), Some(json!(3)));
        assert_eq!(*seen.borrow(), vec![2, 3]);
    });
}

#[test]
fn test_details_hook_carries_payload() {
    pollster::block_on(async {
        let fx = fixture().await;
        let delivered = Rc::new(RefCell::new(Vec::new()));
        {
            let delivered = delivered.clone();
            fx.host.hooks().on_sync(Hook::Details, move |event| {
                if let HookEvent::Details { to, details } = event {
                    delivered
                        .borrow_mut()
                        .push((to.full_path.clone(), details.data.clone()));
                }
            });
        }

        fx.go_to("/a").await;
        fx.navigator()
            .push_with_data("/b", json!({ "id": 7 }))
            .await
            .unwrap();

        assert_eq!(
            *delivered.borrow(),
            vec![("/b".to_string(), Some(json!({ "id": 7 })))]
        );
    });
}

#[test]
fn test_second_payload_overwrites_first() {
    pollster::block_on(async {
        let fx = fixture().await;
        let nav = fx.navigator();
        fx.go_to("/list").await;

        let first = nav.push_with_data("/a", json!("a"));
        let second = nav.push_with_data("/b", json!("b"));
        let (first, second) = futures::join!(first, second);
        assert_eq!(first.unwrap().path, "/a");
        assert_eq!(second.unwrap().path, "/b");

        assert!(nav.details("/a").is_none());
        assert_eq!(nav.details("/b").unwrap().data, Some(json!("b")));
        assert_eq!(nav.details_store().keys(), vec!["/b".to_string()]);
        assert!(!nav.has_pending_payload());
    });
}

/// Park navigations to a path in a `before_resolve` guard until released.
fn gate(fx: &Fixture, path: &str) -> oneshot::Sender<()> {
    let (release, gate) = oneshot::channel::<()>();
    let path = path.to_string();
    let gate = Rc::new(RefCell::new(Some(gate)));
    fx.host.router().before_resolve(guard_fn(move |to, _from| {
        let gate = if to.path == path {
            gate.borrow_mut().take()
        } else {
            None
        };
        async move {
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            NavigationAction::Continue
        }
    }));
    release
}

#[test]
fn test_cancelled_navigation_keeps_newer_payload() {
    pollster::block_on(async {
        let fx = fixture().await;
        let nav = fx.navigator();
        fx.go_to("/list").await;
        let release_a = gate(&fx, "/a");
        let release_b = gate(&fx, "/b");

        let mut first = nav.push_with_data("/a", json!("a"));
        assert!(futures::poll!(&mut first).is_pending());
        let mut second = nav.push_with_data("/b", json!("b"));
        assert!(futures::poll!(&mut second).is_pending());

        // The older navigation settles first, as cancelled.
        release_a.send(()).unwrap();
        assert!(first.await.unwrap_err().is_cancelled());
        assert!(nav.has_pending_payload());

        release_b.send(()).unwrap();
        assert_eq!(second.await.unwrap().path, "/b");
        assert_eq!(nav.details("/b").unwrap().data, Some(json!("b")));
        assert!(nav.details("/a").is_none());
        assert!(!nav.has_pending_payload());
    });
}

#[test]
fn test_payload_follows_guard_redirect() {
    pollster::block_on(async {
        let fx = fixture().await;
        let nav = fx.navigator();
        fx.go_to("/list").await;
        fx.host.router().before_each(guard_fn(|to, _from| async move {
            if to.path == "/a" {
                NavigationAction::redirect("/b")
            } else {
                NavigationAction::Continue
            }
        }));

        let route = nav.push_with_data("/a", json!({ "moved": true })).await.unwrap();
        assert_eq!(route.path, "/b");
        assert_eq!(nav.details("/b").unwrap().data, Some(json!({ "moved": true })));
        assert!(!nav.has_pending_payload());
    });
}

#[test]
fn test_failed_navigation_drops_payload() {
    pollster::block_on(async {
        let fx = fixture().await;
        let nav = fx.navigator();
        fx.go_to("/list").await;

        let err = nav
            .push_with_data("/list", json!("stale"))
            .await
            .unwrap_err();
        assert!(err.is_duplicated());
        assert!(!nav.has_pending_payload());
        assert!(nav.details("/list").is_none());

        fx.go_to("/a").await;
        assert!(nav.details("/a").is_none());
    });
}

#[test]
fn test_back_with_data_delivers_to_previous_entry() {
    pollster::block_on(async {
        let fx = fixture().await;
        let nav = fx.navigator();
        fx.go_to("/list").await;
        fx.go_to("/detail?id=3").await;

        nav.back_with_data(json!({ "saved": true })).await.unwrap();

        assert_eq!(nav.current_route().path, "/list");
        let details = nav.details("/list").unwrap();
        assert_eq!(details.data, Some(json!({ "saved": true })));
        assert_eq!(details.from.unwrap().full_path, "/detail?id=3");
    });
}

#[test]
fn test_before_once_runs_once_per_navigation() {
    pollster::block_on(async {
        let fx = fixture().await;
        let calls = Rc::new(Cell::new(0));
        {
            let calls = calls.clone();
            fx.navigator().before_once(guard_fn(move |to, _from| {
                calls.set(calls.get() + 1);
                async move {
                    if to.path == "/detail" {
                        NavigationAction::redirect("/list")
                    } else {
                        NavigationAction::Continue
                    }
                }
            }));
        }

        fx.go_to("/a").await;
        assert_eq!(calls.get(), 1);

        let route = fx.go_to("/detail").await;
        assert_eq!(route.path, "/list");
        assert_eq!(calls.get(), 2);

        fx.go_to("/b").await;
        assert_eq!(calls.get(), 3);
    });
}

#[test]
fn test_teardown_clears_details() {
    pollster::block_on(async {
        let fx = fixture().await;
        let cleanups = Rc::new(Cell::new(0));
        {
            let cleanups = cleanups.clone();
            fx.host
                .hooks()
                .on_sync(Hook::Cleanup, move |_| cleanups.set(cleanups.get() + 1));
        }

        fx.go_to("/a").await;
        fx.navigator()
            .push_with_data("/b", json!(1))
            .await
            .unwrap();
        assert!(fx.storage.contains_key("navigator:details"));

        fx.host.teardown().await;
        assert_eq!(cleanups.get(), 1);
        assert!(fx.navigator().details("/b").is_none());
        assert!(!fx.storage.contains_key("navigator:details"));

        // Detached: the router still navigates, nothing is delivered.
        fx.navigator().push_with_data("/c", json!(2)).await.unwrap();
        assert!(fx.navigator().details("/c").is_none());
    });
}

#[tokio::test(flavor = "current_thread")]
async fn test_details_survive_host_restart() {
    let storage = Rc::new(navigator_plugins::storage::MemoryStorage::new());
    {
        let fx = fixture_with_storage(storage.clone()).await;
        fx.go_to("/a").await;
        fx.navigator()
            .push_with_data("/b", json!({ "kept": 1 }))
            .await
            .unwrap();
    }

    let fx = fixture_with_storage(storage).await;
    let details = fx.navigator().details("/b").expect("hydrated from storage");
    assert_eq!(details.data, Some(json!({ "kept": 1 })));
    assert_eq!(details.change_count, 1);
}
