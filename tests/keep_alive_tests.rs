//! Integration tests for the keep-alive cache

mod common;

use common::*;
use navigator_plugins::keep_alive::record_predicate;
use navigator_plugins::*;
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

#[test]
fn test_auto_mode_follows_direction() {
    pollster::block_on(async {
        let fx = fixture().await;
        let keep_alive = fx.host.install(KeepAlive::default()).await.unwrap();

        fx.go_to("/list").await;
        fx.go_to("/detail?id=1").await;
        fx.go_to("/a").await;
        assert_eq!(keep_alive.names(), vec!["ListPage", "DetailPage"]);

        fx.navigator().back().await.unwrap();
        assert_eq!(keep_alive.names(), vec!["ListPage", "DetailPage"]);

        fx.navigator().back().await.unwrap();
        assert_eq!(keep_alive.names(), vec!["ListPage"]);

        fx.navigator().replace("/settings").await.unwrap();
        assert_eq!(keep_alive.names(), vec!["ListPage", "Settings"]);
    });
}

#[test]
fn test_predicates_filter_records() {
    pollster::block_on(async {
        let fx = fixture().await;
        let options = KeepAliveOptions::new()
            .before_route_add(record_predicate(|record| async move {
                record.path() != "/detail"
            }))
            .before_route_remove(record_predicate(|record| async move {
                record.path() != "/list"
            }));
        let keep_alive = fx.host.install(KeepAlive::new(options)).await.unwrap();

        fx.go_to("/settings").await;
        fx.go_to("/detail").await;
        assert_eq!(keep_alive.names(), vec!["Settings"]);

        fx.go_to("/list").await;
        fx.navigator().go(-2).await.unwrap();
        assert_eq!(fx.navigator().current_route().path, "/settings");
        assert_eq!(keep_alive.names(), vec!["Settings", "ListPage"]);
    });
}

#[test]
fn test_manual_mode_ignores_navigation() {
    pollster::block_on(async {
        let fx = fixture().await;
        let keep_alive = fx
            .host
            .install(KeepAlive::new(KeepAliveOptions::new().manual()))
            .await
            .unwrap();

        fx.go_to("/list").await;
        assert!(keep_alive.names().is_empty());

        keep_alive.add("ListPage");
        fx.go_to("/settings").await;
        assert_eq!(keep_alive.names(), vec!["ListPage"]);
    });
}

#[test]
fn test_lazy_component_loaded_once() {
    pollster::block_on(async {
        let loads = Rc::new(Cell::new(0));
        let router = {
            let loads = loads.clone();
            Router::with_routes(vec![
                RouteRecord::new("/lazy").lazy_component(move || {
                    loads.set(loads.get() + 1);
                    async { "LazyPage".to_string() }
                }),
                RouteRecord::new("/other"),
            ])
            .unwrap()
        };
        let host = PluginHost::builder().router(router).build().await.unwrap();
        let keep_alive = host.install(KeepAlive::default()).await.unwrap();

        for location in ["/lazy", "/other", "/lazy", "/other", "/lazy"] {
            host.navigator().push(location).await.unwrap();
        }

        assert_eq!(keep_alive.names(), vec!["LazyPage"]);
        assert_eq!(loads.get(), 1);
        assert_eq!(keep_alive.memo_stats().misses, 2);
    });
}

#[test]
fn test_stale_entries_are_evicted() {
    pollster::block_on(async {
        let fx = fixture().await;
        let options = KeepAliveOptions::new().stale_after(Duration::from_millis(100));
        let keep_alive = fx.host.install(KeepAlive::new(options)).await.unwrap();
        assert_eq!(fx.scheduler.pending_timers(), 1);

        fx.go_to("/list").await;
        fx.scheduler.advance(Duration::from_millis(50));
        fx.go_to("/detail").await;

        fx.scheduler.advance(Duration::from_millis(60));
        assert_eq!(keep_alive.names(), vec!["DetailPage"]);

        fx.scheduler.advance(Duration::from_millis(100));
        assert!(keep_alive.names().is_empty());
        assert_eq!(fx.scheduler.pending_timers(), 1);

        fx.host.teardown().await;
        assert_eq!(fx.scheduler.pending_timers(), 0);
    });
}

#[test]
fn test_subscribers_see_every_change() {
    pollster::block_on(async {
        let fx = fixture().await;
        let keep_alive = fx.host.install(KeepAlive::default()).await.unwrap();
        let changes = Rc::new(Cell::new(0));
        {
            let changes = changes.clone();
            keep_alive.subscribe(move |_| changes.set(changes.get() + 1));
        }

        fx.go_to("/list").await;
        fx.go_to("/a").await;
        fx.go_to("/list").await;
        fx.navigator().back().await.unwrap();

        // Added, refreshed without a change, then removed.
        assert_eq!(changes.get(), 2);
        assert!(keep_alive.names().is_empty());
    });
}
