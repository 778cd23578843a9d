//! Integration tests for transition selection

mod common;

use common::*;
use navigator_plugins::transition::{SlideDirection, Transition, TransitionPlugin};
use navigator_plugins::*;
use serde_json::json;

#[test]
fn test_transition_follows_direction() {
    pollster::block_on(async {
        let fx = fixture().await;
        let transition = fx.host.install(TransitionPlugin::default()).await.unwrap();
        assert_eq!(transition.current(), Transition::None);

        fx.go_to("/a").await;
        assert_eq!(transition.current(), Transition::slide(SlideDirection::Left, 300));

        fx.go_to("/b").await;
        fx.navigator().back().await.unwrap();
        assert_eq!(transition.current(), Transition::slide(SlideDirection::Right, 300));

        fx.navigator().replace("/c").await.unwrap();
        assert_eq!(transition.current(), Transition::fade(200));
    });
}

#[test]
fn test_transition_meta_overrides_direction() {
    pollster::block_on(async {
        let router = Router::with_routes(vec![
            RouteRecord::new("/a"),
            RouteRecord::new("/modal").meta("transition", json!("fade")),
        ])
        .unwrap();
        let host = PluginHost::builder().router(router).build().await.unwrap();
        let transition = host.install(TransitionPlugin::default()).await.unwrap();

        host.navigator().push("/a").await.unwrap();
        host.navigator().push("/modal").await.unwrap();
        assert_eq!(transition.current().name(), "fade");
    });
}
