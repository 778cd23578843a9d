//! Location resolution through the public router

use navigator_plugins::resolve::resolve_matched;
use navigator_plugins::{PageIdentity, RouteRecord, Router};
use serde_json::json;
use std::rc::Rc;

fn paths(route: &navigator_plugins::Route) -> Vec<&str> {
    route.matched.iter().map(|r| r.path()).collect()
}

fn workspace_router() -> Router {
    Router::with_routes(vec![RouteRecord::new("/app")
        .meta("layout", json!("shell"))
        .children(vec![
            RouteRecord::new("").name("app-home"),
            RouteRecord::new("workspace/:ws").children(vec![
                RouteRecord::new("project/:project")
                    .name("project")
                    .page(PageIdentity::new("project").title("Project"))
                    .meta("layout", json!("wide")),
            ]),
        ])])
    .unwrap()
}

#[test]
fn test_nested_params_accumulate() {
    let router = workspace_router();
    let route = router.resolve("/app/workspace/abc/project/xyz");

    assert_eq!(paths(&route), vec!["/app", "workspace/:ws", "project/:project"]);
    assert_eq!(route.params.get("ws").map(String::as_str), Some("abc"));
    assert_eq!(route.params.get("project").map(String::as_str), Some("xyz"));
    assert_eq!(route.name.as_deref(), Some("project"));
    assert_eq!(route.page().map(|p| p.page_id.as_str()), Some("project"));
}

#[test]
fn test_meta_prefers_deepest_record() {
    let router = workspace_router();

    let leaf = router.resolve("/app/workspace/abc/project/xyz");
    assert_eq!(leaf.meta("layout"), Some(&json!("wide")));

    let index = router.resolve("/app");
    assert_eq!(paths(&index), vec!["/app", ""]);
    assert_eq!(index.meta("layout"), Some(&json!("shell")));
    assert_eq!(index.name.as_deref(), Some("app-home"));
}

#[test]
fn test_location_is_normalized() {
    let router = workspace_router();
    let route = router.resolve("app//workspace/abc/project/xyz/?b=2&a=1#top");

    assert_eq!(route.path, "/app/workspace/abc/project/xyz");
    assert_eq!(route.full_path, "/app/workspace/abc/project/xyz?a=1&b=2");
    assert_eq!(route.query.get("a").map(String::as_str), Some("1"));
}

#[test]
fn test_unmatched_location_keeps_path() {
    let router = workspace_router();
    let route = router.resolve("/nowhere?x=1");

    assert!(route.matched.is_empty());
    assert_eq!(route.path, "/nowhere");
    assert_eq!(route.full_path, "/nowhere?x=1");
    assert!(route.page().is_none());
}

#[test]
fn test_layout_record_matches_without_leaf_page() {
    let router = workspace_router();
    let route = router.resolve("/app/workspace/abc");

    assert_eq!(paths(&route), vec!["/app", "workspace/:ws"]);
    assert!(route.page().is_none());
    assert!(route.name.is_none());
}

#[test]
fn test_resolve_matched_shares_records() {
    let routes = vec![Rc::new(RouteRecord::new("/users/:id"))];
    let first = resolve_matched(&routes, "/users/1");
    let second = resolve_matched(&routes, "/users/2");

    assert!(Rc::ptr_eq(&first.records[0], &second.records[0]));
    assert_eq!(first.records[0].id(), second.records[0].id());
}
