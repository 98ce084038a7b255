//! Host → server → location → candidate, from TOML documents.

use std::sync::Arc;

use vhost_router::config::ServerConfig;
use vhost_router::load_balancer::RequestContext;
use vhost_router::registry::ServerRegistry;
use vhost_router::routing::Router;

const SHOP: &str = r#"
id = "shop"
name = ["shop.example.com", "*.shop.example.com"]
listen = ["0.0.0.0:80"]

[scheduling]
code = "roundRobin"

[[backends]]
id = "web-1"
address = "10.0.0.1:8080"

[[backends]]
id = "web-2"
address = "10.0.0.2:8080"

[websocket]
[[websocket.backends]]
id = "push"
address = "10.0.1.1:9000"

[[locations]]
id = "login"
pattern = "=* /Login"

[[locations.backends]]
id = "auth"
address = "10.0.2.1:8080"

[[locations]]
id = "api"
pattern = "~ ^/api/(?P<version>v[0-9]+)/"

[[locations.backends]]
id = "api-1"
address = "10.0.3.1:8080"
weight = 3

[[locations.backends]]
id = "api-2"
address = "10.0.3.2:8080"
max_fails = 1

[[locations]]
id = "not-admin"
pattern = "!* /admin"
"#;

const FALLBACK: &str = r#"
id = "fallback"
name = ["*.example.com"]

[[backends]]
id = "default"
address = "10.9.9.9:80"
"#;

fn router() -> Router {
    let servers: Vec<ServerConfig> = [SHOP, FALLBACK]
        .iter()
        .map(|doc| toml::from_str(doc).unwrap())
        .collect();
    let registry = ServerRegistry::default();
    registry.load_from(servers).unwrap();
    Router::new(Arc::new(registry))
}

#[test]
fn test_exact_case_insensitive_location() {
    let decision = router()
        .route("shop.example.com", "/LOGIN", &RequestContext::new())
        .unwrap();
    assert_eq!(decision.location_id(), Some("login"));
    assert_eq!(decision.candidate.unwrap().id, "auth");
}

#[test]
fn test_regex_location_with_capture() {
    let decision = router()
        .route("www.shop.example.com:8443", "/api/v2/orders", &RequestContext::new())
        .unwrap();
    assert_eq!(decision.server.id(), "shop");
    assert_eq!(decision.name.requested, "www.shop.example.com");
    assert_eq!(decision.name.pattern, "*.shop.example.com");
    assert_eq!(decision.location_id(), Some("api"));
    assert_eq!(decision.location.unwrap().params["version"], "v2");
    assert_eq!(decision.pool.summary().code, "roundRobin");
}

#[test]
fn test_reverse_location_and_server_pool() {
    let router = router();
    let ctx = RequestContext::new();

    let decision = router.route("shop.example.com", "/catalog", &ctx).unwrap();
    assert_eq!(decision.location_id(), Some("not-admin"));
    assert_eq!(decision.pool.name(), "shop");

    let decision = router.route("shop.example.com", "/Admin/users", &ctx).unwrap();
    assert!(decision.location.is_none());
    let picked = decision.candidate.unwrap();
    assert!(picked.id.starts_with("web-"));
}

#[test]
fn test_websocket_requests_use_websocket_pool() {
    let decision = router()
        .route("shop.example.com", "/catalog", &RequestContext::new().websocket(true))
        .unwrap();
    assert_eq!(decision.candidate.unwrap().id, "push");
}

#[test]
fn test_server_order_decides_between_wildcards() {
    let router = router();
    let ctx = RequestContext::new();

    let decision = router.route("blog.example.com", "/", &ctx).unwrap();
    assert_eq!(decision.server.id(), "fallback");
    assert_eq!(decision.name.literal(), None);

    assert!(router.route("example.org", "/", &ctx).is_none());
    assert!(router.route("a.b.shop.example.com", "/", &ctx).is_none());
}

#[test]
fn test_failures_take_location_backend_down() {
    let router = router();
    let ctx = RequestContext::new();

    let pool = router
        .registry()
        .find_backend_pool("shop", Some("api"), false)
        .unwrap();
    assert_eq!(pool.report_failure("api-2"), Some(vhost_router::load_balancer::HealthTransition::BecameDown));

    for _ in 0..20 {
        let decision = router.route("shop.example.com", "/api/v1/x", &ctx).unwrap();
        assert_eq!(decision.candidate.unwrap().id, "api-1");
    }

    assert!(pool.mark_up("api-2"));
    let seen: std::collections::HashSet<String> = (0..20)
        .map(|_| {
            router
                .route("shop.example.com", "/api/v1/x", &ctx)
                .unwrap()
                .candidate
                .unwrap()
                .id
                .clone()
        })
        .collect();
    assert_eq!(seen.len(), 2);
}
