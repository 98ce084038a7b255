//! Lookups racing with reloads only ever see one generation.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use vhost_router::config::{ConfigStore, TomlStore};
use vhost_router::load_balancer::RequestContext;
use vhost_router::registry::ServerRegistry;
use vhost_router::routing::Router;

mod common;

const SERVERS: usize = 10;

/// Every server of generation `gen` carries the generation in its name,
/// description and backend id.
fn generation(gen: usize) -> Vec<vhost_router::config::ServerConfig> {
    (0..SERVERS)
        .map(|i| {
            let mut server = common::server(&format!("s{i}"), &[&format!("s{i}.gen{gen}.test")]);
            server.description = format!("gen{gen}");
            server.backends = vec![common::backend(&format!("s{i}-gen{gen}"), 1)];
            server
        })
        .collect()
}

fn generation_of(text: &str) -> &str {
    text.rsplit("gen").next().unwrap_or_default().split('.').next().unwrap_or_default()
}

#[test]
fn test_find_by_id_during_reload() {
    let registry = ServerRegistry::default();
    registry.load_from(generation(0)).unwrap();

    let stop = AtomicBool::new(false);
    let checked = AtomicUsize::new(0);

    std::thread::scope(|s| {
        for t in 0..50 {
            let registry = &registry;
            let stop = &stop;
            let checked = &checked;
            s.spawn(move || {
                let id = format!("s{}", t % SERVERS);
                while !stop.load(Ordering::Acquire) {
                    let server = registry.find_by_id(&id).expect("server present in every generation");
                    let config = server.config();
                    let gen = generation_of(&config.description);
                    assert_eq!(config.id, id);
                    assert_eq!(generation_of(&config.name[0]), gen, "name/description mismatch");
                    let backend = server.pool().candidates()[0].id.clone();
                    assert_eq!(generation_of(&backend), gen, "pool from another generation");
                    checked.fetch_add(1, Ordering::Relaxed);
                }
            });
        }

        for gen in 1..=30 {
            registry.load_from(generation(gen)).unwrap();
        }
        stop.store(true, Ordering::Release);
    });

    assert_eq!(registry.version(), 31);
    assert!(checked.load(Ordering::Relaxed) > 0);
}

#[test]
fn test_router_sees_one_snapshot_per_request() {
    let registry = Arc::new(ServerRegistry::default());
    registry.load_from(generation(0)).unwrap();
    let router = Router::new(registry.clone());
    let stop = AtomicBool::new(false);

    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                let ctx = RequestContext::new();
                while !stop.load(Ordering::Acquire) {
                    let version = registry.version() as usize;
                    for gen in [version.saturating_sub(1), version] {
                        let host = format!("s3.gen{gen}.test");
                        if let Some(decision) = router.route(&host, "/", &ctx) {
                            let candidate = decision.candidate.unwrap();
                            assert_eq!(generation_of(&candidate.id), generation_of(&decision.name.pattern));
                        }
                    }
                }
            });
        }

        for gen in 1..=20 {
            registry.load_from(generation(gen)).unwrap();
        }
        stop.store(true, Ordering::Release);
    });
}

#[test]
fn test_reload_from_store_picks_up_changes() {
    let dir = tempfile::tempdir().unwrap();
    common::write_server(dir.path(), "a.proxy.toml", &common::server("a", &["a.test"]));

    let store = Arc::new(TomlStore::new(dir.path()));
    let registry = ServerRegistry::default().with_store(store.clone());
    assert_eq!(registry.reload().unwrap(), 1);
    assert!(registry.find_by_host("a.test").is_some());

    let pool = registry.find_backend_pool("a", None, false).unwrap();
    assert!(pool.mark_down("a-web"));

    common::write_server(dir.path(), "b.proxy.toml", &common::server("b", &["b.test"]));
    assert_eq!(registry.reload().unwrap(), 2);
    assert!(registry.find_by_host("b.test").is_some());

    let pool = registry.find_backend_pool("a", None, false).unwrap();
    assert!(pool.find_candidate("a-web").unwrap().is_down(), "health lost on reload");

    // A second document claiming id `a` makes the set invalid; the old snapshot stays.
    common::write_server(dir.path(), "dup.proxy.toml", &common::server("a", &["dup.test"]));
    assert_eq!(store.load_server_configs().unwrap().len(), 3);
    assert!(registry.reload().is_err());
    assert_eq!(registry.version(), 2);
    assert!(registry.find_by_host("dup.test").is_none());
}
