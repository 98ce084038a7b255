//! Shared builders for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;

use vhost_router::config::{BackendConfig, LocationConfig, ServerConfig};
use vhost_router::load_balancer::{BackendPool, RequestContext};

pub fn backend(id: &str, weight: u32) -> BackendConfig {
    BackendConfig {
        id: id.to_string(),
        address: format!("{id}.internal:8080"),
        weight,
        ..BackendConfig::default()
    }
}

pub fn location(id: &str, pattern: &str) -> LocationConfig {
    LocationConfig {
        id: id.to_string(),
        pattern: pattern.to_string(),
        ..LocationConfig::default()
    }
}

pub fn server(id: &str, names: &[&str]) -> ServerConfig {
    let mut server = ServerConfig {
        id: id.to_string(),
        ..ServerConfig::default()
    };
    server.add_name(names.iter().copied());
    server.add_listen("0.0.0.0:8080");
    server.add_backend(backend(&format!("{id}-web"), 1));
    server
}

/// Write `server` as TOML under `dir/file`.
pub fn write_server(dir: &Path, file: &str, server: &ServerConfig) {
    let content = toml::to_string_pretty(server).unwrap();
    std::fs::write(dir.join(file), content).unwrap();
}

/// Pick `n` times and count the picks per candidate id.
pub fn tally(pool: &BackendPool, n: usize) -> HashMap<String, usize> {
    let ctx = RequestContext::new();
    let mut counts = HashMap::new();
    for _ in 0..n {
        let picked = pool.pick_next(&ctx).expect("pool has a candidate");
        *counts.entry(picked.id.clone()).or_insert(0) += 1;
    }
    counts
}
