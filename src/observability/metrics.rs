//! Metrics collection.
//!
//! # Metrics
//! - `router_backend_picks_total` (counter): selections by pool, backend
//! - `router_backend_unavailable_total` (counter): picks that found no candidate
//! - `router_backend_health` (gauge): 1=up, 0=down
//! - `router_registry_reloads_total` (counter): reloads by outcome

use metrics::{counter, gauge};

pub fn record_pick(pool: &str, backend: &str) {
    counter!(
        "router_backend_picks_total",
        "pool" => pool.to_string(),
        "backend" => backend.to_string()
    )
    .increment(1);
}

pub fn record_unavailable(pool: &str) {
    counter!("router_backend_unavailable_total", "pool" => pool.to_string()).increment(1);
}

pub fn record_backend_health(pool: &str, backend: &str, up: bool) {
    gauge!(
        "router_backend_health",
        "pool" => pool.to_string(),
        "backend" => backend.to_string()
    )
    .set(if up { 1.0 } else { 0.0 });
}

pub fn record_reload(success: bool) {
    let outcome = if success { "success" } else { "rejected" };
    counter!("router_registry_reloads_total", "outcome" => outcome).increment(1);
}
