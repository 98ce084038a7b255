//! Virtual-host router: server/location matching and backend scheduling.

pub mod config;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;
pub mod registry;
pub mod routing;

pub use config::schema::RouterConfig;
pub use lifecycle::Shutdown;
pub use registry::ServerRegistry;
pub use routing::Router;
