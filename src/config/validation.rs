//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check identifiers: present, unique within their scope
//! - Check that scheduling codes are registered and location patterns compile
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function over the parsed documents
//! - Runs before a server is activated in the registry

use std::collections::HashSet;

use thiserror::Error;

use crate::config::schema::{BackendConfig, SchedulingConfig, ServerConfig, WebsocketConfig};
use crate::load_balancer::registry;
use crate::routing::location::{CompiledPattern, PatternError};

/// A single semantic problem in a server document.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("server has no id")]
    MissingServerId,

    #[error("duplicate server id `{0}`")]
    DuplicateServer(String),

    #[error("server `{server}`: empty domain name")]
    EmptyName { server: String },

    #[error("server `{server}`: invalid listen address `{address}`")]
    InvalidListen { server: String, address: String },

    #[error("{scope}: backend without id")]
    MissingBackendId { scope: String },

    #[error("{scope}: duplicate backend id `{id}`")]
    DuplicateBackend { scope: String, id: String },

    #[error("{scope}: backend `{id}` has no address")]
    MissingAddress { scope: String, id: String },

    #[error("{scope}: unknown scheduling algorithm `{code}`")]
    UnknownScheduling { scope: String, code: String },

    #[error("server `{server}`: location without id")]
    MissingLocationId { server: String },

    #[error("server `{server}`: duplicate location id `{id}`")]
    DuplicateLocation { server: String, id: String },

    #[error("server `{server}`, location `{location}`: {source}")]
    InvalidPattern {
        server: String,
        location: String,
        source: PatternError,
    },

    #[error("{scope}: fastcgi `{id}` has no pass address")]
    MissingFastcgiPass { scope: String, id: String },
}

/// Validate one server document, collecting every problem found.
pub fn validate_server(server: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if server.id.is_empty() {
        errors.push(ValidationError::MissingServerId);
    }
    let sid = server.id.as_str();

    if server.name.iter().any(|n| n.trim().is_empty()) {
        errors.push(ValidationError::EmptyName {
            server: sid.to_string(),
        });
    }

    for address in &server.listen {
        if !is_listen_address(address) {
            errors.push(ValidationError::InvalidListen {
                server: sid.to_string(),
                address: address.clone(),
            });
        }
    }

    let scope = format!("server `{sid}`");
    check_backends(&scope, &server.backends, &mut errors);
    check_scheduling(&scope, server.scheduling.as_ref(), &mut errors);
    check_websocket(&scope, server.websocket.as_ref(), &mut errors);
    check_fastcgi(&scope, server, &mut errors);

    let mut location_ids = HashSet::new();
    for location in &server.locations {
        if location.id.is_empty() {
            errors.push(ValidationError::MissingLocationId {
                server: sid.to_string(),
            });
        } else if !location_ids.insert(location.id.as_str()) {
            errors.push(ValidationError::DuplicateLocation {
                server: sid.to_string(),
                id: location.id.clone(),
            });
        }

        if let Err(source) = CompiledPattern::compile(location.parsed_pattern()) {
            errors.push(ValidationError::InvalidPattern {
                server: sid.to_string(),
                location: location.id.clone(),
                source,
            });
        }

        let scope = format!("server `{sid}`, location `{}`", location.id);
        check_backends(&scope, &location.backends, &mut errors);
        check_scheduling(&scope, location.scheduling.as_ref(), &mut errors);
        check_websocket(&scope, location.websocket.as_ref(), &mut errors);
        for fastcgi in location.fastcgi.iter().filter(|f| f.on && f.pass.is_empty()) {
            errors.push(ValidationError::MissingFastcgiPass {
                scope: scope.clone(),
                id: fastcgi.id.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a full server set: every document plus id uniqueness across them.
pub fn validate_servers(servers: &[ServerConfig]) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for server in servers {
        if let Err(mut found) = validate_server(server) {
            errors.append(&mut found);
        }
        if !server.id.is_empty() && !seen.insert(server.id.as_str()) {
            errors.push(ValidationError::DuplicateServer(server.id.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_backends(scope: &str, backends: &[BackendConfig], errors: &mut Vec<ValidationError>) {
    let mut ids = HashSet::new();
    for backend in backends {
        if backend.id.is_empty() {
            errors.push(ValidationError::MissingBackendId {
                scope: scope.to_string(),
            });
            continue;
        }
        if !ids.insert(backend.id.as_str()) {
            errors.push(ValidationError::DuplicateBackend {
                scope: scope.to_string(),
                id: backend.id.clone(),
            });
        }
        if backend.address.trim().is_empty() {
            errors.push(ValidationError::MissingAddress {
                scope: scope.to_string(),
                id: backend.id.clone(),
            });
        }
    }
}

fn check_scheduling(
    scope: &str,
    scheduling: Option<&SchedulingConfig>,
    errors: &mut Vec<ValidationError>,
) {
    if let Some(scheduling) = scheduling {
        if !registry().contains(&scheduling.code) {
            errors.push(ValidationError::UnknownScheduling {
                scope: scope.to_string(),
                code: scheduling.code.clone(),
            });
        }
    }
}

fn check_websocket(
    scope: &str,
    websocket: Option<&WebsocketConfig>,
    errors: &mut Vec<ValidationError>,
) {
    if let Some(websocket) = websocket {
        let scope = format!("{scope}, websocket");
        check_backends(&scope, &websocket.backends, errors);
        check_scheduling(&scope, websocket.scheduling.as_ref(), errors);
    }
}

fn check_fastcgi(scope: &str, server: &ServerConfig, errors: &mut Vec<ValidationError>) {
    for fastcgi in server.fastcgi.iter().filter(|f| f.on && f.pass.is_empty()) {
        errors.push(ValidationError::MissingFastcgiPass {
            scope: scope.to_string(),
            id: fastcgi.id.clone(),
        });
    }
}

/// `host:port` or `:port`, with bracketed IPv6 hosts allowed.
fn is_listen_address(address: &str) -> bool {
    match address.rsplit_once(':') {
        Some((host, port)) => {
            let host_ok = !host.contains(':') || (host.starts_with('[') && host.ends_with(']'));
            host_ok && port.parse::<u16>().is_ok()
        }
        None => false,
    }
}
