use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use vhost_router::config::{ConfigStore, SchedulingConfig, TomlStore};
use vhost_router::load_balancer::{registry, RequestContext};
use vhost_router::registry::ServerRegistry;
use vhost_router::routing::Router;

#[derive(Parser)]
#[command(name = "route-cli")]
#[command(about = "Inspect virtual-host routing offline", long_about = None)]
struct Cli {
    /// Directory holding the *.proxy.toml server files
    #[arg(short, long, default_value = "configs")]
    dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which server, location and backend would serve a request
    Resolve {
        host: String,
        #[arg(default_value = "/")]
        path: String,
        /// Treat the request as a websocket upgrade
        #[arg(long)]
        websocket: bool,
        /// Client address, used by the hash algorithm
        #[arg(long)]
        client: Option<IpAddr>,
    },
    /// List the registered scheduling algorithms
    Schedulers,
    /// Validate every server file in the directory
    Check,
    /// List the servers that would be activated
    Servers,
    /// Print a server document, or one of its locations or backends
    Show {
        server: String,
        /// Location id
        #[arg(long, conflicts_with_all = ["index", "backend"])]
        location: Option<String>,
        /// Location position, in matching order
        #[arg(long, conflicts_with = "backend")]
        index: Option<usize>,
        /// Backend id
        #[arg(long)]
        backend: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let store = TomlStore::new(&cli.dir);

    match cli.command {
        Commands::Resolve {
            host,
            path,
            websocket,
            client,
        } => {
            let registry = ServerRegistry::new(SchedulingConfig::default());
            registry.load_from(store.load_server_configs()?)?;
            let router = Router::new(registry.into());

            let mut ctx = RequestContext::new().websocket(websocket);
            if let Some(addr) = client {
                ctx = ctx.with_client_addr(addr);
            }

            let Some(decision) = router.route(&host, &path, &ctx) else {
                print_json(&json!({ "host": host, "matched": false }))?;
                return Ok(ExitCode::FAILURE);
            };

            let location = decision.location.as_ref().map(|m| {
                json!({
                    "id": m.location.id,
                    "pattern": m.location.pattern,
                    "index": m.index,
                    "params": m.params,
                })
            });
            let candidate = decision.candidate.as_ref().map(|c| {
                json!({ "id": c.id, "address": c.address, "weight": c.weight() })
            });
            print_json(&json!({
                "host": host,
                "matched": true,
                "server": decision.server.id(),
                "name": decision.name,
                "location": location,
                "pool": decision.pool.name(),
                "scheduling": decision.pool.summary(),
                "candidate": candidate,
            }))?;
        }
        Commands::Schedulers => {
            print_json(&json!(registry().summaries()))?;
        }
        Commands::Check => {
            let mut failed = 0;
            let mut report = Vec::new();
            for path in store.server_files()? {
                let entry = match store.load_server(&path) {
                    Ok(server) => json!({ "file": path, "server": server.id, "ok": true }),
                    Err(e) => {
                        failed += 1;
                        json!({ "file": path, "ok": false, "error": e.to_string() })
                    }
                };
                report.push(entry);
            }
            print_json(&Value::Array(report))?;
            if failed > 0 {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Servers => {
            let registry = ServerRegistry::new(SchedulingConfig::default());
            let version = registry.load_from(store.load_server_configs()?)?;
            let servers: Vec<Value> = registry
                .servers()
                .iter()
                .map(|s| {
                    let config = s.config();
                    json!({
                        "id": config.id,
                        "name": config.name,
                        "first_name": s.first_name(),
                        "listen": config.listen,
                        "locations": config.locations.len(),
                        "backends": s.pool().len(),
                        "scheduling": s.pool().summary().code,
                        "file": config.filename,
                    })
                })
                .collect();
            print_json(&json!({ "version": version, "servers": servers }))?;
        }
        Commands::Show {
            server,
            location,
            index,
            backend,
        } => {
            let configs = store.load_server_configs()?;
            let Some(config) = configs.iter().find(|c| c.id == server) else {
                print_json(&json!({ "server": server, "found": false }))?;
                return Ok(ExitCode::FAILURE);
            };

            let found = if let Some(id) = &location {
                config.find_location(id).map(serde_json::to_value)
            } else if let Some(i) = index {
                config.location_at_index(i).map(serde_json::to_value)
            } else if let Some(id) = &backend {
                config.find_backend(id).map(serde_json::to_value)
            } else {
                Some(serde_json::to_value(config))
            };

            match found {
                Some(value) => print_json(&value?)?,
                None => {
                    print_json(&json!({ "server": server, "found": false }))?;
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_json(value: &Value) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
