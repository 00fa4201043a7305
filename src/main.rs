use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use rand::Rng;
use serde::Serialize;
use tokio::signal;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use gatekeeper::atomic::{AtomicInteger, Uint64};
use gatekeeper::config::GatewayConfig;
use gatekeeper::error::GatekeeperError;
use gatekeeper::proxy::{backend_limiter, EchoProxy, EndpointLimiter, Proxy, Request};

/// Configuration used when no file is given.
const DEFAULT_CONFIG: &str = r#"
name: demo
endpoints:
  - endpoint: /orders
    middleware:
      mw-ratelimit:
        max_rate: 50
        client_max_rate: 10
        fill_interval: 100
        fill_count: 5
    backends:
      - url_pattern: /inventory
        middleware:
          mw-ratelimit:
            max_rate: 20
      - url_pattern: /pricing
"#;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Drive gateway rate limiters with a simulated request load.
#[derive(Debug, Parser)]
#[command(name = "gatekeeper", version, about)]
struct Args {
    /// Gateway configuration file (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of requests to send
    #[arg(long, default_value_t = 500)]
    requests: usize,

    /// Number of distinct client identities
    #[arg(long, default_value_t = 8)]
    clients: usize,

    /// Maximum requests in flight
    #[arg(long, default_value_t = 32)]
    concurrency: usize,

    /// Delay between request launches in milliseconds
    #[arg(long, default_value_t = 1)]
    interval_ms: u64,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

/// An endpoint with its limiters and backend chains.
struct Route {
    path: String,
    limiter: Option<EndpointLimiter>,
    backends: Vec<Arc<dyn Proxy>>,
}

#[derive(Default)]
struct Tally {
    admitted: Uint64,
    route_limited: Uint64,
    client_limited: Uint64,
    proxy_limited: Uint64,
    backend_calls: Uint64,
}

#[derive(Debug, Serialize)]
struct Summary {
    gateway: String,
    requests: u64,
    admitted: u64,
    route_limited: u64,
    client_limited: u64,
    proxy_limited: u64,
    backend_calls: u64,
    elapsed_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    info!("Starting Gatekeeper load simulation");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => GatewayConfig::from_file(path)?,
        None => GatewayConfig::from_yaml(DEFAULT_CONFIG)?,
    };
    if config.endpoints.is_empty() {
        anyhow::bail!("gateway configuration has no endpoints");
    }
    info!(gateway = %config.name, endpoints = config.endpoints.len(), "Configuration loaded");

    let routes: Arc<Vec<Route>> = Arc::new(
        config
            .endpoints
            .iter()
            .map(|endpoint| Route {
                path: endpoint.endpoint.clone(),
                limiter: EndpointLimiter::from_config(endpoint),
                backends: endpoint
                    .backends
                    .iter()
                    .map(|backend| {
                        let echo: Arc<dyn Proxy> = Arc::new(EchoProxy::new(backend.url_pattern.clone()));
                        backend_limiter(backend, echo)
                    })
                    .collect(),
            })
            .collect(),
    );

    let tally = Arc::new(Tally::default());
    let start = Instant::now();

    tokio::select! {
        _ = simulate(&args, routes, tally.clone()) => {
            info!("Simulation finished");
        }
        _ = shutdown_signal() => {
            warn!("Simulation interrupted, reporting partial results");
        }
    }

    let summary = Summary {
        gateway: config.name,
        requests: tally.admitted.load()
            + tally.route_limited.load()
            + tally.client_limited.load(),
        admitted: tally.admitted.load(),
        route_limited: tally.route_limited.load(),
        client_limited: tally.client_limited.load(),
        proxy_limited: tally.proxy_limited.load(),
        backend_calls: tally.backend_calls.load(),
        elapsed_ms: start.elapsed().as_millis() as u64,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_thread_ids(true)
            .init(),
    }
}

/// Fire `args.requests` requests at random routes from random clients.
async fn simulate(args: &Args, routes: Arc<Vec<Route>>, tally: Arc<Tally>) {
    let permits = Arc::new(Semaphore::new(args.concurrency.max(1)));
    let mut tasks = Vec::with_capacity(args.requests);

    for _ in 0..args.requests {
        let (route_idx, client) = {
            let mut rng = rand::thread_rng();
            (
                rng.gen_range(0..routes.len()),
                format!("client-{}", rng.gen_range(0..args.clients.max(1))),
            )
        };

        let permit = match permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let routes = routes.clone();
        let tally = tally.clone();

        tasks.push(tokio::spawn(async move {
            let route = &routes[route_idx];
            handle(route, Request::new(route.path.clone()).with_client(client), &tally).await;
            drop(permit);
        }));

        if args.interval_ms > 0 {
            tokio::time::sleep(Duration::from_millis(args.interval_ms)).await;
        }
    }

    futures::future::join_all(tasks).await;
}

/// Run one request through the endpoint limiter and every backend chain.
async fn handle(route: &Route, request: Request, tally: &Tally) {
    if let Some(limiter) = &route.limiter {
        match limiter.check(&request) {
            Ok(()) => {}
            Err(GatekeeperError::RouteLimited) => {
                tally.route_limited.increment();
                return;
            }
            Err(GatekeeperError::ClientLimited) => {
                tally.client_limited.increment();
                return;
            }
            Err(e) => {
                warn!(error = %e, "Unexpected endpoint error");
                return;
            }
        }
    }
    tally.admitted.increment();

    for backend in &route.backends {
        match backend.call(request.clone()).await {
            Ok(response) => {
                debug!(status = response.status, body = %response.body, "Backend answered");
                tally.backend_calls.increment();
            }
            Err(e) if e.is_rate_limited() => {
                tally.proxy_limited.increment();
            }
            Err(e) => {
                warn!(error = %e, "Backend call failed");
            }
        }
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping simulation");
        }
        _ = terminate => {
            info!("Received SIGTERM, stopping simulation");
        }
    }
}
