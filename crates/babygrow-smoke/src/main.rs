//! BabyGrow Smoke Harness
//!
//! Registers the offline cache controller against a running BabyGrow server,
//! replays a short scripted session (install, navigations, an asset fetch, a
//! push notification) and prints a JSON summary with per-operation timings.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use babygrow_common::{init_logging, LogConfig, LogFormat};
use babygrow_sw::{
    ControllerConfig, HttpFetcher, OfflineCacheController, Registration, Request, WorkerHost,
};
use serde_json::json;
use tracing::{error, info, warn};
use url::Url;

/// Performance timing collector for tracking operation durations.
#[derive(Default)]
struct PerfTiming {
    timings: HashMap<&'static str, Vec<Duration>>,
}

impl PerfTiming {
    fn record(&mut self, operation: &'static str, duration: Duration) {
        self.timings.entry(operation).or_default().push(duration);
    }

    fn summary(&self) -> serde_json::Value {
        let mut summary = serde_json::Map::new();

        for (op, durations) in &self.timings {
            if durations.is_empty() {
                continue;
            }

            let count = durations.len();
            let millis: Vec<f64> = durations.iter().map(|d| d.as_secs_f64() * 1000.0).collect();
            let total_ms: f64 = millis.iter().sum();
            let avg_ms = total_ms / count as f64;
            let min_ms = millis.iter().copied().fold(f64::INFINITY, f64::min);
            let max_ms = millis.iter().copied().fold(f64::NEG_INFINITY, f64::max);

            summary.insert(
                op.to_string(),
                json!({
                    "count": count,
                    "total_ms": round2(total_ms),
                    "avg_ms": round2(avg_ms),
                    "min_ms": round2(min_ms),
                    "max_ms": round2(max_ms),
                }),
            );
        }

        serde_json::Value::Object(summary)
    }
}

fn round2(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}

/// Parse command line arguments
struct Args {
    config: Option<String>,
    scope: Option<String>,
    log_format: LogFormat,
    perf_output: Option<String>,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config = None;
        let mut scope = None;
        let mut log_format = LogFormat::Pretty;
        let mut perf_output = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    config = args.next();
                }
                "--scope" => {
                    scope = args.next();
                }
                "--log-format" => {
                    if let Some(val) = args.next() {
                        log_format = LogFormat::from_name(&val).unwrap_or_else(|| {
                            eprintln!("Warning: unknown log format {val}, using pretty");
                            LogFormat::Pretty
                        });
                    }
                }
                "--json-logs" => {
                    log_format = LogFormat::Json;
                }
                "--perf-output" => {
                    perf_output = args.next();
                }
                _ => {}
            }
        }

        Self {
            config,
            scope,
            log_format,
            perf_output,
        }
    }

    fn load_config(&self) -> anyhow::Result<ControllerConfig> {
        let mut config = match self.config {
            Some(ref path) => ControllerConfig::load(path)
                .with_context(|| format!("failed to load config from {path}"))?,
            None => ControllerConfig::default(),
        };
        if let Some(ref scope) = self.scope {
            let scope = Url::parse(scope).with_context(|| format!("invalid scope {scope}"))?;
            config = config.with_scope(scope);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(LogConfig::default().with_format(args.log_format))?;

    let config = args.load_config()?;
    let scope = config.scope.clone();
    info!(scope = %scope, version = %config.version_name, "Starting BabyGrow smoke run");

    let fetcher = HttpFetcher::new(babygrow_sw::net::DEFAULT_USER_AGENT)?;
    let host = WorkerHost::new(Arc::new(fetcher));
    let mut registration = Registration::new(scope.clone(), host.clone());
    let mut perf = PerfTiming::default();

    let start = Instant::now();
    let controller = OfflineCacheController::new(config.clone(), host.clone())?;
    let update = registration.update(controller).await;
    perf.record("install", start.elapsed());

    let update = match update {
        Ok(update) => update,
        Err(e) => {
            error!(error = %e, "Install failed");
            return Err(e.into());
        }
    };

    let mut fetches = Vec::new();
    let script = [
        Request::navigate(scope.clone()),
        Request::navigate(scope.clone()),
        Request::get(config.resolve("/static/css/style.css")?),
        Request::get(config.resolve("/api/children")?),
    ];
    for request in &script {
        let start = Instant::now();
        match registration.dispatch_fetch(request).await {
            Ok(dispatched) => {
                perf.record("fetch", start.elapsed());
                let revalidations = dispatched.lifetime.pending();
                dispatched.lifetime.settled().await;
                fetches.push(json!({
                    "url": request.url.as_str(),
                    "status": dispatched.response.status.as_u16(),
                    "from_cache": dispatched.response.from_cache,
                    "revalidations": revalidations,
                }));
            }
            Err(e) => {
                warn!(url = %request.url, error = %e, "Fetch failed");
                fetches.push(json!({
                    "url": request.url.as_str(),
                    "error": e.to_string(),
                }));
            }
        }
    }

    let start = Instant::now();
    let notification = registration.dispatch_push(None).await?;
    perf.record("push", start.elapsed());

    let state = match registration.active() {
        Some(active) => Some(active.state().await),
        None => None,
    };
    let caches = host.caches.read().await;
    let cached_entries = caches
        .get(&config.version_name)
        .map(|cache| cache.len())
        .unwrap_or_default();

    let summary = json!({
        "scope": scope.as_str(),
        "version": config.version_name,
        "state": state,
        "precached": update.install.cached,
        "evicted": update.activation.map(|a| a.evicted).unwrap_or_default(),
        "cached_entries": cached_entries,
        "fetches": fetches,
        "notification": {
            "title": notification.title,
            "body": notification.options.body,
        },
        "perf": perf.summary(),
    });

    let rendered = serde_json::to_string_pretty(&summary)?;
    println!("{rendered}");

    if let Some(ref path) = args.perf_output {
        std::fs::write(path, &rendered).with_context(|| format!("failed to write {path}"))?;
        info!(path = %path, "Wrote smoke summary");
    }

    Ok(())
}
