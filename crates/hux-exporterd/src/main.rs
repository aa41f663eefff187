//! Prometheus exporter daemon for huey task queues.
//!
//! Subscribes to the Redis channel where the scheduler publishes task
//! lifecycle events and exposes the aggregated execution metrics over HTTP.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use hux_core::{Correlator, EventListener};
use hux_observe::{LoggerConfig, LoggerFormat, logger_init};
use hux_prometheus::{Encoder, ExporterMetrics, TextEncoder};

#[derive(Debug, Parser)]
#[command(
    name = "hux-exporterd",
    version,
    about = "Prometheus exporter for huey task events"
)]
struct Options {
    /// Log level (debug, info, warn, error).
    #[arg(long = "log.level", env = "HUEY_EXPORTER_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log format (text, json).
    #[arg(long = "log.format", env = "HUEY_EXPORTER_LOG_FORMAT", default_value = "text")]
    log_format: String,

    /// Address of the Redis instance to connect to.
    #[arg(
        long = "redis.address",
        env = "HUEY_EXPORTER_REDIS_ADDR",
        default_value = "localhost:6379"
    )]
    redis_address: String,

    /// Redis channel to subscribe to listen for events.
    #[arg(
        long = "redis.channel",
        env = "HUEY_EXPORTER_REDIS_CHANNEL",
        default_value = "events"
    )]
    redis_channel: String,

    /// Prefix applied to every metric name.
    #[arg(
        long = "metrics.namespace",
        env = "HUEY_EXPORTER_METRICS_NAMESPACE",
        default_value = ""
    )]
    metrics_namespace: String,

    /// HTTP path under which to expose metrics.
    #[arg(
        long = "web.telemetry-path",
        env = "HUEY_EXPORTER_WEB_PATH",
        default_value = "/metrics"
    )]
    metrics_path: String,

    /// Address to listen on for web interface and telemetry.
    #[arg(
        long = "web.listen-address",
        env = "HUEY_EXPORTER_WEB_LISTEN_ADDRESS",
        default_value = "0.0.0.0:9234"
    )]
    listen_address: String,

    /// Seconds after which a started execution with no terminal event is
    /// dropped from the correlation map (0 disables eviction).
    #[arg(
        long = "pending.max-age",
        env = "HUEY_EXPORTER_PENDING_MAX_AGE",
        default_value_t = 3600
    )]
    pending_max_age: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opts = Options::parse();

    let cfg = LoggerConfig {
        format: opts.log_format.parse::<LoggerFormat>()?,
        level: opts.log_level.clone(),
        ..Default::default()
    };
    logger_init(&cfg)?;

    info!("service started");

    let client = connect_redis(&opts.redis_address).await?;
    info!(addr = %opts.redis_address, "connected with redis");

    let metrics = Arc::new(
        ExporterMetrics::new(&opts.metrics_namespace).context("failed to register metrics")?,
    );
    let correlator = Correlator::new(
        metrics.as_ref().clone(),
        Duration::from_secs(opts.pending_max_age),
    );
    let listener = EventListener::new(client, opts.redis_channel.clone(), correlator);

    let cancel = CancellationToken::new();

    let web_listener = tokio::net::TcpListener::bind(&opts.listen_address)
        .await
        .with_context(|| format!("error listening on {}", opts.listen_address))?;
    info!(
        addr = %format!("http://{}{}", web_listener.local_addr()?, opts.metrics_path),
        "starting HTTP metrics server"
    );

    let app = router(&opts.metrics_path, Arc::clone(&metrics));
    let server = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            axum::serve(web_listener, app)
                .with_graceful_shutdown(cancel.cancelled_owned())
                .await
        })
    };

    let events = {
        let cancel = cancel.clone();
        tokio::spawn(async move { listener.run(cancel).await })
    };

    tokio::spawn(watch_signals(cancel.clone()));

    // The first side to finish decides the outcome; the token then stops
    // whatever is still running.
    let outcome: anyhow::Result<()> = tokio::select! {
        res = events => res
            .context("event listener task panicked")?
            .map_err(|err| anyhow::Error::new(err).context("event listener failed")),
        res = server => res
            .context("http server task panicked")?
            .map_err(|err| anyhow::Error::new(err).context("http server failed")),
    };
    cancel.cancel();

    info!("service stopped");
    outcome
}

async fn connect_redis(address: &str) -> anyhow::Result<redis::Client> {
    let client = redis::Client::open(format!("redis://{address}"))
        .with_context(|| format!("invalid redis address {address}"))?;

    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .context("connection with redis failed")?;
    let _: String = redis::cmd("PING")
        .query_async(&mut conn)
        .await
        .context("redis ping failed")?;

    Ok(client)
}

fn router(metrics_path: &str, metrics: Arc<ExporterMetrics>) -> Router {
    Router::new()
        .route(metrics_path, get(serve_metrics))
        .with_state(metrics)
}

async fn serve_metrics(State(metrics): State<Arc<ExporterMetrics>>) -> Response {
    let families = metrics.gather();
    let encoder = TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&families, &mut buffer) {
        error!("encoding metrics failed: {}", err);
        return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
    }

    ([(header::CONTENT_TYPE, encoder.format_type())], buffer).into_response()
}

async fn watch_signals(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(err) => {
                error!("failed to install SIGTERM handler: {}", err);
                cancel.cancel();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("received interrupt"),
            _ = term.recv() => info!("received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("received interrupt");
    }

    cancel.cancel();
}
