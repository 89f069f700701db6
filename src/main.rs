use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use privlink::api::handlers::normalize_page;
use privlink::clock::SystemClock;
use privlink::models::token::{token_prefix, UsageMode};
use privlink::{cli, config, jobs, server, store, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Export spans over OTLP only when an endpoint is configured.
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::{trace as sdktrace, Resource};

    let telemetry_layer = if std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok() {
        let tracer = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic())
            .with_trace_config(sdktrace::config().with_resource(Resource::new(vec![
                KeyValue::new("service.name", "privlink"),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
            .context("failed to install OpenTelemetry tracer")?;
        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "privlink=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry_layer)
        .init();

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port).await
        }
        Some(cli::Commands::Link { command }) => {
            let state = build_state(cfg).await?;
            handle_link_command(command, &state).await
        }
        Some(cli::Commands::Stats) => {
            let state = build_state(cfg).await?;
            let stats = state.service.stats().await?;
            println!(
                "Links:\n  Total:    {}\n  Active:   {}\n  Inactive: {}",
                stats.total,
                stats.active,
                stats.inactive()
            );
            Ok(())
        }
        Some(cli::Commands::Logs { page, per_page }) => {
            let state = build_state(cfg).await?;
            print_logs(&state, page, per_page).await
        }
        Some(cli::Commands::Sweep) => {
            let state = build_state(cfg).await?;
            let deleted = state.service.sweep().await?;
            println!("Deleted {} expired link(s).", deleted);
            Ok(())
        }
        None => {
            let port = cfg.port;
            run_server(cfg, port).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn build_state(cfg: config::Config) -> anyhow::Result<Arc<AppState>> {
    let (tokens, access_log) = store::open(&cfg).await?;
    let state = AppState::new(cfg, tokens, access_log, Arc::new(SystemClock))?;
    Ok(Arc::new(state))
}

async fn run_server(cfg: config::Config, port: u16) -> anyhow::Result<()> {
    let sweep_period = Duration::from_secs(cfg.sweep_interval_secs);
    let state = build_state(cfg).await?;

    let app = server::router(state.clone());

    jobs::reclaimer::spawn(state.service.clone(), sweep_period);
    tracing::info!(
        period_secs = sweep_period.as_secs(),
        "Background reclaimer started"
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("privlink listening on {}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

async fn handle_link_command(cmd: cli::LinkCommands, state: &Arc<AppState>) -> anyhow::Result<()> {
    match cmd {
        cli::LinkCommands::Create { url, mode, hours } => {
            let mode: UsageMode = mode.parse().map_err(|e: String| anyhow::anyhow!(e))?;
            let issued = state.service.issue(&url, mode, hours).await?;
            println!(
                "Link created:\n  URL:      {}\n  Short:    {}\n  Mode:     {}\n  Expires:  {}",
                issued.access_url,
                issued.short_alias.as_deref().unwrap_or("-"),
                issued.usage_mode,
                issued.expiration.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
    }
    Ok(())
}

async fn print_logs(state: &Arc<AppState>, page: i64, per_page: i64) -> anyhow::Result<()> {
    let (page, per_page) = normalize_page(Some(page), Some(per_page));
    let rows = state
        .access_log
        .list(per_page, (page - 1) * per_page)
        .await?;

    if rows.is_empty() {
        println!("No access logs found.");
        return Ok(());
    }

    println!(
        "{:<12} {:<40} {:<20} {:<16} OUTCOME",
        "TOKEN", "DESTINATION", "ACCESSED", "IP"
    );
    for r in rows {
        println!(
            "{:<12} {:<40} {:<20} {:<16} {}",
            token_prefix(&r.token),
            r.destination_url.as_deref().unwrap_or("-"),
            r.accessed_at.format("%Y-%m-%d %H:%M:%S"),
            r.ip_address.as_deref().unwrap_or("-"),
            r.outcome
        );
    }
    Ok(())
}
