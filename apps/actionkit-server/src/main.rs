use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use actionkit::{ActionCompiler, ActionHost, ActionsConfig, BatchReport, CompilerConfig};
use actionkit_bootstrap::{AppConfig, CliArgs};

mod actions;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Module name of the action settings inside `modules:`.
const ACTIONS_MODULE: &str = "actions";

/// ActionKit Server - fluent action endpoints served over HTTP
#[derive(Parser)]
#[command(name = "actionkit-server")]
#[command(about = "ActionKit Server - fluent action endpoints served over HTTP")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port override for HTTP server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Print effective configuration (YAML) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile every discovered action and serve it
    Run,
    /// Compile every discovered action and report failures
    Check,
    /// Print compiled endpoints with their parameter slots
    Routes,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        port: cli.port,
        print_config: cli.print_config,
        verbose: cli.verbose,
    };

    // defaults -> YAML -> env (APP__*) -> CLI
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);

    actionkit_bootstrap::init_logging(config.logging.as_ref(), &config.log_base_dir());

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    let actions: ActionsConfig = config.module_config(ACTIONS_MODULE)?;
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        "ActionKit Server starting"
    );

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_server(config, actions).await,
        Commands::Check => check_actions(actions.compiler),
        Commands::Routes => print_routes(actions.compiler),
    }
}

fn compile_discovered(compiler: CompilerConfig) -> BatchReport {
    ActionCompiler::new()
        .with_config(compiler)
        .discover(None)
}

async fn run_server(config: AppConfig, actions: ActionsConfig) -> Result<()> {
    let report = compile_discovered(actions.compiler);
    if !report.is_success() {
        bail!(
            "{} action(s) failed to compile; run `actionkit-server check` for details",
            report.failures.len()
        );
    }

    let mut host = ActionHost::new(actions.host)
        .with_services(actions::services())
        .with_views(Arc::new(actions::views()));
    host.add_all(report.compiled)?;
    let router = host.into_router()?;

    let router = {
        use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
        use tower_http::trace::TraceLayer;

        let x_request_id = axum::http::HeaderName::from_static("x-request-id");
        router
            .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
            .layer(TraceLayer::new_for_http().make_span_with(
                |req: &axum::http::Request<axum::body::Body>| {
                    let rid = req
                        .headers()
                        .get("x-request-id")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("n/a");
                    tracing::info_span!(
                        "http_request",
                        method = %req.method(),
                        uri = %req.uri().path(),
                        request_id = %rid,
                    )
                },
            ))
            .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
    };

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid bind address '{}:{}': {e}", config.server.host, config.server.port))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP server bound on {}", addr);

    let grace = Duration::from_secs(config.server.shutdown_timeout_sec);
    let shutdown = async move {
        let deadline = || {
            tracing::error!("forcing exit after shutdown deadline");
            std::process::exit(1);
        };
        if let Err(e) = actionkit_bootstrap::shutdown_with_deadline(grace, deadline).await {
            tracing::error!(error = %e, "shutdown signal handling failed");
        }
    };

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    tracing::info!("HTTP server stopped");
    Ok(())
}

fn check_actions(compiler: CompilerConfig) -> Result<()> {
    let report = compile_discovered(compiler);
    for failure in &report.failures {
        println!("FAIL {}: {failure}", failure.endpoint());
    }
    println!(
        "{} compiled, {} failed",
        report.compiled.len(),
        report.failures.len()
    );
    if !report.is_success() {
        bail!("action compilation failed");
    }
    Ok(())
}

fn print_routes(compiler: CompilerConfig) -> Result<()> {
    let report = compile_discovered(compiler);
    for endpoint in &report.compiled {
        println!(
            "{:<32} {} ({:?}, {:?})",
            endpoint.name,
            endpoint.unit.type_name(),
            endpoint.unit.method.strategy,
            endpoint.unit.method.returns,
        );
        for p in endpoint.unit.parameters() {
            let default = if p.optional { " = default" } else { "" };
            println!(
                "    #{:<2} {:<16} {:?} : {}{default}",
                p.position, p.name, p.marker, p.value_type
            );
        }
    }
    for failure in &report.failures {
        eprintln!("FAIL {}: {failure}", failure.endpoint());
    }
    Ok(())
}
