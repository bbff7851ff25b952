use std::{net::SocketAddr, path::Path, sync::Arc};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use gatekeep::{
    adapters::{HttpClientAdapter, HttpHandler},
    config::{
        GatewayConfigValidator,
        loader::{STARTER_CONFIG, load_config, load_config_unchecked},
    },
    core::GatewayService,
    ports::http_client::HttpClient,
    tracing_setup,
    utils::graceful_shutdown::GracefulShutdown,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "gatekeep.toml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "gatekeep.toml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "gatekeep.toml")]
        config: String,
    },
    /// Start the gateway server (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "gatekeep.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config).await,
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Serve { config }) => serve(&config).await,
        None => serve(&args.config).await,
    }
}

async fn serve(config_path: &str) -> Result<()> {
    let config = load_config(config_path)
        .await
        .with_context(|| format!("Failed to load config from {config_path}"))?;

    tracing_setup::init_tracing(&config.logging)
        .map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;
    tracing::info!("Loaded configuration from {config_path}");

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .context("Failed to parse listen address")?;

    let http_client: Arc<dyn HttpClient> =
        Arc::new(HttpClientAdapter::new().context("Failed to create HTTP client adapter")?);
    let gateway_service = Arc::new(
        GatewayService::new(&config, http_client).context("Failed to build gateway service")?,
    );
    let app = HttpHandler::new(gateway_service).into_router();

    let graceful_shutdown = Arc::new(GracefulShutdown::new());
    let signal_handler_shutdown = graceful_shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_handler_shutdown.run_signal_handler().await {
            tracing::error!("Signal handler error: {:?}", e);
        }
    });

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    tracing::info!(
        "gatekeep listening on {} ({} services, {} routes)",
        addr,
        config.services.len(),
        config.routes.len()
    );

    let shutdown_signal = {
        let graceful_shutdown = graceful_shutdown.clone();
        async move {
            let reason = graceful_shutdown.wait_for_shutdown_signal().await;
            tracing::info!("Shutdown signal received: {:?}, draining connections", reason);
        }
    };
    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);
    let mut server = std::pin::pin!(server.into_future());

    // Drain in-flight requests, but never for longer than the drain timeout.
    tokio::select! {
        result = &mut server => {
            result.context("Server error")?;
        }
        _ = async {
            graceful_shutdown.wait_for_shutdown_signal().await;
            tokio::time::sleep(graceful_shutdown.drain_timeout()).await;
        } => {
            tracing::warn!(
                "Connections did not drain within {}, forcing shutdown",
                humantime::format_duration(graceful_shutdown.drain_timeout())
            );
        }
    }

    tracing::info!("Graceful shutdown completed");
    Ok(())
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config_unchecked(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:?}");
            std::process::exit(1);
        }
    };

    match GatewayConfigValidator::validate(&config) {
        Ok(()) => {
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!(
                "   • Circuit Breaker: trip after {} failures, cool-down {}",
                config.circuit_breaker.failure_threshold, config.circuit_breaker.cool_down
            );
            println!("   • Forward Timeout: {}", config.forwarding.timeout);
            println!("   • Services: {}", config.services.len());
            for (id, service) in &config.services {
                match &service.timeout {
                    Some(timeout) => println!("       {id} -> {} (timeout {timeout})", service.url),
                    None => println!("       {id} -> {}", service.url),
                }
            }
            println!("   • Routes: {}", config.routes.len());
            for route in &config.routes {
                match &route.rewrite {
                    Some(rewrite) => {
                        println!("       {} -> {} at {rewrite}", route.path, route.service)
                    }
                    None => println!("       {} -> {}", route.path, route.service),
                }
            }
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Ensure all service URLs start with http:// or https://");
            println!("   • Make sure every route names a service under [services]");
            println!("   • Verify listen address format (e.g., '127.0.0.1:9000')");
            println!("   • Use humantime durations such as '30s' or '500ms'");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    tokio::fs::write(path, STARTER_CONFIG)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'gatekeep serve --config {config_path}' to start the server");
    Ok(())
}
