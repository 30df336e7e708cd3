//! Hermes Gateway - Entry point

use std::path::PathBuf;

use tracing::{error, info};

use hermes_gateway::{GatewayConfig, GatewayServer};

/// Command-line arguments.
struct Args {
    /// Path to configuration file.
    config: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    config = args.next().map(PathBuf::from);
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("hermes-gateway {}", hermes_gateway::VERSION);
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
            }
        }

        Self { config }
    }
}

fn print_help() {
    println!(
        r"Hermes Gateway - authenticated reverse proxy

USAGE:
    hermes-gateway [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file (TOML or JSON)
    -h, --help             Print help information
    -v, --version          Print version information

ENVIRONMENT VARIABLES:
    HERMES_GATEWAY_LISTEN_ADDR          Listen address (default: 0.0.0.0)
    HERMES_GATEWAY_LISTEN_PORT          Listen port (default: 3002)
    HERMES_GATEWAY_MOUNT_PREFIX         Mount prefix (default: /proxies/v8)
    HERMES_GATEWAY_REQUEST_TIMEOUT      Request timeout, e.g. 240s (default: 240s)
    HERMES_GATEWAY_MAX_BODY_SIZE        Max request body in bytes (default: 52428800)
    HERMES_GATEWAY_UPSTREAM_URL         Upstream API base URL (required)
    HERMES_GATEWAY_UPSTREAM_TIMEOUT     Upstream call timeout (default: 240s)
    HERMES_GATEWAY_SERVICE_CREDENTIAL   Authorization value sent upstream
    HERMES_GATEWAY_MASTER_CATEGORY_IDS  Comma-separated master category ids
    HERMES_GATEWAY_PRIVILEGED_ROLES     Comma-separated privileged roles
    HERMES_GATEWAY_TRUST_SESSION_HEADERS
                                        Read x-session-* headers (default: false);
                                        enable only behind an auth layer that
                                        strips client-supplied copies
    HERMES_GATEWAY_LOG_LEVEL            Log filter (default: info)
    HERMES_GATEWAY_LOG_FORMAT           json or pretty (default: json)
    HERMES_GATEWAY_METRICS_ENABLED      Serve Prometheus metrics (default: true)

EXAMPLES:
    # Run with configuration file
    hermes-gateway --config /etc/hermes/gateway.toml

    # Run with environment variables
    HERMES_GATEWAY_UPSTREAM_URL=http://kong:8000 hermes-gateway
"
    );
}

fn load_config(path: Option<PathBuf>) -> Result<GatewayConfig, String> {
    let config = match path {
        Some(path) => GatewayConfig::from_file(path)
            .map_err(|e| format!("Failed to load configuration: {e}"))?,
        None => GatewayConfig::default(),
    };

    let config = config
        .with_env_overrides()
        .map_err(|e| format!("Invalid environment override: {e}"))?;

    config
        .validate()
        .map_err(|e| format!("Invalid configuration: {e}"))?;

    Ok(config)
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match load_config(args.config) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("{message}");
            std::process::exit(1);
        }
    };

    let telemetry = match config.telemetry_config() {
        Ok(telemetry) => telemetry,
        Err(e) => {
            eprintln!("Invalid telemetry configuration: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = hermes_telemetry::init_telemetry(&telemetry) {
        eprintln!("Failed to initialize telemetry: {e}");
        std::process::exit(1);
    }

    info!("Starting Hermes gateway v{}", hermes_gateway::VERSION);
    info!(
        "Listening on {}:{}",
        config.gateway.listen_addr, config.gateway.listen_port
    );
    info!(
        upstream = %config.upstream.base_url,
        mount_prefix = %config.gateway.mount_prefix,
        trust_session_headers = config.session.trust_headers,
        "proxy configured"
    );

    let server = match GatewayServer::new(&config) {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to create server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run().await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
