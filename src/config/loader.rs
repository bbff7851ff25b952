use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use eyre::{Context, Result};

use crate::config::{models::GatewayConfig, validation::GatewayConfigValidator};

/// Prefix for environment overrides, e.g. `GATEWAY__SERVICES__ORDER__URL`.
pub const ENV_PREFIX: &str = "GATEWAY";

/// Starter configuration written by `gatekeep init`.
pub const STARTER_CONFIG: &str = r#"# gatekeep API gateway configuration

# The address to listen on
listen_addr = "127.0.0.1:9000"

[logging]
level = "info"
format = "pretty"

# Trip after this many consecutive failures, probe again after the cool-down
[circuit_breaker]
failure_threshold = 5
cool_down = "30s"

[forwarding]
timeout = "5s"

[services.product]
url = "http://localhost:8084"

[services.order]
url = "http://localhost:8082"

[services.inventory]
url = "http://localhost:8083"
# timeout = "10s"

# Omitting [[routes]] installs the default table:
#   /api/{product,order,inventory}
#   /aggregate/{product,order,inventory}-service/v3/api-docs -> /api-docs
# [[routes]]
# path = "/api/product"
# service = "product"
#
# [[routes]]
# path = "/aggregate/product-service/v3/api-docs"
# service = "product"
# rewrite = "/api-docs"
"#;

/// Load and validate configuration from a file
pub async fn load_config(config_path: &str) -> Result<GatewayConfig> {
    let config = load_config_unchecked(config_path).await?;
    GatewayConfigValidator::validate(&config)
        .with_context(|| format!("Invalid configuration in {config_path}"))?;
    Ok(config)
}

/// Load configuration without validation (used for validation command)
pub async fn load_config_unchecked(config_path: &str) -> Result<GatewayConfig> {
    load_config_sync(config_path)
}

/// Load configuration synchronously using the config crate.
/// Supports multiple formats: YAML, JSON, TOML, etc. Environment variables
/// prefixed with `GATEWAY__` override file values.
pub fn load_config_sync(config_path: &str) -> Result<GatewayConfig> {
    load_with_environment(config_path, environment())
}

/// `GATEWAY__FORWARDING__TIMEOUT=750ms` sets `forwarding.timeout`.
fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX).separator("__")
}

fn load_with_environment(config_path: &str, environment: Environment) -> Result<GatewayConfig> {
    let config_path = Path::new(config_path);

    // Determine file format based on extension
    let format = match config_path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        Some("toml") => FileFormat::Toml,
        Some("ini") => FileFormat::Ini,
        _ => FileFormat::Yaml, // Default to YAML
    };

    let settings = Config::builder()
        .add_source(File::new(
            config_path
                .to_str()
                .ok_or_else(|| eyre::eyre!("Invalid UTF-8 path: {}", config_path.display()))?,
            format,
        ))
        .add_source(environment)
        .build()
        .with_context(|| format!("Failed to build config from {}", config_path.display()))?;

    let gateway_config: GatewayConfig = settings.try_deserialize().with_context(|| {
        format!(
            "Failed to deserialize config from {}",
            config_path.display()
        )
    })?;

    Ok(gateway_config)
}
