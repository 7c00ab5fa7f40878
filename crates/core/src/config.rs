use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::customer::CustomerType;
use crate::pricing::currency::default_rates;

pub const DEFAULT_CONFIG_FILE: &str = "tradeflow.toml";
pub const NESTED_CONFIG_FILE: &str = "config/tradeflow.toml";

#[derive(Clone, Debug, Default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub pricing: PricingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Constants behind every pricing heuristic. Percentages are whole numbers
/// (`40` means 40%).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingConfig {
    pub retail_markup_pct: Decimal,
    pub wholesale_markup_pct: Decimal,
    pub default_margin_pct: Decimal,
    pub competitive_discount_pct: Decimal,
    pub minimum_margin_pct: Decimal,
    pub volume_base_markup_pct: Decimal,
    pub dynamic_base_markup_pct: Decimal,
    pub dynamic_demand_adjustment_pct: Decimal,
    pub dynamic_competitor_band_pct: Decimal,
    pub position_tolerance_pct: Decimal,
    pub base_currency: String,
    pub exchange_rates: BTreeMap<String, Decimal>,
}

impl PricingConfig {
    pub fn default_markup_pct(&self, customer_type: CustomerType) -> Decimal {
        match customer_type {
            CustomerType::Retail => self.retail_markup_pct,
            CustomerType::Wholesale => self.wholesale_markup_pct,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub server_port: Option<u16>,
    pub base_currency: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://tradeflow.db".to_string(), max_connections: 5, timeout_secs: 30 }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: "127.0.0.1".to_string(), port: 8080, graceful_shutdown_secs: 15 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Compact }
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            retail_markup_pct: Decimal::new(40, 0),
            wholesale_markup_pct: Decimal::new(25, 0),
            default_margin_pct: Decimal::new(30, 0),
            competitive_discount_pct: Decimal::new(5, 0),
            minimum_margin_pct: Decimal::new(20, 0),
            volume_base_markup_pct: Decimal::new(40, 0),
            dynamic_base_markup_pct: Decimal::new(30, 0),
            dynamic_demand_adjustment_pct: Decimal::new(10, 0),
            dynamic_competitor_band_pct: Decimal::new(10, 0),
            position_tolerance_pct: Decimal::new(1, 0),
            base_currency: "USD".to_string(),
            exchange_rates: default_rates(),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        if let Some(pricing) = patch.pricing {
            self.pricing.apply_patch(pricing);
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("TRADEFLOW_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("TRADEFLOW_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_env("TRADEFLOW_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("TRADEFLOW_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("TRADEFLOW_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TRADEFLOW_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("TRADEFLOW_SERVER_PORT") {
            self.server.port = parse_env("TRADEFLOW_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("TRADEFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_env("TRADEFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("TRADEFLOW_LOGGING_LEVEL").or_else(|| read_env("TRADEFLOW_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TRADEFLOW_LOGGING_FORMAT").or_else(|| read_env("TRADEFLOW_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        if let Some(value) = read_env("TRADEFLOW_PRICING_BASE_CURRENCY") {
            self.pricing.base_currency = value;
        }
        if let Some(value) = read_env("TRADEFLOW_PRICING_RETAIL_MARKUP_PCT") {
            self.pricing.retail_markup_pct =
                parse_env("TRADEFLOW_PRICING_RETAIL_MARKUP_PCT", &value)?;
        }
        if let Some(value) = read_env("TRADEFLOW_PRICING_WHOLESALE_MARKUP_PCT") {
            self.pricing.wholesale_markup_pct =
                parse_env("TRADEFLOW_PRICING_WHOLESALE_MARKUP_PCT", &value)?;
        }
        if let Some(value) = read_env("TRADEFLOW_PRICING_DEFAULT_MARGIN_PCT") {
            self.pricing.default_margin_pct =
                parse_env("TRADEFLOW_PRICING_DEFAULT_MARGIN_PCT", &value)?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(base_currency) = overrides.base_currency {
            self.pricing.base_currency = base_currency;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        validate_pricing(&self.pricing)?;
        Ok(())
    }
}

impl PricingConfig {
    fn apply_patch(&mut self, patch: PricingPatch) {
        let fields = [
            (patch.retail_markup_pct, &mut self.retail_markup_pct),
            (patch.wholesale_markup_pct, &mut self.wholesale_markup_pct),
            (patch.default_margin_pct, &mut self.default_margin_pct),
            (patch.competitive_discount_pct, &mut self.competitive_discount_pct),
            (patch.minimum_margin_pct, &mut self.minimum_margin_pct),
            (patch.volume_base_markup_pct, &mut self.volume_base_markup_pct),
            (patch.dynamic_base_markup_pct, &mut self.dynamic_base_markup_pct),
            (patch.dynamic_demand_adjustment_pct, &mut self.dynamic_demand_adjustment_pct),
            (patch.dynamic_competitor_band_pct, &mut self.dynamic_competitor_band_pct),
            (patch.position_tolerance_pct, &mut self.position_tolerance_pct),
        ];
        for (value, target) in fields {
            if let Some(value) = value {
                *target = value;
            }
        }

        if let Some(base_currency) = patch.base_currency {
            self.base_currency = base_currency;
        }
        // File rates extend the built-in table rather than replacing it.
        if let Some(rates) = patch.exchange_rates {
            for (code, rate) in rates {
                self.exchange_rates.insert(code.trim().to_ascii_uppercase(), rate);
            }
        }
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from(NESTED_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_pricing(pricing: &PricingConfig) -> Result<(), ConfigError> {
    let hundred = Decimal::ONE_HUNDRED;

    for (key, value) in [
        ("pricing.retail_markup_pct", pricing.retail_markup_pct),
        ("pricing.wholesale_markup_pct", pricing.wholesale_markup_pct),
        ("pricing.volume_base_markup_pct", pricing.volume_base_markup_pct),
        ("pricing.dynamic_base_markup_pct", pricing.dynamic_base_markup_pct),
        ("pricing.position_tolerance_pct", pricing.position_tolerance_pct),
    ] {
        if value < Decimal::ZERO {
            return Err(ConfigError::Validation(format!("{key} must not be negative")));
        }
    }

    for (key, value) in [
        ("pricing.default_margin_pct", pricing.default_margin_pct),
        ("pricing.minimum_margin_pct", pricing.minimum_margin_pct),
        ("pricing.competitive_discount_pct", pricing.competitive_discount_pct),
        ("pricing.dynamic_demand_adjustment_pct", pricing.dynamic_demand_adjustment_pct),
        ("pricing.dynamic_competitor_band_pct", pricing.dynamic_competitor_band_pct),
    ] {
        if value < Decimal::ZERO || value >= hundred {
            return Err(ConfigError::Validation(format!("{key} must be in range 0..100")));
        }
    }

    let base = pricing.base_currency.trim();
    if base.len() != 3 || !base.chars().all(|ch| ch.is_ascii_alphabetic()) {
        return Err(ConfigError::Validation(
            "pricing.base_currency must be a 3-letter currency code".to_string(),
        ));
    }

    if let Some((code, _)) = pricing.exchange_rates.iter().find(|(_, rate)| **rate <= Decimal::ZERO)
    {
        return Err(ConfigError::Validation(format!(
            "pricing.exchange_rates.{code} must be greater than zero"
        )));
    }

    let base = base.to_ascii_uppercase();
    let quotes_base =
        pricing.exchange_rates.keys().any(|code| code.trim().eq_ignore_ascii_case(&base));
    if !quotes_base {
        return Err(ConfigError::Validation(format!(
            "pricing.exchange_rates must include the base currency {base}"
        )));
    }

    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
    pricing: Option<PricingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct PricingPatch {
    retail_markup_pct: Option<Decimal>,
    wholesale_markup_pct: Option<Decimal>,
    default_margin_pct: Option<Decimal>,
    competitive_discount_pct: Option<Decimal>,
    minimum_margin_pct: Option<Decimal>,
    volume_base_markup_pct: Option<Decimal>,
    dynamic_base_markup_pct: Option<Decimal>,
    dynamic_demand_adjustment_pct: Option<Decimal>,
    dynamic_competitor_band_pct: Option<Decimal>,
    position_tolerance_pct: Option<Decimal>,
    base_currency: Option<String>,
    exchange_rates: Option<BTreeMap<String, Decimal>>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use rust_decimal::Decimal;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
    use crate::domain::customer::CustomerType;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_validate_and_carry_pricing_constants() -> Result<(), String> {
        let config = AppConfig::default();
        config.validate().map_err(|err| err.to_string())?;

        ensure(
            config.pricing.default_markup_pct(CustomerType::Retail) == Decimal::new(40, 0),
            "retail markup should default to 40",
        )?;
        ensure(
            config.pricing.default_markup_pct(CustomerType::Wholesale) == Decimal::new(25, 0),
            "wholesale markup should default to 25",
        )?;
        ensure(config.pricing.base_currency == "USD", "base currency should default to USD")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_TRADEFLOW_DB_PATH", "/tmp/interpolated.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("tradeflow.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://${TEST_TRADEFLOW_DB_PATH}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite:///tmp/interpolated.db",
                "database url should be interpolated from environment",
            )
        })();

        clear_vars(&["TEST_TRADEFLOW_DB_PATH"]);
        result
    }

    #[test]
    fn missing_interpolation_variable_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(&["TEST_TRADEFLOW_UNSET_VAR"]);

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("tradeflow.toml");
        fs::write(&path, "[database]\nurl = \"${TEST_TRADEFLOW_UNSET_VAR}\"\n")
            .map_err(|err| err.to_string())?;

        let error =
            match AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
            {
                Ok(_) => return Err("expected interpolation failure".to_string()),
                Err(error) => error,
            };
        ensure(
            matches!(error, ConfigError::MissingEnvInterpolation { ref var } if var == "TEST_TRADEFLOW_UNSET_VAR"),
            "missing variable should be named in the error",
        )
    }

    #[test]
    fn pricing_section_overrides_constants_and_extends_rates() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("tradeflow.toml");
        fs::write(
            &path,
            r#"
[pricing]
retail_markup_pct = 45
competitive_discount_pct = "7.5"

[pricing.exchange_rates]
eur = "0.95"
JPY = "151.2"
"#,
        )
        .map_err(|err| err.to_string())?;

        let config =
            AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.pricing.retail_markup_pct == Decimal::new(45, 0), "retail markup from file")?;
        ensure(
            config.pricing.competitive_discount_pct == Decimal::new(75, 1),
            "competitive discount from file",
        )?;
        ensure(
            config.pricing.exchange_rates.get("EUR") == Some(&Decimal::new(95, 2)),
            "file rate should replace built-in EUR rate",
        )?;
        ensure(
            config.pricing.exchange_rates.get("JPY") == Some(&Decimal::new(1512, 1)),
            "file rate should add JPY",
        )?;
        ensure(
            config.pricing.exchange_rates.contains_key("AED"),
            "built-in rates should survive a partial table",
        )
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TRADEFLOW_LOG_LEVEL", "warn");
        env::set_var("TRADEFLOW_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )
        })();

        clear_vars(&["TRADEFLOW_LOG_LEVEL", "TRADEFLOW_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TRADEFLOW_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("TRADEFLOW_SERVER_PORT", "9090");
        env::set_var("TRADEFLOW_PRICING_WHOLESALE_MARKUP_PCT", "22.5");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("tradeflow.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[server]
port = 7070

[logging]
level = "warn"

[pricing]
wholesale_markup_pct = 20
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.server.port == 9090, "env port should win over file")?;
            ensure(
                config.pricing.wholesale_markup_pct == Decimal::new(225, 1),
                "env wholesale markup should win over file",
            )
        })();

        clear_vars(&[
            "TRADEFLOW_DATABASE_URL",
            "TRADEFLOW_SERVER_PORT",
            "TRADEFLOW_PRICING_WHOLESALE_MARKUP_PCT",
        ]);
        result
    }

    #[test]
    fn invalid_env_override_names_the_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TRADEFLOW_SERVER_PORT", "not-a-port");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected env override failure".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(error, ConfigError::InvalidEnvOverride { ref key, .. } if key == "TRADEFLOW_SERVER_PORT"),
                "invalid override should name the env key",
            )
        })();

        clear_vars(&["TRADEFLOW_SERVER_PORT"]);
        result
    }

    #[test]
    fn validation_rejects_margin_of_one_hundred() -> Result<(), String> {
        let mut config = AppConfig::default();
        config.pricing.default_margin_pct = Decimal::ONE_HUNDRED;

        let error = match config.validate() {
            Ok(()) => return Err("expected validation failure".to_string()),
            Err(error) => error,
        };
        ensure(
            matches!(error, ConfigError::Validation(ref message) if message.contains("pricing.default_margin_pct")),
            "validation failure should mention pricing.default_margin_pct",
        )
    }

    #[test]
    fn validation_rejects_non_sqlite_urls_and_bad_rates() -> Result<(), String> {
        let mut config = AppConfig::default();
        config.database.url = "postgres://localhost/tradeflow".to_string();
        ensure(config.validate().is_err(), "postgres url should be rejected")?;

        let mut config = AppConfig::default();
        config.pricing.exchange_rates.insert("EUR".to_string(), Decimal::ZERO);
        let error = match config.validate() {
            Ok(()) => return Err("expected rate validation failure".to_string()),
            Err(error) => error,
        };
        ensure(
            matches!(error, ConfigError::Validation(ref message) if message.contains("exchange_rates.EUR")),
            "validation failure should name the rate",
        )
    }

    #[test]
    fn base_currency_must_be_quoted_in_the_rate_table() -> Result<(), String> {
        let mut config = AppConfig::default();
        config.pricing.base_currency = "eur".to_string();
        ensure(config.validate().is_ok(), "EUR is in the default table")?;

        config.pricing.base_currency = "JPY".to_string();
        let error = match config.validate() {
            Ok(()) => return Err("expected missing base rate failure".to_string()),
            Err(error) => error,
        };
        ensure(
            matches!(error, ConfigError::Validation(ref message) if message.contains("base currency JPY")),
            "validation failure should name the base currency",
        )?;

        config.pricing.exchange_rates.insert("JPY".to_string(), Decimal::new(1512, 1));
        ensure(config.validate().is_ok(), "a quoted JPY rate makes JPY a valid base")
    }

    #[test]
    fn required_file_must_exist() -> Result<(), String> {
        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("absent.toml");

        let error = match AppConfig::load(LoadOptions {
            config_path: Some(path.clone()),
            require_file: true,
            ..LoadOptions::default()
        }) {
            Ok(_) => return Err("expected missing file failure".to_string()),
            Err(error) => error,
        };
        ensure(
            matches!(error, ConfigError::MissingConfigFile(ref missing) if *missing == path),
            "missing file should be reported with its path",
        )
    }
}
