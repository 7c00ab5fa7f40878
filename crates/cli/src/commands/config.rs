use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use toml::Value;
use tradeflow_core::config::{AppConfig, LoadOptions, DEFAULT_CONFIG_FILE, NESTED_CONFIG_FILE};

struct Entry {
    key_path: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

impl Entry {
    fn new(key_path: &'static str, value: impl ToString, env_keys: &'static [&'static str]) -> Self {
        Self { key_path, value: value.to_string(), env_keys }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for entry in entries(&config) {
        let source = field_source(
            entry.key_path,
            entry.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(entry.key_path, &entry.value, source));
    }

    lines.join("\n")
}

fn entries(config: &AppConfig) -> Vec<Entry> {
    let pricing = &config.pricing;
    let rates = pricing
        .exchange_rates
        .iter()
        .map(|(code, rate)| format!("{code}={rate}"))
        .collect::<Vec<_>>()
        .join(", ");

    vec![
        Entry::new("database.url", &config.database.url, &["TRADEFLOW_DATABASE_URL"]),
        Entry::new(
            "database.max_connections",
            config.database.max_connections,
            &["TRADEFLOW_DATABASE_MAX_CONNECTIONS"],
        ),
        Entry::new(
            "database.timeout_secs",
            config.database.timeout_secs,
            &["TRADEFLOW_DATABASE_TIMEOUT_SECS"],
        ),
        Entry::new(
            "server.bind_address",
            &config.server.bind_address,
            &["TRADEFLOW_SERVER_BIND_ADDRESS"],
        ),
        Entry::new("server.port", config.server.port, &["TRADEFLOW_SERVER_PORT"]),
        Entry::new(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs,
            &["TRADEFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        ),
        Entry::new(
            "logging.level",
            &config.logging.level,
            &["TRADEFLOW_LOGGING_LEVEL", "TRADEFLOW_LOG_LEVEL"],
        ),
        Entry::new(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["TRADEFLOW_LOGGING_FORMAT", "TRADEFLOW_LOG_FORMAT"],
        ),
        Entry::new(
            "pricing.base_currency",
            &pricing.base_currency,
            &["TRADEFLOW_PRICING_BASE_CURRENCY"],
        ),
        Entry::new(
            "pricing.retail_markup_pct",
            pricing.retail_markup_pct,
            &["TRADEFLOW_PRICING_RETAIL_MARKUP_PCT"],
        ),
        Entry::new(
            "pricing.wholesale_markup_pct",
            pricing.wholesale_markup_pct,
            &["TRADEFLOW_PRICING_WHOLESALE_MARKUP_PCT"],
        ),
        Entry::new(
            "pricing.default_margin_pct",
            pricing.default_margin_pct,
            &["TRADEFLOW_PRICING_DEFAULT_MARGIN_PCT"],
        ),
        Entry::new("pricing.competitive_discount_pct", pricing.competitive_discount_pct, &[]),
        Entry::new("pricing.minimum_margin_pct", pricing.minimum_margin_pct, &[]),
        Entry::new("pricing.volume_base_markup_pct", pricing.volume_base_markup_pct, &[]),
        Entry::new("pricing.dynamic_base_markup_pct", pricing.dynamic_base_markup_pct, &[]),
        Entry::new(
            "pricing.dynamic_demand_adjustment_pct",
            pricing.dynamic_demand_adjustment_pct,
            &[],
        ),
        Entry::new(
            "pricing.dynamic_competitor_band_pct",
            pricing.dynamic_competitor_band_pct,
            &[],
        ),
        Entry::new("pricing.position_tolerance_pct", pricing.position_tolerance_pct, &[]),
        Entry::new("pricing.exchange_rates", rates, &[]),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [DEFAULT_CONFIG_FILE, NESTED_CONFIG_FILE]
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
