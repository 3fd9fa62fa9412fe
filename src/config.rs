use crate::error::TailError;
use crate::severity::LevelFilter;
use crate::types::SortOrder;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PROVIDER_DOMAIN: &str = "jedox.com";
pub const DEFAULT_POLL_INTERVAL_SECS: f64 = 2.0;
pub const DEFAULT_MAX_LINES: usize = 20;

pub const KNOWN_SERVICES: [&str; 12] = [
    "In-Memory",
    "Spreadsheet",
    "Apache",
    "Integrator",
    "RPC",
    "PSF",
    "Supervision",
    "Scheduler",
    "AI",
    "OData",
    "Views Backend",
    "Access Logs",
];

const NAIVE_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

#[derive(Parser, Debug, Default)]
#[clap(name = "api-tail", version, about = "Follow a remote logs API like tail -f")]
pub struct Cli {
    /// Path to an optional TOML configuration file
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Cloud instance whose logs endpoint is polled
    #[clap(long, alias = "cloud_instance")]
    pub cloud_instance: Option<String>,

    /// Domain the instance lives under
    #[clap(long, alias = "provider_domain")]
    pub provider_domain: Option<String>,

    /// Full logs URL, replaces the instance-derived one
    #[clap(long)]
    pub endpoint: Option<String>,

    /// Bearer token
    #[clap(long)]
    pub token: Option<String>,

    /// Poll interval in seconds
    #[clap(long)]
    pub interval: Option<f64>,

    /// Number of rendered lines kept for scrollback
    #[clap(long, alias = "max_lines")]
    pub max_lines: Option<usize>,

    /// Level filter: info, warning, error, debug, or <level>_only
    #[clap(long)]
    pub level: Option<String>,

    /// Only show logs of this service
    #[clap(long)]
    pub service: Option<String>,

    /// Lower bound, ISO 8601
    #[clap(long, alias = "from_date")]
    pub from_date: Option<String>,

    /// Upper bound, ISO 8601
    #[clap(long, alias = "to_date")]
    pub to_date: Option<String>,

    /// Sort order requested from the server: asc or desc
    #[clap(long)]
    pub sort: Option<String>,

    /// Disable colored output
    #[clap(long)]
    pub no_color: bool,

    /// Log debug diagnostics to stderr
    #[clap(short, long)]
    pub verbose: bool,
}

/// Unvalidated settings, as read from the config file and the command line.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    pub cloud_instance: Option<String>,
    pub provider_domain: Option<String>,
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub interval: Option<f64>,
    pub max_lines: Option<usize>,
    pub level: Option<String>,
    pub service: Option<String>,
    pub from_date: Option<String>,
    pub to_date: Option<String>,
    pub sort: Option<String>,
}

/// Where and how to reach the logs API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub url: String,
    pub token: Option<String>,
}

/// Resolved, immutable filter and polling parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryConfig {
    pub level: LevelFilter,
    pub service: Option<String>,
    /// Forwarded verbatim as the `from` parameter once validated
    pub from_time: Option<String>,
    pub to_time: Option<String>,
    pub sort_order: SortOrder,
    pub poll_interval: Duration,
    pub max_lines: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            level: LevelFilter::default(),
            service: None,
            from_time: None,
            to_time: None,
            sort_order: SortOrder::default(),
            poll_interval: Duration::from_secs_f64(DEFAULT_POLL_INTERVAL_SECS),
            max_lines: DEFAULT_MAX_LINES,
        }
    }
}

impl QueryConfig {
    /// Comma-joined level set sent to the server.
    pub fn level_set(&self) -> String {
        self.level.query_value()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TailSettings {
    pub endpoint: Endpoint,
    pub query: QueryConfig,
}

pub fn load_config(cli: &Cli) -> Result<Settings> {
    let mut settings = match cli.config {
        Some(ref path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content).context("Failed to parse config file")?
        }
        None => Settings::default(),
    };

    settings.apply_cli(cli);
    Ok(settings)
}

impl Settings {
    /// CLI values win over file values.
    pub fn apply_cli(&mut self, cli: &Cli) {
        overlay(&mut self.cloud_instance, &cli.cloud_instance);
        overlay(&mut self.provider_domain, &cli.provider_domain);
        overlay(&mut self.endpoint, &cli.endpoint);
        overlay(&mut self.token, &cli.token);
        overlay(&mut self.interval, &cli.interval);
        overlay(&mut self.max_lines, &cli.max_lines);
        overlay(&mut self.level, &cli.level);
        overlay(&mut self.service, &cli.service);
        overlay(&mut self.from_date, &cli.from_date);
        overlay(&mut self.to_date, &cli.to_date);
        overlay(&mut self.sort, &cli.sort);
    }

    /// Validate everything before any request is made.
    pub fn resolve(&self) -> Result<TailSettings, TailError> {
        let endpoint = self.resolve_endpoint()?;
        let query = self.resolve_query()?;
        Ok(TailSettings { endpoint, query })
    }

    fn resolve_endpoint(&self) -> Result<Endpoint, TailError> {
        let url = match (non_empty(&self.endpoint), non_empty(&self.cloud_instance)) {
            (Some(url), _) => {
                reqwest::Url::parse(url)
                    .map_err(|e| TailError::config("endpoint", format!("'{}': {}", url, e)))?;
                url.to_string()
            }
            (None, Some(instance)) => {
                let domain =
                    non_empty(&self.provider_domain).unwrap_or(DEFAULT_PROVIDER_DOMAIN);
                format!("https://logs.{}.cloud.{}/logs", instance, domain)
            }
            (None, None) => {
                return Err(TailError::config(
                    "cloud_instance",
                    "required unless an endpoint URL is given",
                ))
            }
        };

        Ok(Endpoint {
            url,
            token: non_empty(&self.token).map(str::to_string),
        })
    }

    fn resolve_query(&self) -> Result<QueryConfig, TailError> {
        let defaults = QueryConfig::default();

        let level = match non_empty(&self.level) {
            Some(raw) => LevelFilter::parse(raw)?,
            None => defaults.level,
        };

        let service = non_empty(&self.service)
            .map(resolve_service)
            .transpose()?;

        let from = non_empty(&self.from_date)
            .map(|v| parse_iso8601("from_date", v).map(|at| (v, at)))
            .transpose()?;
        let to = non_empty(&self.to_date)
            .map(|v| parse_iso8601("to_date", v).map(|at| (v, at)))
            .transpose()?;

        if let (Some((from_raw, from_at)), Some((to_raw, to_at))) = (from, to) {
            if from_at >= to_at {
                return Err(TailError::config(
                    "from_date",
                    format!(
                        "from_date ({}) must be anterior to to_date ({})",
                        from_raw, to_raw
                    ),
                ));
            }
        }

        let sort_order = match non_empty(&self.sort) {
            Some(raw) => SortOrder::parse(raw)?,
            None => defaults.sort_order,
        };

        let poll_interval = match self.interval {
            Some(secs) if secs > 0.0 => Duration::try_from_secs_f64(secs).map_err(|e| {
                TailError::config("interval", format!("{} seconds is out of range: {}", secs, e))
            })?,
            Some(secs) => {
                return Err(TailError::config(
                    "interval",
                    format!("{} is not a positive number of seconds", secs),
                ))
            }
            None => defaults.poll_interval,
        };

        let max_lines = match self.max_lines {
            Some(0) => return Err(TailError::config("max_lines", "must be at least 1")),
            Some(n) => n,
            None => defaults.max_lines,
        };

        Ok(QueryConfig {
            level,
            service,
            from_time: from.map(|(raw, _)| raw.to_string()),
            to_time: to.map(|(raw, _)| raw.to_string()),
            sort_order,
            poll_interval,
            max_lines,
        })
    }
}

fn overlay<T: Clone>(target: &mut Option<T>, value: &Option<T>) {
    if let Some(v) = value {
        *target = Some(v.clone());
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn resolve_service(raw: &str) -> Result<String, TailError> {
    KNOWN_SERVICES
        .iter()
        .find(|known| known.eq_ignore_ascii_case(raw))
        .map(|known| known.to_string())
        .ok_or_else(|| {
            TailError::config(
                "service",
                format!("unknown service '{}' (expected one of: {})", raw, KNOWN_SERVICES.join(", ")),
            )
        })
}

/// Parse a user supplied bound. Values without an offset are taken as UTC.
pub fn parse_iso8601(field: &'static str, value: &str) -> Result<DateTime<Utc>, TailError> {
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Ok(at.with_timezone(&Utc));
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(at) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(at.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|at| at.and_utc())
        .ok_or_else(|| {
            TailError::config(
                field,
                format!(
                    "'{}' must be in ISO8601 format (YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS)",
                    value
                ),
            )
        })
}
