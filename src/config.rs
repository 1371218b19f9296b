use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::Error;

/// Straight-line-speed trip duration approximation used by the conflict
/// detector. Road networks are not modelled.
#[derive(Clone, Debug)]
pub struct EstimatorConfig {
    pub base_minutes: f64,
    pub per_wheelchair_minutes: f64,
    pub large_party_threshold: u8,
    pub large_party_minutes: f64,
    pub average_speed_mph: f64,
    pub default_travel_minutes: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            base_minutes: 30.0,
            per_wheelchair_minutes: 15.0,
            large_party_threshold: 4,
            large_party_minutes: 15.0,
            average_speed_mph: 20.0,
            default_travel_minutes: 60.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct MatchingConfig {
    pub distance_weight: f64,
    pub compatibility_weight: f64,
    pub cache_ttl: Duration,
    pub cache_capacity: u64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            distance_weight: 0.4,
            compatibility_weight: 0.6,
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 10_000,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BiddingConfig {
    pub confirmation_window: chrono::Duration,
    pub conflict_window: chrono::Duration,
    pub daily_capacity_hours: f64,
    pub estimator: EstimatorConfig,
}

impl Default for BiddingConfig {
    fn default() -> Self {
        Self {
            confirmation_window: chrono::Duration::hours(24),
            conflict_window: chrono::Duration::minutes(120),
            daily_capacity_hours: 10.0,
            estimator: EstimatorConfig::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct GeocoderConfig {
    pub api_base: String,
    pub timeout: Duration,
    pub retries: u32,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            api_base: "api.postcodes.io".into(),
            timeout: Duration::from_secs(5),
            retries: 1,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub listen_addr: SocketAddr,
    pub geocoder: GeocoderConfig,
    pub matching: MatchingConfig,
    pub bidding: BiddingConfig,
    pub sweep_interval: Option<Duration>,
    pub sweeper_secret: Option<String>,
    pub notify_webhook_url: Option<String>,
}

impl Config {
    /// Reads configuration from the process environment, after loading a
    /// `.env` file when one exists.
    pub fn from_env() -> Result<Self, Error> {
        dotenv::dotenv().ok();

        let geocoder = GeocoderConfig {
            api_base: optional("POSTCODES_API_BASE")
                .unwrap_or_else(|| GeocoderConfig::default().api_base),
            timeout: Duration::from_secs(parse_or("GEOCODER_TIMEOUT_SECS", 5)?),
            retries: parse_or("GEOCODER_RETRIES", 1)?,
        };

        let matching = MatchingConfig {
            distance_weight: parse_or("MATCH_DISTANCE_WEIGHT", 0.4)?,
            compatibility_weight: parse_or("MATCH_COMPATIBILITY_WEIGHT", 0.6)?,
            cache_ttl: Duration::from_secs(parse_or("MATCH_CACHE_TTL_SECS", 300)?),
            cache_capacity: parse_or("MATCH_CACHE_CAPACITY", 10_000)?,
        };

        let bidding = BiddingConfig {
            confirmation_window: chrono::Duration::hours(parse_or(
                "CONFIRMATION_WINDOW_HOURS",
                24,
            )?),
            conflict_window: chrono::Duration::minutes(parse_or("CONFLICT_WINDOW_MINUTES", 120)?),
            daily_capacity_hours: parse_or("DAILY_CAPACITY_HOURS", 10.0)?,
            estimator: EstimatorConfig::default(),
        };

        let sweep_interval = match parse_or::<u64>("SWEEP_INTERVAL_SECS", 3600)? {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL")?,
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 5)?,
            listen_addr: parse_or("LISTEN_ADDR", SocketAddr::from(([127, 0, 0, 1], 3000)))?,
            geocoder,
            matching,
            bidding,
            sweep_interval,
            sweeper_secret: optional("SWEEPER_SECRET"),
            notify_webhook_url: optional("NOTIFY_WEBHOOK_URL"),
        })
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_or<T: FromStr>(key: &str, default: T) -> Result<T, Error> {
    match optional(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::configuration_error(format!("{} has an invalid value", key))),
        None => Ok(default),
    }
}
