use std::{env, fmt::Display, str::FromStr};

use anyhow::{anyhow, Context};
use tracing::{info, warn};

/// Process level settings. Plugin settings such as the course allow-list live
/// in the LMS database, see [`crate::settings`].
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    /// Prefix of every LMS table, `mdl_` on a default install.
    pub db_prefix: String,
    /// Internal id of the front page course; its events are visible to everyone.
    pub site_course_id: i64,
    pub run_migrations: bool,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Ok(Self {
            port: try_load("PORT", "8081")?,
            database_url: env::var("DATABASE_URL").context("DATABASE_URL not set")?,
            db_max_connections: try_load("DB_MAX_CONNECTIONS", "10")?,
            db_prefix: try_load("DB_PREFIX", "mdl_")?,
            site_course_id: try_load("SITE_COURSE_ID", "1")?,
            run_migrations: try_load("RUN_MIGRATIONS", "false")?,
        })
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> anyhow::Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    raw.parse().map_err(|e| {
        warn!("Invalid {key} value: {e}");
        anyhow!("invalid {key} value {raw:?}: {e}")
    })
}
