use std::{env, fmt::Display, str::FromStr};

use anyhow::{bail, Context};
use tracing::info;

use crate::models::{LevelPolicy, DEFAULT_LEVEL_CEILING};

pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub level_policy: LevelPolicy,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(|key| env::var(key).ok())
    }

    /// Builds the config from `lookup`, which returns the raw value of a variable if set.
    pub fn load_from<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .context("DATABASE_URL must be set to a production Postgres instance")?;
        let max_connections = try_load(
            "DATABASE_MAX_CONNECTIONS",
            lookup("DATABASE_MAX_CONNECTIONS"),
            5,
        )?;
        let ceiling: i32 = try_load(
            "LEVEL_CEILING",
            lookup("LEVEL_CEILING"),
            DEFAULT_LEVEL_CEILING,
        )?;
        if ceiling < 1 {
            bail!("LEVEL_CEILING must be at least 1, got {ceiling}");
        }

        Ok(Self {
            database_url,
            max_connections,
            level_policy: LevelPolicy::new(ceiling),
        })
    }
}

fn try_load<T>(key: &str, raw: Option<String>, default: T) -> anyhow::Result<T>
where
    T: FromStr + Display,
    T::Err: Display,
{
    match raw {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {key} value {raw:?}: {e}")),
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}
