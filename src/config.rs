use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use anyhow::{anyhow, Result};
use tracing::info;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub books_catalog: PathBuf,
    pub genres_catalog: Option<PathBuf>,
    pub session_ttl_hours: i64,
    pub cookie_secure: bool,
}

impl Config {
    /// 读取 `.env` 和环境变量
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        Ok(Self {
            database_url: try_load("DATABASE_URL", "sqlite://instance/db.sqlite?mode=rwc")?,
            port: try_load("PORT", "5000")?,
            books_catalog: try_load("BOOKS_CATALOG", "instance/books_catalog.json")?,
            genres_catalog: env::var("GENRES_CATALOG").ok().map(PathBuf::from),
            session_ttl_hours: try_load("SESSION_TTL_HOURS", "168")?,
            cookie_secure: try_load("COOKIE_SECURE", "false")?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            port: 5000,
            books_catalog: PathBuf::from("instance/books_catalog.json"),
            genres_catalog: None,
            session_ttl_hours: 168,
            cookie_secure: false,
        }
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} 未设置，使用默认值: {default}");
        default.to_string()
    });

    raw.parse()
        .map_err(|e| anyhow!("Invalid {key} value {raw:?}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_variable_falls_back_to_default() {
        let port: u16 = try_load("BOOKSHOP_TEST_UNSET_PORT", "8080").unwrap();
        assert_eq!(port, 8080);
    }

    #[test]
    fn unparsable_value_is_an_error() {
        let result: Result<u16> = try_load("BOOKSHOP_TEST_UNSET_BAD", "not-a-port");
        assert!(result.is_err());
    }
}
