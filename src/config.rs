use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub email: EmailConfig,
    pub achievements: AchievementConfig,
    pub standings: StandingsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// When absent the service runs against the in-memory store.
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub rust_log: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmailConfig {
    pub webhook_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AchievementConfig {
    pub catalog_path: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StandingsConfig {
    pub points_per_win: i32,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let database_url = optional_var("DATABASE_URL");
        let max_connections: u32 = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "5".to_string())
            .parse()?;
        let port: u16 = env::var("PORT").unwrap_or_else(|_| "8080".to_string()).parse()?;
        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let webhook_url = optional_var("EMAIL_WEBHOOK_URL");
        let catalog_path = optional_var("ACHIEVEMENT_CATALOG_PATH");
        let points_per_win: i32 = env::var("STANDINGS_POINTS_PER_WIN")
            .unwrap_or_else(|_| "1".to_string())
            .parse()?;

        if max_connections == 0 {
            anyhow::bail!("DATABASE_MAX_CONNECTIONS must be at least 1");
        }

        Ok(Config {
            database: DatabaseConfig {
                url: database_url,
                max_connections,
            },
            server: ServerConfig { port, host, rust_log },
            email: EmailConfig { webhook_url },
            achievements: AchievementConfig { catalog_path },
            standings: StandingsConfig { points_per_win },
        })
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}
