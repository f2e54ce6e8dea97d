use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub consumer_name: String,
    pub handler_timeout: Duration,
    pub max_delivery_attempts: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string());
        let consumer_name =
            env::var("CONSUMER_NAME").unwrap_or_else(|_| "dispatcher-1".to_string());
        let handler_timeout_secs = env::var("HANDLER_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(10);
        let max_delivery_attempts = env::var("MAX_DELIVERY_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(5);

        Ok(Self {
            database_url,
            redis_url,
            consumer_name,
            handler_timeout: Duration::from_secs(handler_timeout_secs),
            max_delivery_attempts,
        })
    }
}
