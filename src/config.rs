use serde::Deserialize;

/// Which persistence backend holds tokens and access logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    /// In-process store. Contents are lost on restart.
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub store: StoreBackend,
    /// Public origin used to build access URLs, without trailing slash.
    pub base_url: String,
    /// Where denied bearers are sent. Falls back to `base_url`.
    pub denial_url: Option<String>,
    pub admin_key: Option<String>,
    /// Period of the expiry reclaimer in seconds.
    /// Set via PRIVLINK_SWEEP_INTERVAL_SECS env var. Default: 86400 (daily).
    pub sweep_interval_secs: u64,
}

impl Config {
    /// Returns the redirect target for every denied access.
    pub fn denial_url(&self) -> String {
        self.denial_url
            .clone()
            .unwrap_or_else(|| format!("{}/", self.base_url))
    }
}

pub fn load() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();

    let store = match std::env::var("PRIVLINK_STORE")
        .unwrap_or_else(|_| "postgres".into())
        .to_ascii_lowercase()
        .as_str()
    {
        "postgres" | "postgresql" => StoreBackend::Postgres,
        "memory" => StoreBackend::Memory,
        other => anyhow::bail!(
            "PRIVLINK_STORE must be 'postgres' or 'memory', got '{}'",
            other
        ),
    };

    let sweep_interval_secs: u64 = parse_var("PRIVLINK_SWEEP_INTERVAL_SECS", 86_400)?;
    if sweep_interval_secs == 0 {
        anyhow::bail!("PRIVLINK_SWEEP_INTERVAL_SECS must be positive");
    }

    let admin_key = std::env::var("PRIVLINK_ADMIN_KEY")
        .ok()
        .filter(|k| !k.is_empty());
    if admin_key.is_none() {
        eprintln!("⚠️  PRIVLINK_ADMIN_KEY is not set — the management API will reject every request.");
    }

    Ok(Config {
        port: parse_var("PRIVLINK_PORT", 8080)?,
        database_url: std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/privlink".into()),
        store,
        base_url: normalize_base_url(
            &std::env::var("PRIVLINK_BASE_URL").unwrap_or_else(|_| "http://localhost:8080".into()),
        ),
        denial_url: std::env::var("PRIVLINK_DENIAL_URL")
            .ok()
            .filter(|u| !u.is_empty()),
        admin_key,
        sweep_interval_secs,
    })
}

/// Unset or empty falls back to `default`; anything else must parse.
fn parse_var<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => parse_value(key, &raw),
        _ => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("{} has invalid value '{}': {}", key, raw, e))
}

fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}
