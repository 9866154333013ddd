use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// ERP settings are optional here; they are validated when the ERP is first called.
    pub odoo_url: Option<String>,
    pub odoo_db: Option<String>,
    pub odoo_username: Option<String>,
    pub odoo_password: Option<String>,
    pub odoo_max_attempts: usize,
    pub odoo_backoff_ms: u64,
    pub memoize_partner_lookups: bool,
    pub stripe_secret_key: Option<String>,
    pub stripe_base_url: String,
    pub api_token: Option<String>,
    pub debug_dump_dir: Option<PathBuf>,
    pub debug_partner_details: bool,
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.trim().is_empty())
}

fn bool_var(name: &str, default: bool) -> anyhow::Result<bool> {
    match optional_var(name) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => anyhow::bail!("{} must be true or false", name),
        },
    }
}

/// Validates an http(s) base URL and strips any trailing slash.
fn http_base_url(name: &str, raw: &str) -> anyhow::Result<String> {
    let parsed = url::Url::parse(raw.trim())
        .map_err(|e| anyhow::anyhow!("{} is not a valid URL: {}", name, e))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        anyhow::bail!("{} must be an http:// or https:// URL", name);
    }
    Ok(raw.trim().trim_end_matches('/').to_string())
}

fn database_url_from_env() -> anyhow::Result<String> {
    std::env::var("DB_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map_err(|_| anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required"))
        .and_then(|url| {
            if url.trim().is_empty() {
                anyhow::bail!("DB_URL cannot be empty");
            }
            if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
            }
            Ok(url)
        })
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::load(database_url_from_env()?)
    }

    /// ERP and processor settings only, for command-line tools that never
    /// touch the database. `database_url` is left empty.
    pub fn from_env_without_database() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::load(String::new())
    }

    fn load(database_url: String) -> anyhow::Result<Self> {
        let config = Self {
            database_url,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            odoo_url: optional_var("ODOO_URL")
                .map(|url| http_base_url("ODOO_URL", &url))
                .transpose()?,
            odoo_db: optional_var("ODOO_DB"),
            odoo_username: optional_var("ODOO_USERNAME"),
            odoo_password: optional_var("ODOO_PASSWORD"),
            odoo_max_attempts: optional_var("ODOO_MAX_ATTEMPTS")
                .map(|raw| raw.parse::<usize>())
                .transpose()
                .map_err(|_| anyhow::anyhow!("ODOO_MAX_ATTEMPTS must be a positive number"))?
                .unwrap_or(3)
                .max(1),
            odoo_backoff_ms: optional_var("ODOO_BACKOFF_MS")
                .map(|raw| raw.parse::<u64>())
                .transpose()
                .map_err(|_| anyhow::anyhow!("ODOO_BACKOFF_MS must be a number of milliseconds"))?
                .unwrap_or(1000),
            memoize_partner_lookups: bool_var("MEMOIZE_PARTNER_LOOKUPS", true)?,
            stripe_secret_key: optional_var("STRIPE_SECRET_KEY"),
            stripe_base_url: http_base_url(
                "STRIPE_BASE_URL",
                &optional_var("STRIPE_BASE_URL")
                    .unwrap_or_else(|| "https://api.stripe.com".to_string()),
            )?,
            api_token: optional_var("API_TOKEN"),
            debug_dump_dir: optional_var("DEBUG_DUMP_DIR").map(PathBuf::from),
            debug_partner_details: bool_var("DEBUG_PARTNER_DETAILS", false)?,
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        if !config.database_url.is_empty() {
            tracing::debug!(
                "Database URL: {}...",
                &config.database_url[..20.min(config.database_url.len())]
            );
        }
        match config.odoo_url {
            Some(ref url) => tracing::debug!("ERP URL: {}", url),
            None => tracing::warn!("ODOO_URL not set; ERP calls will fail until configured"),
        }
        if config.stripe_secret_key.is_none() {
            tracing::warn!("STRIPE_SECRET_KEY not set; payment processor lookups disabled");
        }
        if config.api_token.is_none() {
            tracing::warn!("API_TOKEN not set; session gate only checks X-User-Email");
        }
        tracing::debug!(
            "ERP retry policy: {} attempts, {}ms base backoff",
            config.odoo_max_attempts,
            config.odoo_backoff_ms
        );
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }

    /// Credentials for the ERP, as configured. Not validated until used.
    pub fn odoo_credentials(&self) -> crate::request_builder::OdooCredentials {
        crate::request_builder::OdooCredentials {
            url: self.odoo_url.clone(),
            database: self.odoo_db.clone(),
            username: self.odoo_username.clone(),
            password: self.odoo_password.clone(),
        }
    }
}
