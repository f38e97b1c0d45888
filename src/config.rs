use std::env;
use std::path::PathBuf;

use anyhow::Context;
use dotenvy::dotenv;
use url::Url;
use validator::Validate;

#[derive(Debug, Clone, Validate)]
pub struct Config {
    /// Postgres URL; `None` selects the in-memory catalog.
    pub database_url: Option<String>,
    #[validate(range(min = 1, max = 100))]
    pub database_max_connections: u32,
    /// DB-stored paths are relative to this directory.
    pub app_root: PathBuf,
    pub uploads_dir: String,
    pub host: String,
    pub port: u16,
    /// Prefix of every QR payload. Resolved once, never recomputed.
    #[validate(url)]
    pub base_url: String,
    pub frontend_urls: Vec<String>,
    #[validate(range(min = 1, max = 1073741824))] // Max 1GiB
    pub max_file_size: u64,
    pub allowed_image_extensions: Vec<String>,
    pub cors_permissive: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        // Load environment variables from `.env` file (if it exists)
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key lookup. `from_env` passes the
    /// process environment; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = var("PORT")
            .map(|v| v.parse::<u16>())
            .transpose()
            .context("PORT must be a port number")?
            .unwrap_or(6301);
        let server_ip = var("SERVER_IP").unwrap_or_else(|| "127.0.0.1".to_string());
        let server_port = var("SERVER_PORT")
            .map(|v| v.parse::<u16>())
            .transpose()
            .context("SERVER_PORT must be a port number")?
            .unwrap_or(port);

        let frontend_urls = split_list(
            &var("FRONTEND_URLS").unwrap_or_else(|| "http://localhost:3000".to_string()),
            false,
        );

        let base_url = resolve_base_url(
            var("PUBLIC_BASE_URL").as_deref(),
            &frontend_urls,
            &server_ip,
            server_port,
        );

        let config = Config {
            database_url: var("DATABASE_URL"),
            database_max_connections: var("DATABASE_MAX_CONNECTIONS")
                .map(|v| v.parse::<u32>())
                .transpose()
                .context("DATABASE_MAX_CONNECTIONS must be a number")?
                .unwrap_or(5),
            app_root: PathBuf::from(var("APP_ROOT").unwrap_or_else(|| ".".to_string())),
            uploads_dir: var("UPLOADS_DIR").unwrap_or_else(|| "uploads".to_string()),
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            base_url,
            frontend_urls,
            max_file_size: var("MAX_FILE_SIZE")
                .map(|v| v.parse::<u64>())
                .transpose()
                .context("MAX_FILE_SIZE must be a number of bytes")?
                .unwrap_or(104_857_600),
            allowed_image_extensions: split_list(
                &var("ALLOWED_IMAGE_EXTENSIONS")
                    .unwrap_or_else(|| "jpg,jpeg,png,gif,webp".to_string()),
                true,
            ),
            cors_permissive: var("CORS_PERMISSIVE")
                .map(|v| v.parse::<bool>())
                .transpose()
                .context("CORS_PERMISSIVE must be true or false")?
                .unwrap_or(true),
        };

        // Validate configuration values (e.g. file size range)
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn split_list(raw: &str, lowercase: bool) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| if lowercase { s.to_lowercase() } else { s.to_string() })
        .collect()
}

fn is_loopback_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1" | "[::1]")
}

/// Base URL embedded in QR codes.
///
/// An explicit public URL wins. Otherwise the first frontend origin that is
/// not a loopback host is used on port 80, since the service sits behind the
/// same reverse proxy as the frontend. Failing both, the server's own
/// address.
pub fn resolve_base_url(
    public: Option<&str>,
    frontend_urls: &[String],
    server_ip: &str,
    server_port: u16,
) -> String {
    if let Some(public) = public {
        return public.trim_end_matches('/').to_string();
    }

    let proxied_host = frontend_urls
        .iter()
        .filter_map(|raw| Url::parse(raw).ok())
        .filter_map(|url| url.host_str().map(str::to_string))
        .find(|host| !is_loopback_host(host));

    match proxied_host {
        Some(host) => format!("http://{}", host),
        None => format!("http://{}:{}", server_ip, server_port),
    }
}
