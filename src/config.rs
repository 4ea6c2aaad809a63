use crate::gateway::GatewayConfig;
use std::{env, path::PathBuf};
use thiserror::Error;
use url::Url;

pub const DEFAULT_CACHE_VERSION: &str = "health-tracker-v1.0.2";

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_DATA_PATH: &str = "data/cache.json";
const DEFAULT_UPSTREAM_ORIGIN: &str = "http://127.0.0.1:8000/";
const DEFAULT_OFFLINE_PAGE: &str = "./login.html";
const DEFAULT_BACKEND_HOSTS: [&str; 2] = ["script.google.com", "script.googleusercontent.com"];

const DEFAULT_SHELL_MANIFEST: [&str; 21] = [
    "./",
    "./index.html",
    "./login.html",
    "./dashboard.html",
    "./change_password.html",
    "./admin.html",
    "./css/style.css",
    "./js/api.js",
    "./js/auth.js",
    "./js/charts.js",
    "./js/admin.js",
    "./js/pwa.js",
    "./manifest.json",
    "./icons/icon-192x192.png",
    "./icons/icon-512x512.png",
    "https://cdn.jsdelivr.net/npm/bootstrap@5.3.2/dist/css/bootstrap.min.css",
    "https://cdn.jsdelivr.net/npm/bootstrap-icons@1.11.1/font/bootstrap-icons.css",
    "https://cdn.jsdelivr.net/npm/sweetalert2@11/dist/sweetalert2.min.css",
    "https://cdn.jsdelivr.net/npm/bootstrap@5.3.2/dist/js/bootstrap.bundle.min.js",
    "https://cdn.jsdelivr.net/npm/sweetalert2@11",
    "https://cdn.jsdelivr.net/npm/chart.js",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("PORT must be a port number, got {0:?}")]
    InvalidPort(String),

    #[error("{key} is not a valid URL: {source}")]
    InvalidUrl {
        key: &'static str,
        #[source]
        source: url::ParseError,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_path: PathBuf,
    pub upstream_origin: Url,
    pub backend_url: Option<Url>,
    pub gateway: GatewayConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let port = match var("PORT") {
            Some(value) => value
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(value))?,
            None => DEFAULT_PORT,
        };

        let data_path = var("APP_DATA_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_PATH));

        let mut origin =
            var("UPSTREAM_ORIGIN").unwrap_or_else(|| DEFAULT_UPSTREAM_ORIGIN.to_string());
        // Relative manifest entries resolve against the origin's directory.
        if !origin.ends_with('/') {
            origin.push('/');
        }
        let upstream_origin = parse_url("UPSTREAM_ORIGIN", &origin)?;

        let backend_url = var("BACKEND_URL")
            .map(|value| parse_url("BACKEND_URL", &value))
            .transpose()?;

        let mut backend_hosts = match var("BACKEND_HOSTS") {
            Some(value) => split_list(&value),
            None => DEFAULT_BACKEND_HOSTS.iter().map(|host| host.to_string()).collect(),
        };
        if let Some(host) = backend_url.as_ref().and_then(Url::host_str) {
            if !backend_hosts.iter().any(|known| known.eq_ignore_ascii_case(host)) {
                backend_hosts.push(host.to_string());
            }
        }

        let manifest = match var("SHELL_MANIFEST") {
            Some(value) => split_list(&value),
            None => DEFAULT_SHELL_MANIFEST.iter().map(|entry| entry.to_string()).collect(),
        };
        let manifest = manifest
            .iter()
            .map(|entry| resolve(&upstream_origin, "SHELL_MANIFEST", entry))
            .collect::<Result<Vec<_>, _>>()?;

        let offline_page = resolve(
            &upstream_origin,
            "OFFLINE_PAGE",
            &var("OFFLINE_PAGE").unwrap_or_else(|| DEFAULT_OFFLINE_PAGE.to_string()),
        )?;

        Ok(Self {
            port,
            data_path,
            backend_url,
            gateway: GatewayConfig {
                version: var("CACHE_VERSION").unwrap_or_else(|| DEFAULT_CACHE_VERSION.to_string()),
                manifest,
                backend_hosts,
                offline_page,
            },
            upstream_origin,
        })
    }
}

fn parse_url(key: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value.trim()).map_err(|source| ConfigError::InvalidUrl { key, source })
}

fn resolve(base: &Url, key: &'static str, entry: &str) -> Result<Url, ConfigError> {
    base.join(entry.trim())
        .map_err(|source| ConfigError::InvalidUrl { key, source })
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
