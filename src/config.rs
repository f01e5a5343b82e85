use std::{env, fmt::Display, str::FromStr};

use tracing::{info, warn};

pub struct Config {
    pub port: u16,
    pub wiki_host: String,
    pub dico_host: String,
    pub profiles_path: String,
    pub fetch_timeout_secs: u64,
}

impl Config {
    pub fn load() -> Self {
        Self {
            port: try_load("PAGEVOILE_PORT", "3000"),
            wiki_host: try_load("PAGEVOILE_WIKI_HOST", "fr.m.wikipedia.org"),
            dico_host: try_load("PAGEVOILE_DICO_HOST", "fr.m.wiktionary.org"),
            profiles_path: try_load("PAGEVOILE_PROFILES", "config.json"),
            fetch_timeout_secs: try_load("PAGEVOILE_FETCH_TIMEOUT", "10"),
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}
