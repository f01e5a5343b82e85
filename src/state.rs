use std::{path::Path, sync::Arc};

use reqwest::Client;

use crate::{config::Config, fetch::build_client, profiles::ProfileStore};

pub struct AppState {
    pub config: Config,
    pub profiles: ProfileStore,
    pub http: Client,
}

impl AppState {
    pub fn new() -> Arc<Self> {
        let config = Config::load();

        let profiles =
            ProfileStore::open(Path::new(&config.profiles_path)).expect("Profile store unavailable!");
        let http = build_client(config.fetch_timeout_secs);

        Arc::new(Self {
            config,
            profiles,
            http,
        })
    }

    /// State with an injected store, for tests and embedders.
    pub fn with_store(config: Config, profiles: ProfileStore) -> Arc<Self> {
        let http = build_client(config.fetch_timeout_secs);
        Arc::new(Self {
            config,
            profiles,
            http,
        })
    }
}
