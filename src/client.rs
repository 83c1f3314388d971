use std::sync::Arc;

use crate::cache::{CacheOptions, CacheService};
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::fetcher::{Fetcher, HttpTransport, Transport};
use crate::models::Game;
use crate::storage::SessionStore;

pub struct TrackerClient {
    config: ClientConfig,
    fetcher: Arc<Fetcher>,
    cache: CacheService,
}

impl TrackerClient {
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let transport = Arc::new(HttpTransport::new(config.request_timeout)?);
        let session = match config.storage_dir.as_deref() {
            Some(dir) => SessionStore::open(dir),
            None => SessionStore::in_memory(),
        };
        Ok(Self::with_transport(config, transport, session))
    }

    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        session: SessionStore,
    ) -> Self {
        let cache = CacheService::new(CacheOptions::from(&config));
        let fetcher = Arc::new(Fetcher::new(
            config.api_base_url.clone(),
            transport,
            session,
        ));
        Self {
            config,
            fetcher,
            cache,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn fetcher(&self) -> &Arc<Fetcher> {
        &self.fetcher
    }

    pub fn cache(&self) -> &CacheService {
        &self.cache
    }

    pub fn session(&self) -> &SessionStore {
        self.fetcher.session()
    }

    pub fn is_logged_in(&self) -> bool {
        self.session().token().is_some()
    }

    pub fn game(&self) -> Game {
        self.session().game()
    }

    pub fn select_game(&self, game: Game) -> Result<(), ApiError> {
        self.session().set_game(game)?;
        Ok(())
    }
}
