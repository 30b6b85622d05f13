use crate::app::error::Result;
use crate::config::Config;
use crate::fetcher::FetchLadder;
use crate::normalizer::Normalizer;
use crate::sites::Registry;
use crate::store::{JsonStore, Store};

/// Everything one run needs, wired from a resolved [`Config`].
pub struct RunContext {
    pub config: Config,
    pub ladder: FetchLadder,
    pub store: Box<dyn Store>,
    pub registry: Registry,
    pub normalizer: Normalizer,
}

impl RunContext {
    pub fn new(config: Config) -> Result<Self> {
        let ladder = FetchLadder::from_config(&config)?;
        let store = Box::new(JsonStore::from_paths(&config.paths));
        let registry = Registry::from_config(&config);

        Ok(Self::with_parts(config, ladder, store, registry))
    }

    pub fn with_parts(
        config: Config,
        ladder: FetchLadder,
        store: Box<dyn Store>,
        registry: Registry,
    ) -> Self {
        Self {
            config,
            ladder,
            store,
            registry,
            normalizer: Normalizer,
        }
    }

    /// Release the browser session, if one was started
    pub async fn shutdown(&self) {
        self.ladder.shutdown().await;
    }
}
