use std::collections::BTreeMap;

use super::{
    ExchangeClient, binance, okx,
    options::{ExchangeOptions, OptionMap},
};
use crate::model::{HistoryError, Result};

/// Builds a client from parsed options.
pub type Constructor = Box<
    dyn Fn(&ExchangeOptions) -> std::result::Result<Box<dyn ExchangeClient>, String> + Send + Sync,
>;

/// Maps exchange ids to client constructors.
pub struct Registry {
    constructors: BTreeMap<String, Constructor>,
}

impl Default for Registry {
    /// Registry with every exchange this crate ships a client for.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(okx::ID, okx::OkxClient::connect);
        registry.register(binance::ID, binance::BinanceClient::connect);
        registry
    }
}

impl Registry {
    pub fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    pub fn register<F>(&mut self, id: &str, constructor: F)
    where
        F: Fn(&ExchangeOptions) -> std::result::Result<Box<dyn ExchangeClient>, String>
            + Send
            + Sync
            + 'static,
    {
        self.constructors.insert(id.to_string(), Box::new(constructor));
    }

    /// Registered ids in alphabetical order.
    pub fn ids(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    /// Instantiates the client registered under `exchange_id` with the merged `options`.
    pub fn create(
        &self,
        exchange_id: &str,
        options: &OptionMap,
    ) -> Result<Box<dyn ExchangeClient>> {
        log::info!("Initializing exchange API: {}", exchange_id);

        let constructor = self.constructors.get(exchange_id).ok_or_else(|| {
            let err = HistoryError::ClientInit(format!(
                "unsupported exchange {}, expected one of {}",
                exchange_id,
                self.ids().join(", ")
            ));
            log::error!("Failed to initialize exchange API: {}", err);
            err
        })?;

        ExchangeOptions::from_map(options)
            .and_then(|options| constructor(&options))
            .map_err(|e| {
                log::error!("Failed to initialize exchange API {}: {}", exchange_id, e);
                HistoryError::ClientInit(format!("{}: {}", exchange_id, e))
            })
    }
}
