use crate::config::AppConfig;
use crate::core::StatusBoard;
use crate::core::provider::{self, ProviderConnector};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub connector: Arc<dyn ProviderConnector>,
    pub board: StatusBoard,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Self {
        let connector = provider::create_connector(&config);
        Self::with_connector(config, connector)
    }

    pub fn with_connector(config: AppConfig, connector: Arc<dyn ProviderConnector>) -> Self {
        Self {
            config: Arc::new(config),
            connector,
            board: StatusBoard::new(),
        }
    }
}
