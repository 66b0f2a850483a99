use std::sync::Arc;

use crate::config::Config;
use crate::service::coordinator::AccountCoordinator;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<AccountCoordinator>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        AppState {
            coordinator: Arc::new(AccountCoordinator::new(config.clone())),
            config,
        }
    }
}
