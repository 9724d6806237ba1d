use crate::config::ServerConfig;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use vigil_store::AlertStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<AlertStore>,
    pub start_time: DateTime<Utc>,
    pub config: Arc<ServerConfig>,
}
