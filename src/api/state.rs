use std::sync::Arc;

use crate::detect::engine::DetectionEngine;
use crate::notify::AlertNotifier;
use crate::storage::Pool;

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub engine: Arc<DetectionEngine>,
    pub notifier: Arc<AlertNotifier>,
}
