use crate::moderation::ModerationGate;
use crate::storage::StorageBackend;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Shared services handed to every content operation and request handler.
#[derive(Clone)]
pub struct AppContext {
    pub db: DatabaseConnection,
    pub gate: Arc<ModerationGate>,
    pub storage: Arc<dyn StorageBackend>,
    /// Upper bound for an uploaded image, in bytes
    pub max_image_bytes: usize,
}

impl AppContext {
    pub fn new(
        db: DatabaseConnection,
        gate: Arc<ModerationGate>,
        storage: Arc<dyn StorageBackend>,
        max_image_bytes: usize,
    ) -> Self {
        Self {
            db,
            gate,
            storage,
            max_image_bytes,
        }
    }
}
