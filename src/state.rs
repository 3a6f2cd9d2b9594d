use std::sync::Arc;

use crate::blob::BlobStore;
use crate::config::Config;
use crate::realtime::ConnectionRegistry;
use crate::store::ChatStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ChatStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub registry: ConnectionRegistry,
    pub config: Arc<Config>,
}
