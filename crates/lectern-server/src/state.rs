//! Shared application state.

use std::sync::Arc;

use tokio::sync::Semaphore;

use lectern_core::adapters::VideoClient;
use lectern_core::{GatewayConfig, Pipeline, StorageLayout};

use crate::notify::NotificationHub;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    /// Kept alongside the trait object in the pipeline: the streaming proxy
    /// needs the concrete client to open the upstream live stream.
    pub video: Arc<VideoClient>,
    pub hub: Arc<NotificationHub>,
    pub layout: StorageLayout,
    pub config: Arc<GatewayConfig>,
    /// Bounds concurrent pipeline work so a burst of requests cannot
    /// exhaust the upstream services.
    request_semaphore: Arc<Semaphore>,
}

impl AppState {
    pub fn new(
        pipeline: Arc<Pipeline>,
        video: Arc<VideoClient>,
        hub: Arc<NotificationHub>,
        layout: StorageLayout,
        config: Arc<GatewayConfig>,
    ) -> Self {
        let max_concurrent = config.max_concurrent_requests;

        Self {
            pipeline,
            video,
            hub,
            layout,
            config,
            request_semaphore: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    pub async fn acquire_permit(&self) -> tokio::sync::SemaphorePermit<'_> {
        self.request_semaphore
            .acquire()
            .await
            .expect("semaphore is never closed")
    }
}
