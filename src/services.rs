use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::settings::Settings;

pub mod http;
pub mod redemption;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Communication error: {0} - {1}")]
    Communication(String, String),
}

#[async_trait]
pub trait RequestHandler<T>: Send + Sync + 'static
where
    T: Send + 'static,
{
    async fn handle_request(&self, request: T);
}

/// Request loop shared by every service: each message is handled on its own
/// task with a clone of the handler, so requests never wait on each other.
#[async_trait]
pub trait Service<T, H>: Send + Sync + 'static
where
    T: Send + 'static,
    H: RequestHandler<T> + Clone + Send,
{
    async fn run(&mut self, handler: H, receiver: &mut mpsc::Receiver<T>) {
        while let Some(request) = receiver.recv().await {
            let handler = handler.clone();

            tokio::spawn(async move {
                handler.handle_request(request).await;
            });
        }

        log::info!("Request channel closed, service loop stopped.");
    }
}

pub async fn start_services(
    handler: redemption::RedemptionRequestHandler,
    settings: Settings,
) -> Result<(), anyhow::Error> {
    let (redemption_tx, mut redemption_rx) = mpsc::channel(settings.service.channel_capacity);
    let mut redemption_service = redemption::RedemptionService::new();

    log::info!("Starting redemption service.");
    tokio::spawn(async move {
        redemption_service.run(handler, &mut redemption_rx).await;
    });

    log::info!("Starting HTTP server.");
    http::start_http_server(&settings.server.listen, redemption_tx).await
}
