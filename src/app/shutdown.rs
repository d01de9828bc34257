//! Graceful shutdown handling.

use tokio_util::sync::CancellationToken;

use crate::dispatcher::Dispatcher;

/// Stops the progress logger, then the dispatcher.
pub async fn shutdown_gracefully(
    dispatcher: &Dispatcher,
    cancel: CancellationToken,
    logging_task: Option<tokio::task::JoinHandle<()>>,
) {
    cancel.cancel();
    if let Some(logging_task) = logging_task {
        let _ = logging_task.await;
    }

    dispatcher.shutdown().await;
}
