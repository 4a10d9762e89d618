use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::dispatch::Dispatcher;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    /// Cancelled on process shutdown; open WebSocket sessions close on it.
    pub shutdown: CancellationToken,
}
