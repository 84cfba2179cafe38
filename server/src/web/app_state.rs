use std::sync::Arc;

use crate::engine::broker::RoomBroker;

/// Shared state for the web layer. The broker is the only stateful
/// collaborator; everything else upstream of it is out of process.
pub struct AppState {
    pub broker: Arc<RoomBroker>,
}
