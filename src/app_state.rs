use std::sync::Arc;

use crate::auth::SessionVerifier;
use crate::db::Store;
use crate::services::{queue::JobQueue, speech::SpeechClient, storage::ArtifactStore};

/// Shared application state passed to all route handlers.
///
/// Clients are constructed once at start-up and injected here; handlers
/// never reach for globals.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub queue: Arc<dyn JobQueue>,
    pub speech: Arc<SpeechClient>,
    pub artifacts: Arc<ArtifactStore>,
    pub sessions: Arc<SessionVerifier>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        queue: Arc<dyn JobQueue>,
        speech: SpeechClient,
        artifacts: ArtifactStore,
        sessions: SessionVerifier,
    ) -> Self {
        Self {
            store,
            queue,
            speech: Arc::new(speech),
            artifacts: Arc::new(artifacts),
            sessions: Arc::new(sessions),
        }
    }
}
