//! In-memory store of demo chat sessions.
//!
//! A session lives from `POST /demo/sessions` until it is deleted or the
//! process exits. Each session sits behind its own mutex so only one pipeline
//! run is in flight per visitor.

use salesvoice_core::{
    chat::{ChatPipeline, ChatSession},
    murf::AudioFormat,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

pub type SharedSession = Arc<Mutex<ChatSession>>;

#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, SharedSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, voice_id: &str) -> (Uuid, SharedSession) {
        let id = Uuid::new_v4();
        let session = Arc::new(Mutex::new(ChatSession::new(voice_id)));
        self.sessions.write().await.insert(id, session.clone());
        info!(session_id = %id, voice_id, "Demo session created");
        (id, session)
    }

    pub async fn get(&self, id: Uuid) -> Option<SharedSession> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Drops the session. Returns `false` if it did not exist.
    pub async fn remove(&self, id: Uuid) -> bool {
        let removed = self.sessions.write().await.remove(&id).is_some();
        if removed {
            info!(session_id = %id, "Demo session closed");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

/// Everything the demo routes need.
pub struct DemoState {
    pub pipeline: ChatPipeline,
    pub sessions: SessionStore,
    pub audio_format: AudioFormat,
    pub gemini_configured: bool,
    pub murf_configured: bool,
}

impl DemoState {
    pub fn new(
        pipeline: ChatPipeline,
        audio_format: AudioFormat,
        gemini_configured: bool,
        murf_configured: bool,
    ) -> Self {
        Self {
            pipeline,
            sessions: SessionStore::new(),
            audio_format,
            gemini_configured,
            murf_configured,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_get_remove() {
        let store = SessionStore::new();
        assert!(store.is_empty().await);

        let (id, _) = store.create("en-US-clint").await;
        assert_eq!(store.len().await, 1);

        let session = store.get(id).await.unwrap();
        assert_eq!(session.lock().await.selected_voice(), "en-US-clint");

        assert!(store.remove(id).await);
        assert!(!store.remove(id).await);
        assert!(store.get(id).await.is_none());
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let store = SessionStore::new();
        let (a, _) = store.create("en-US-ken").await;
        let (b, _) = store.create("en-US-ken").await;
        assert_ne!(a, b);

        store.get(a).await.unwrap().lock().await.select_voice("en-UK-liv");
        assert_eq!(
            store.get(b).await.unwrap().lock().await.selected_voice(),
            "en-US-ken"
        );
    }
}
