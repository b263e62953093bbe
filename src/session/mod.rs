//! Session Store: `SessionState` and the process-wide map of live sessions.
//!
//! A `SessionState` is the orchestrator's single source of truth for one
//! user's in-progress work: connection info, preferences, the last scan,
//! the last classification, and the durable (within-session) list of
//! failed uploads. Every field here is a named, typed field rather than
//! an open map — the user-visible "delta" projections live in
//! [`crate::orchestrator`] and only ever copy out the fields that are
//! safe to echo back.

use crate::classifier::Classification;
use crate::domain::{NamingLanguage, SessionId};
use crate::materializer::FailedUpload;
use crate::scanner::ScannedFile;
use crate::storage::{Backend, StorageCredentials};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Credentials plus the connected backend kind and the store's root path.
/// Never serialized as-is — [`ConnectionSummary`] is the echo-safe view.
#[derive(Debug, Clone)]
pub struct ConnectedStore {
    pub credentials: StorageCredentials,
    pub backend: Backend,
    pub root_path: String,
}

/// The user-visible projection of a [`ConnectedStore`] (no password).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSummary {
    pub backend: Backend,
    pub url: String,
    pub root_path: String,
}

impl From<&ConnectedStore> for ConnectionSummary {
    fn from(store: &ConnectedStore) -> Self {
        Self {
            backend: store.backend,
            url: store.credentials.url.clone(),
            root_path: store.root_path.clone(),
        }
    }
}

/// User preferences merged by `set_user_config`. Delays are seconds;
/// `use_copy` selects copy-over-move for organize mode's video transfer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub scan_delay_s: f64,
    pub upload_delay_s: f64,
    pub naming_language: NamingLanguage,
    pub use_copy: bool,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            scan_delay_s: 0.0,
            upload_delay_s: 0.0,
            naming_language: NamingLanguage::default(),
            use_copy: false,
        }
    }
}

/// Partial update applied by `set_user_config`; `None` fields are left
/// untouched, so an empty update leaves prefs byte-equal.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserConfigUpdate {
    pub scan_delay_s: Option<f64>,
    pub upload_delay_s: Option<f64>,
    pub naming_language: Option<NamingLanguage>,
    pub use_copy: Option<bool>,
}

impl UserConfig {
    pub fn merge(&mut self, update: UserConfigUpdate) {
        if let Some(v) = update.scan_delay_s {
            self.scan_delay_s = v;
        }
        if let Some(v) = update.upload_delay_s {
            self.upload_delay_s = v;
        }
        if let Some(v) = update.naming_language {
            self.naming_language = v;
        }
        if let Some(v) = update.use_copy {
            self.use_copy = v;
        }
    }
}

/// One session's complete working state.
///
/// Mutated only by orchestrator operations; concurrent orchestrator calls
/// on the same session are not made safe by this type beyond the single
/// `RwLock` around the whole struct — callers are expected to serialize
/// their own multi-step workflows against one session.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub source: Option<ConnectedStore>,
    pub target: Option<ConnectedStore>,
    pub user_config: UserConfig,
    pub scanned_files: Vec<ScannedFile>,
    pub classifications: Vec<Classification>,
    pub failed_uploads: Vec<FailedUpload>,
    /// Opaque bucket for out-of-scope LLM-prepared work (a file list plus
    /// candidate series IDs); carried as an untyped value since its
    /// producer is an external collaborator.
    pub pending: serde_json::Value,
    /// Raised by `cancel` to stop a long-running scan/organize/strm
    /// operation from starting further network calls. Replaced with a
    /// fresh token once raised so the next operation isn't born cancelled.
    pub cancel: CancellationToken,
}

impl SessionState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: serde_json::Value::Null,
            ..Self::default()
        }
    }
}

/// Process-wide map of `session_id -> SessionState`, one `RwLock` per
/// session — operations on distinct sessions proceed independently.
#[derive(Default)]
pub struct SessionStore {
    inner: RwLock<HashMap<SessionId, Arc<RwLock<SessionState>>>>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_create(&self, id: SessionId) -> Arc<RwLock<SessionState>> {
        if let Some(existing) = self.inner.read().await.get(&id) {
            return Arc::clone(existing);
        }
        let mut guard = self.inner.write().await;
        Arc::clone(
            guard
                .entry(id)
                .or_insert_with(|| Arc::new(RwLock::new(SessionState::new()))),
        )
    }

    pub async fn get(&self, id: &SessionId) -> Option<Arc<RwLock<SessionState>>> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &SessionId) -> bool {
        self.inner.write().await.remove(id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_or_create_reuses_the_same_session() {
        let store = SessionStore::new();
        let id = SessionId::new();
        let first = store.get_or_create(id).await;
        {
            let mut guard = first.write().await;
            guard.user_config.scan_delay_s = 2.0;
        }
        let second = store.get_or_create(id).await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.read().await.user_config.scan_delay_s, 2.0);
    }

    #[test]
    fn user_config_merge_is_idempotent_on_empty_update() {
        let mut config = UserConfig {
            scan_delay_s: 1.5,
            upload_delay_s: 0.5,
            naming_language: NamingLanguage::En,
            use_copy: true,
        };
        let before = config.clone();
        config.merge(UserConfigUpdate::default());
        assert_eq!(before.scan_delay_s, config.scan_delay_s);
        assert_eq!(before.upload_delay_s, config.upload_delay_s);
        assert_eq!(before.naming_language, config.naming_language);
        assert_eq!(before.use_copy, config.use_copy);
    }

    #[test]
    fn user_config_merge_only_touches_provided_fields() {
        let mut config = UserConfig::default();
        config.merge(UserConfigUpdate {
            scan_delay_s: Some(3.0),
            ..Default::default()
        });
        assert_eq!(config.scan_delay_s, 3.0);
        assert_eq!(config.upload_delay_s, 0.0);
    }
}
