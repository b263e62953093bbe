//! Orchestrator: exposes the external operations over a [`SessionState`],
//! sequencing Scanner → Classifier (+Resolver) → Materializer and
//! enforcing the preconditions each operation documents.
//!
//! Every mutating operation returns `(message, delta)`: `message` is the
//! human-readable summary, `delta` is a typed projection of only the
//! session fields the caller is allowed to see — a deliberate move away
//! from handing back an untyped dict-shaped blob of session state. On a
//! failed precondition, state is left untouched and an
//! [`OrchestratorError`] is returned instead.

use crate::classifier::{self, Classification, ClassifyResult, ClassifyStatus, MappingRule};
use crate::domain::{FileKind, Kind, NamingLanguage, SeriesId, SessionId};
use crate::materializer::{self, FailedUpload, MaterializeSummary};
use crate::metadata::{MetadataError, MetadataProvider, SearchHit, SeriesDetails};
use crate::resolver::SeriesMappingCache;
use crate::scanner::{self, ScanOptions, ScanResult, ScannedFile};
use crate::session::{
    ConnectedStore, ConnectionSummary, SessionState, SessionStore, UserConfig, UserConfigUpdate,
};
use crate::storage::alist::AlistClient;
use crate::storage::webdav::WebDavClient;
use crate::storage::{
    self, Backend, StorageClient, StorageClientCache, StorageClientKey, StorageCredentials,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Error taxonomy surfaced to callers of the orchestrator.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("session not found")]
    SessionNotFound,
    #[error("precondition failed: {0}")]
    Precondition(String),
    #[error("storage error: {0}")]
    Storage(#[from] storage::StorageError),
    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Echo-safe projection of a connected store, surfaced under the
/// `storage_config` / `strm_target_config` delta keys.
pub type ConnectionDelta = ConnectionSummary;

#[derive(Debug, Clone, Serialize)]
pub struct UserConfigDelta {
    pub user_config: UserConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanResultSummary {
    pub total: usize,
    pub video_count: usize,
    pub subtitle_count: usize,
    pub failed_directories: Vec<String>,
    pub truncated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanDelta {
    pub scanned_files: Vec<ScannedFile>,
    pub scan_result: ScanResultSummary,
}

/// Traversal parameters for [`Orchestrator::scan`].
/// Any field left `None` falls back to the session's `UserConfig` (for
/// `scan_delay_s`) or a traversal default (root path, unbounded depth).
#[derive(Debug, Clone, Default)]
pub struct ScanRequest {
    pub path: Option<String>,
    pub recursive: bool,
    pub max_files: Option<usize>,
    pub max_depth: Option<u32>,
    pub scan_delay_s: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFilter {
    #[default]
    All,
    Video,
    Subtitle,
    Unclassified,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilesPage {
    pub files: Vec<ScannedFile>,
    pub total_matching: usize,
    pub offset: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassifyResultSummary {
    pub matched: usize,
    pub unmatched: usize,
    pub error: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassifyDelta {
    pub classifications: Vec<Classification>,
    pub classification_result: ClassifyResultSummary,
    /// Per-file results, mainly useful for surfacing why a file didn't
    /// match.
    pub unmatched_or_error: Vec<ClassifyResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaterializeDelta {
    pub summary: MaterializeSummary,
    pub failed_uploads: Vec<FailedUpload>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetryDelta {
    pub succeeded: usize,
    pub failed_uploads: Vec<FailedUpload>,
}

/// Builds a concrete [`StorageClient`] for a backend.
fn build_client(
    backend: Backend,
    creds: &StorageCredentials,
    root_path: &str,
    min_request_interval: std::time::Duration,
) -> Arc<dyn StorageClient> {
    match backend {
        Backend::Alist => Arc::new(AlistClient::with_rate_limit(
            creds.url.clone(),
            creds.username.clone(),
            creds.password.clone(),
            root_path,
            min_request_interval,
        )),
        Backend::WebDav => Arc::new(WebDavClient::with_rate_limit(
            creds.url.clone(),
            creds.username.clone(),
            creds.password.clone(),
            root_path,
            min_request_interval,
        )),
    }
}

/// Sequences the three core components over one session's state, plus the
/// process-wide caches shared across sessions.
pub struct Orchestrator {
    sessions: SessionStore,
    client_cache: StorageClientCache,
    series_cache: SeriesMappingCache,
    metadata: Arc<dyn MetadataProvider>,
    /// Minimum inter-request interval applied to every storage client this
    /// orchestrator builds (`config.storage.min_request_interval_s`).
    min_request_interval: std::time::Duration,
}

impl Orchestrator {
    #[must_use]
    pub fn new(metadata: Arc<dyn MetadataProvider>) -> Self {
        Self::with_rate_limit(metadata, std::time::Duration::ZERO)
    }

    #[must_use]
    pub fn with_rate_limit(
        metadata: Arc<dyn MetadataProvider>,
        min_request_interval: std::time::Duration,
    ) -> Self {
        Self {
            sessions: SessionStore::new(),
            client_cache: StorageClientCache::new(),
            series_cache: SeriesMappingCache::new(),
            metadata,
            min_request_interval,
        }
    }

    async fn session(&self, session_id: SessionId) -> Arc<tokio::sync::RwLock<SessionState>> {
        self.sessions.get_or_create(session_id).await
    }

    async fn client_for(&self, store: &ConnectedStore) -> Arc<dyn StorageClient> {
        let key = StorageClientKey::new(store.backend, &store.credentials);
        let backend = store.backend;
        let creds = store.credentials.clone();
        let root_path = store.root_path.clone();
        let min_interval = self.min_request_interval;
        self.client_cache
            .get_or_insert_with(key, move || build_client(backend, &creds, &root_path, min_interval))
            .await
    }

    /// Connects and authenticates a store, returning its echo-safe summary
    /// without mutating the session on failure.
    async fn connect(
        &self,
        url: String,
        username: String,
        password: String,
        target_path: String,
        explicit_backend: Option<Backend>,
    ) -> Result<ConnectedStore> {
        if url.is_empty() {
            return Err(OrchestratorError::Configuration("url must not be empty".into()));
        }

        let backend = match explicit_backend {
            Some(b) => b,
            None => {
                let probe = reqwest::Client::new();
                storage::detect_backend(&probe, &url).await
            }
        };

        let creds = StorageCredentials { url, username, password };
        let store = ConnectedStore {
            credentials: creds,
            backend,
            root_path: target_path,
        };

        let client = self.client_for(&store).await;
        // Force authentication / connectivity to surface immediately
        // rather than lazily on the first real operation.
        match client.list(&store.root_path).await {
            Ok(_) => Ok(store),
            Err(storage::StorageError::Authentication(msg)) => {
                Err(OrchestratorError::Authentication(msg))
            }
            Err(err) => Err(OrchestratorError::Storage(err)),
        }
    }

    #[instrument(skip(self, password))]
    pub async fn connect_source(
        &self,
        session_id: SessionId,
        url: String,
        username: String,
        password: String,
        target_path: Option<String>,
    ) -> Result<(String, ConnectionDelta)> {
        let store = self
            .connect(url, username, password, target_path.unwrap_or_else(|| "/".to_string()), None)
            .await?;
        let delta = ConnectionSummary::from(&store);
        let session = self.session(session_id).await;
        session.write().await.source = Some(store);
        info!(backend = %delta.backend, "source store connected");
        Ok((format!("Connected source store ({})", delta.backend), delta))
    }

    #[instrument(skip(self, password))]
    pub async fn connect_target(
        &self,
        session_id: SessionId,
        url: String,
        username: String,
        password: String,
        target_path: String,
    ) -> Result<(String, ConnectionDelta)> {
        if target_path.is_empty() {
            return Err(OrchestratorError::Configuration("target_path is required".into()));
        }
        let store = self.connect(url, username, password, target_path, None).await?;
        let delta = ConnectionSummary::from(&store);
        let session = self.session(session_id).await;
        session.write().await.target = Some(store);
        info!(backend = %delta.backend, "target store connected");
        Ok((format!("Connected target store ({})", delta.backend), delta))
    }

    pub async fn set_user_config(
        &self,
        session_id: SessionId,
        update: UserConfigUpdate,
    ) -> Result<(String, UserConfigDelta)> {
        let session = self.session(session_id).await;
        let mut guard = session.write().await;
        guard.user_config.merge(update);
        Ok((
            "Preferences updated".to_string(),
            UserConfigDelta { user_config: guard.user_config.clone() },
        ))
    }

    #[instrument(skip(self))]
    pub async fn scan(
        &self,
        session_id: SessionId,
        request: ScanRequest,
    ) -> Result<(String, ScanDelta)> {
        let session = self.session(session_id).await;
        let (client, start_path, scan_delay_s, cancel) = {
            let guard = session.read().await;
            let source = guard
                .source
                .clone()
                .ok_or_else(|| OrchestratorError::Precondition("scan requires a connected source".into()))?;
            let client = self.client_for(&source).await;
            let start_path = request.path.clone().unwrap_or_else(|| source.root_path.clone());
            let scan_delay_s = request.scan_delay_s.unwrap_or(guard.user_config.scan_delay_s);
            (client, start_path, scan_delay_s, guard.cancel.clone())
        };

        let options = ScanOptions {
            recursive: request.recursive,
            max_depth: request.max_depth,
            max_files: request.max_files,
            scan_delay_s,
        };

        let result: ScanResult = scanner::scan(client.as_ref(), &start_path, &options, &cancel).await;

        let video_count = result.files.iter().filter(|f| f.kind == FileKind::Video).count();
        let subtitle_count = result.files.len() - video_count;
        let summary = ScanResultSummary {
            total: result.files.len(),
            video_count,
            subtitle_count,
            failed_directories: result.failed_directories.clone(),
            truncated: result.truncated,
        };

        {
            let mut guard = session.write().await;
            guard.scanned_files = result.files.clone();
        }

        let message = format!(
            "Scanned {} files ({} video, {} subtitle){}",
            summary.total,
            summary.video_count,
            summary.subtitle_count,
            if summary.failed_directories.is_empty() {
                String::new()
            } else {
                format!(", {} directories failed to list", summary.failed_directories.len())
            }
        );

        Ok((
            message,
            ScanDelta {
                scanned_files: result.files,
                scan_result: summary,
            },
        ))
    }

    /// Raises the session's cancellation token, stopping the in-progress
    /// scan/organize/strm operation from starting further network calls.
    /// Replaces the token with a fresh one afterwards so the next
    /// operation on this session isn't born cancelled.
    pub async fn cancel(&self, session_id: SessionId) -> Result<String> {
        let session = self
            .sessions
            .get(&session_id)
            .await
            .ok_or(OrchestratorError::SessionNotFound)?;
        let mut guard = session.write().await;
        guard.cancel.cancel();
        guard.cancel = CancellationToken::new();
        Ok("Cancellation requested".to_string())
    }

    pub async fn list_files(
        &self,
        session_id: SessionId,
        filter: FileFilter,
        offset: usize,
        limit: usize,
        pattern: Option<String>,
    ) -> Result<FilesPage> {
        let session = self
            .sessions
            .get(&session_id)
            .await
            .ok_or(OrchestratorError::SessionNotFound)?;
        let guard = session.read().await;

        let classified_paths: HashSet<&str> = guard
            .classifications
            .iter()
            .flat_map(|c| c.seasons.values().flatten().chain(c.files.iter()))
            .flat_map(|f| {
                std::iter::once(f.source_path.as_str())
                    .chain(f.subtitles.iter().map(|s| s.source_path.as_str()))
            })
            .collect();

        let matches = |f: &ScannedFile| -> bool {
            let kind_ok = match filter {
                FileFilter::All => true,
                FileFilter::Video => f.kind == FileKind::Video,
                FileFilter::Subtitle => f.kind == FileKind::Subtitle,
                FileFilter::Unclassified => !classified_paths.contains(f.path.as_str()),
            };
            if !kind_ok {
                return false;
            }
            match &pattern {
                Some(p) => f.name.to_lowercase().contains(&p.to_lowercase()),
                None => true,
            }
        };

        let all_matching: Vec<&ScannedFile> = guard.scanned_files.iter().filter(|f| matches(f)).collect();
        let total_matching = all_matching.len();
        let page: Vec<ScannedFile> = all_matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();

        Ok(FilesPage { files: page, total_matching, offset, limit })
    }

    pub async fn lookup_metadata(&self, query: &str, kind: Kind) -> Result<Vec<SearchHit>> {
        Ok(self.metadata.search(query, kind).await?)
    }

    pub async fn get_metadata_details(&self, series_id: &SeriesId, kind: Kind) -> Result<SeriesDetails> {
        Ok(self.metadata.details(series_id, kind).await?)
    }

    #[instrument(skip(self, rules))]
    pub async fn classify(
        &self,
        session_id: SessionId,
        rules: Vec<MappingRule>,
    ) -> Result<(String, ClassifyDelta)> {
        let session = self.session(session_id).await;
        let files = {
            let guard = session.read().await;
            if guard.scanned_files.is_empty() {
                return Err(OrchestratorError::Precondition(
                    "classify requires a non-empty inventory".into(),
                ));
            }
            guard.scanned_files.clone()
        };

        // Every distinct series referenced by a rule needs a built
        // numbering table (series rules) or just series details (movie
        // rules) before classification can run.
        let mut series_maps = HashMap::new();
        let mut series_details: HashMap<SeriesId, SeriesDetails> = HashMap::new();

        for rule in &rules {
            match rule {
                MappingRule::Series { series_id, .. } => {
                    if !series_details.contains_key(series_id) {
                        let mapping = self
                            .series_cache
                            .get_or_build(self.metadata.as_ref(), series_id, Kind::Tv)
                            .await?;
                        let details = self.metadata.details(series_id, Kind::Tv).await?;
                        series_details.insert(series_id.clone(), details);
                        series_maps.insert((series_id.clone(), Kind::Tv), mapping);
                    }
                }
                MappingRule::Movie { series_id, .. } => {
                    if !series_details.contains_key(series_id) {
                        let details = self.metadata.details(series_id, Kind::Movie).await?;
                        series_details.insert(series_id.clone(), details);
                    }
                }
            }
        }

        let results = classifier::classify(&files, &rules, &series_maps);
        let classifications = classifier::aggregate_classifications(&results, &files, &series_details);

        let matched = results.iter().filter(|r| r.status == ClassifyStatus::Matched).count();
        let unmatched = results.iter().filter(|r| r.status == ClassifyStatus::Unmatched).count();
        let error = results.iter().filter(|r| r.status == ClassifyStatus::Error).count();

        let unmatched_or_error: Vec<ClassifyResult> = results
            .iter()
            .filter(|r| r.status != ClassifyStatus::Matched)
            .take(crate::constants::reporting::MAX_FAILED_PATHS_SHOWN)
            .cloned()
            .collect();

        {
            let mut guard = session.write().await;
            guard.classifications = classifications.clone();
        }

        let message = format!("Classified {matched} matched, {unmatched} unmatched, {error} errored");
        Ok((
            message,
            ClassifyDelta {
                classifications,
                classification_result: ClassifyResultSummary { matched, unmatched, error },
                unmatched_or_error,
            },
        ))
    }

    #[instrument(skip(self))]
    pub async fn organize(
        &self,
        session_id: SessionId,
        naming_language: Option<NamingLanguage>,
    ) -> Result<(String, MaterializeDelta)> {
        let session = self.session(session_id).await;
        let (client, root_path, language, use_copy, classifications, cancel) = {
            let guard = session.read().await;
            let source = guard
                .source
                .clone()
                .ok_or_else(|| OrchestratorError::Precondition("organize requires a connected source".into()))?;
            if guard.classifications.is_empty() {
                return Err(OrchestratorError::Precondition(
                    "organize requires a non-empty classification".into(),
                ));
            }
            let client = self.client_for(&source).await;
            (
                client,
                source.root_path.clone(),
                naming_language.unwrap_or(guard.user_config.naming_language),
                guard.user_config.use_copy,
                guard.classifications.clone(),
                guard.cancel.clone(),
            )
        };

        let summary = materializer::organize(
            client.as_ref(),
            &classifications,
            &root_path,
            language,
            use_copy,
            &cancel,
        )
        .await;

        {
            let mut guard = session.write().await;
            guard.classifications.clear();
        }

        let message = format!("Organized {} files ({} failed)", summary.succeeded, summary.failed);
        Ok((
            message,
            MaterializeDelta { summary, failed_uploads: vec![] },
        ))
    }

    #[instrument(skip(self))]
    pub async fn generate_strm(
        &self,
        session_id: SessionId,
        naming_language: Option<NamingLanguage>,
    ) -> Result<(String, MaterializeDelta)> {
        let session = self.session(session_id).await;
        let (source_client, target_client, root_path, language, upload_delay_s, classifications, cancel) = {
            let guard = session.read().await;
            let source = guard
                .source
                .clone()
                .ok_or_else(|| OrchestratorError::Precondition("generate_strm requires a connected source".into()))?;
            let target = guard
                .target
                .clone()
                .ok_or_else(|| OrchestratorError::Precondition("generate_strm requires a connected target".into()))?;
            if guard.classifications.is_empty() {
                return Err(OrchestratorError::Precondition(
                    "generate_strm requires a non-empty classification".into(),
                ));
            }
            (
                self.client_for(&source).await,
                self.client_for(&target).await,
                target.root_path.clone(),
                naming_language.unwrap_or(guard.user_config.naming_language),
                guard.user_config.upload_delay_s,
                guard.classifications.clone(),
                guard.cancel.clone(),
            )
        };

        let outcome = materializer::generate_strm(
            source_client.as_ref(),
            target_client.as_ref(),
            &classifications,
            &root_path,
            language,
            upload_delay_s,
            &cancel,
        )
        .await;

        {
            let mut guard = session.write().await;
            guard.classifications.clear();
            guard.failed_uploads.extend(outcome.failed_uploads.clone());
        }

        let message = format!(
            "Generated strm tree: {} succeeded, {} failed{}",
            outcome.summary.succeeded,
            outcome.summary.failed,
            if outcome.failed_uploads.is_empty() {
                String::new()
            } else {
                format!(", {} subtitle transfers queued for retry", outcome.failed_uploads.len())
            }
        );
        Ok((
            message,
            MaterializeDelta {
                summary: outcome.summary,
                failed_uploads: outcome.failed_uploads,
            },
        ))
    }

    #[instrument(skip(self))]
    pub async fn retry_failed(&self, session_id: SessionId) -> Result<(String, RetryDelta)> {
        let session = self.session(session_id).await;
        let (source_client, target_client, failed) = {
            let guard = session.read().await;
            let source = guard
                .source
                .clone()
                .ok_or_else(|| OrchestratorError::Precondition("retry_failed requires a connected source".into()))?;
            let target = guard
                .target
                .clone()
                .ok_or_else(|| OrchestratorError::Precondition("retry_failed requires a connected target".into()))?;
            (self.client_for(&source).await, self.client_for(&target).await, guard.failed_uploads.clone())
        };

        if failed.is_empty() {
            return Ok((
                "Nothing to retry".to_string(),
                RetryDelta { succeeded: 0, failed_uploads: vec![] },
            ));
        }

        let (succeeded, remaining) =
            materializer::retry_failed(source_client.as_ref(), target_client.as_ref(), failed).await;

        {
            let mut guard = session.write().await;
            guard.failed_uploads = remaining.clone();
        }

        let message = format!("Retried uploads: {succeeded} succeeded, {} still failing", remaining.len());
        Ok((message, RetryDelta { succeeded, failed_uploads: remaining }))
    }

    /// Hydrates a session's failure list from a previously persisted
    /// `Vec<FailedUpload>`. A CLI invocation of `retry_failed` starts a
    /// fresh ephemeral session with no prior `generate_strm` call in its
    /// history, so the CLI layer round-trips the failure list through a
    /// JSON file between process invocations and replays it in here.
    pub async fn seed_failed_uploads(&self, session_id: SessionId, failed: Vec<FailedUpload>) {
        let session = self.session(session_id).await;
        session.write().await.failed_uploads = failed;
    }
}
