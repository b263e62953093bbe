//! Materializer: turns a classified file set into either renamed
//! operations on the source store (organize mode) or a parallel `.strm`
//! tree plus copied subtitles on a target store (strm mode).
//!
//! Driven entirely through the [`StorageClient`] trait so it never talks
//! to a backend directly; the strm-mode upload path reuses the same
//! semaphore-gated concurrency pattern as [`StorageClient::upload_batch`].

use crate::classifier::{Classification, ClassifiedFile};
use crate::domain::{Kind, NamingLanguage};
use crate::naming;
use crate::storage::StorageClient;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// One subtitle transfer or upload that failed and must be retried later;
/// the durable within-session record of partial failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedUpload {
    pub source_path: String,
    pub target_path: String,
    pub kind: FailedUploadKind,
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedUploadKind {
    Subtitle,
}

/// User-visible outcome of a materialize operation: counts plus, when
/// applicable, up to the first 10 failing paths.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MaterializeSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub failed_paths: Vec<String>,
    pub elided: usize,
}

impl MaterializeSummary {
    fn record_failure(&mut self, path: String) {
        self.failed += 1;
        if self.failed_paths.len() < crate::constants::reporting::MAX_FAILED_PATHS_SHOWN {
            self.failed_paths.push(path);
        } else {
            self.elided += 1;
        }
    }
}

/// Per-video subtitle to materialize, already resolved to a default/tagged
/// pair of filenames.
struct PlannedSubtitle<'a> {
    source_path: &'a str,
    is_default: bool,
    language: &'a str,
}

fn plan_subtitles(file: &ClassifiedFile) -> Vec<PlannedSubtitle<'_>> {
    let languages: Vec<String> = file.subtitles.iter().map(|s| s.language.clone()).collect();
    let default_index = naming::pick_default_subtitle_index(&languages);

    file.subtitles
        .iter()
        .enumerate()
        .map(|(i, s)| PlannedSubtitle {
            source_path: &s.source_path,
            is_default: Some(i) == default_index,
            language: &s.language,
        })
        .collect()
}

/// Root output folder for a classification.
fn series_root(cls: &Classification, output_root: &str, language: NamingLanguage) -> String {
    let kind_folder = naming::kind_folder(cls.kind, language);
    let subcategory_folder =
        naming::subcategory_display_name(cls.subcategory, cls.kind, language);
    format!(
        "{}/{kind_folder}/{subcategory_folder}",
        output_root.trim_end_matches('/')
    )
}

fn series_folder(cls: &Classification) -> String {
    naming::format_series_folder(&cls.name, cls.year)
}

/// Destination path for a classified video (no extension assumed by the
/// caller other than what's carried on `original_ext`).
fn video_target(cls: &Classification, file: &ClassifiedFile, root: &str, ext: &str) -> String {
    if cls.kind == Kind::Movie {
        format!("{root}/{}/{}", series_folder(cls), naming::format_movie_name(&cls.name, cls.year, ext))
    } else {
        format!(
            "{root}/{}/{}/{}",
            series_folder(cls),
            naming::format_season_folder(file.season),
            naming::format_episode_name(&cls.name, file.season, file.episode, ext)
        )
    }
}

fn subtitle_target(
    cls: &Classification,
    file: &ClassifiedFile,
    root: &str,
    language: Option<&str>,
    ext: &str,
) -> String {
    let name = naming::format_subtitle_name(&cls.name, file.season, file.episode, language, ext);
    if cls.kind == Kind::Movie {
        format!("{root}/{}/{name}", series_folder(cls))
    } else {
        format!(
            "{root}/{}/{}/{name}",
            series_folder(cls),
            naming::format_season_folder(file.season)
        )
    }
}

fn extension_of(path: &str) -> String {
    path.rsplit_once('.').map_or(String::new(), |(_, ext)| format!(".{ext}"))
}

fn ensure_dir_cache_key(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(dir, _)| dir)
}

/// Organize mode: renames/moves the source tree in place. Serial
/// within a season and across seasons — this workload is bound by the
/// storage backend's rate limits, not by client-side parallelism.
pub async fn organize(
    source: &dyn StorageClient,
    classifications: &[Classification],
    output_root: &str,
    naming_language: NamingLanguage,
    use_copy: bool,
    cancel: &CancellationToken,
) -> MaterializeSummary {
    let mut summary = MaterializeSummary::default();
    let mut created_dirs: BTreeSet<String> = BTreeSet::new();

    for cls in classifications {
        if cancel.is_cancelled() {
            break;
        }
        let root = series_root(cls, output_root, naming_language);
        let files: Vec<&ClassifiedFile> = if cls.kind == Kind::Movie {
            cls.files.iter().collect()
        } else {
            let mut seasons: Vec<i32> = cls.seasons.keys().copied().collect();
            seasons.sort_unstable();
            seasons
                .into_iter()
                .flat_map(|s| cls.seasons[&s].iter())
                .collect()
        };

        for file in files {
            if cancel.is_cancelled() {
                break;
            }
            let ext = extension_of(&file.source_path);
            let video_dst = video_target(cls, file, &root, &ext);
            if let Some(dir) = ensure_dir_cache_key(&video_dst) {
                if created_dirs.insert(dir.to_string()) {
                    let _ = source.mkdir(dir).await;
                }
            }

            let video_op = if use_copy {
                source.copy(&file.source_path, &video_dst).await
            } else {
                source.move_file(&file.source_path, &video_dst).await
            };
            match video_op {
                Ok(true) => summary.succeeded += 1,
                Ok(false) => summary.record_failure(file.source_path.clone()),
                Err(err) => {
                    warn!(path = %file.source_path, error = %err, "organize: video transfer failed");
                    summary.record_failure(file.source_path.clone());
                }
            }

            // Subtitle transfer shape is fixed regardless of the
            // copy-vs-move preference: the default is always copied first
            // so a tagged copy of it can still be moved into place
            // afterwards.
            for planned in plan_subtitles(file) {
                let sub_ext = extension_of(planned.source_path);
                if planned.is_default {
                    let default_dst = subtitle_target(cls, file, &root, None, &sub_ext);
                    match source.copy(planned.source_path, &default_dst).await {
                        Ok(true) => summary.succeeded += 1,
                        Ok(false) => summary.record_failure(planned.source_path.to_string()),
                        Err(err) => {
                            warn!(path = planned.source_path, error = %err, "organize: default subtitle copy failed");
                            summary.record_failure(planned.source_path.to_string());
                        }
                    }
                }

                let tagged_dst =
                    subtitle_target(cls, file, &root, Some(planned.language), &sub_ext);
                match source.move_file(planned.source_path, &tagged_dst).await {
                    Ok(true) => summary.succeeded += 1,
                    Ok(false) => summary.record_failure(planned.source_path.to_string()),
                    Err(err) => {
                        warn!(path = planned.source_path, error = %err, "organize: tagged subtitle transfer failed");
                        summary.record_failure(planned.source_path.to_string());
                    }
                }
            }
        }
    }

    summary
}

/// Outcome of `generate_strm`, including the durable failure list the
/// caller should fold into `SessionState.failed_uploads`.
#[derive(Debug, Default)]
pub struct StrmOutcome {
    pub summary: MaterializeSummary,
    pub failed_uploads: Vec<FailedUpload>,
}

/// STRM mode: writes `.strm` redirector files for every video via a
/// target-side upload batch, then transfers subtitles as atomic
/// download-then-upload units, each bounded by a concurrency-16
/// semaphore. `upload_delay_s > 0` degrades both streams to a serial loop
/// regardless of the concurrency setting.
pub async fn generate_strm(
    source: &dyn StorageClient,
    target: &dyn StorageClient,
    classifications: &[Classification],
    output_root: &str,
    naming_language: NamingLanguage,
    upload_delay_s: f64,
    cancel: &CancellationToken,
) -> StrmOutcome {
    let mut outcome = StrmOutcome::default();
    let mut touched_dirs: BTreeSet<String> = BTreeSet::new();

    // Stream 1: STRM file generation, issued before subtitle transfer.
    let mut strm_batch: Vec<(String, Vec<u8>)> = Vec::new();
    let mut strm_video_count = 0usize;

    for cls in classifications {
        let root = series_root(cls, output_root, naming_language);
        let files: Vec<&ClassifiedFile> = if cls.kind == Kind::Movie {
            cls.files.iter().collect()
        } else {
            let mut seasons: Vec<i32> = cls.seasons.keys().copied().collect();
            seasons.sort_unstable();
            seasons
                .into_iter()
                .flat_map(|s| cls.seasons[&s].iter())
                .collect()
        };

        for file in files {
            let video_dst = video_target(cls, file, &root, ".strm");
            if let Some(dir) = ensure_dir_cache_key(&video_dst) {
                touched_dirs.insert(dir.to_string());
            }
            let url = match source.direct_url(&file.source_path).await {
                Ok(Some(url)) => url,
                Ok(None) => {
                    warn!(path = %file.source_path, "strm: no direct url available, skipping");
                    outcome.summary.record_failure(file.source_path.clone());
                    continue;
                }
                Err(err) => {
                    warn!(path = %file.source_path, error = %err, "strm: direct url lookup failed");
                    outcome.summary.record_failure(file.source_path.clone());
                    continue;
                }
            };
            strm_batch.push((video_dst, url.into_bytes()));
            strm_video_count += 1;
        }
    }

    if upload_delay_s > 0.0 {
        for (path, bytes) in strm_batch {
            if let Some(dir) = ensure_dir_cache_key(&path) {
                let _ = target.mkdir(dir).await;
            }
            if target.put_content(&path, &bytes).await.unwrap_or(false) {
                outcome.summary.succeeded += 1;
            } else {
                outcome.summary.failed += 1;
            }
            tokio::time::sleep(std::time::Duration::from_secs_f64(upload_delay_s)).await;
        }
    } else if !strm_batch.is_empty() {
        let (success, failed, _failed_paths) = target
            .upload_batch(strm_batch, crate::constants::pools::UPLOAD_CONCURRENCY)
            .await;
        outcome.summary.succeeded += success;
        // STRM upload failures are counted but not individually captured —
        // they can be regenerated by re-running.
        outcome.summary.failed += failed;
    }
    let _ = strm_video_count;

    if cancel.is_cancelled() {
        return outcome;
    }

    // Stream 2: subtitle transfer. Each task is an atomic
    // download-then-upload unit so bytes never pile up in memory across
    // the whole batch.
    let mut subtitle_tasks: Vec<(String, String)> = Vec::new();
    for cls in classifications {
        let root = series_root(cls, output_root, naming_language);
        let files: Vec<&ClassifiedFile> = if cls.kind == Kind::Movie {
            cls.files.iter().collect()
        } else {
            let mut seasons: Vec<i32> = cls.seasons.keys().copied().collect();
            seasons.sort_unstable();
            seasons
                .into_iter()
                .flat_map(|s| cls.seasons[&s].iter())
                .collect()
        };
        for file in files {
            for planned in plan_subtitles(file) {
                let sub_ext = extension_of(planned.source_path);
                if planned.is_default {
                    let default_dst = subtitle_target(cls, file, &root, None, &sub_ext);
                    if let Some(dir) = ensure_dir_cache_key(&default_dst) {
                        touched_dirs.insert(dir.to_string());
                    }
                    subtitle_tasks.push((planned.source_path.to_string(), default_dst));
                }
                let tagged_dst =
                    subtitle_target(cls, file, &root, Some(planned.language), &sub_ext);
                if let Some(dir) = ensure_dir_cache_key(&tagged_dst) {
                    touched_dirs.insert(dir.to_string());
                }
                subtitle_tasks.push((planned.source_path.to_string(), tagged_dst));
            }
        }
    }

    if upload_delay_s > 0.0 {
        for (src, dst) in subtitle_tasks {
            match transfer_one(source, target, &src, &dst).await {
                Ok(()) => outcome.summary.succeeded += 1,
                Err(error) => {
                    outcome.summary.record_failure(src.clone());
                    outcome.failed_uploads.push(FailedUpload {
                        source_path: src,
                        target_path: dst,
                        kind: FailedUploadKind::Subtitle,
                        error,
                    });
                }
            }
            tokio::time::sleep(std::time::Duration::from_secs_f64(upload_delay_s)).await;
        }
    } else {
        let semaphore = Arc::new(Semaphore::new(crate::constants::pools::UPLOAD_CONCURRENCY));
        let mut handles = Vec::with_capacity(subtitle_tasks.len());
        for (src, dst) in subtitle_tasks {
            let semaphore = semaphore.clone();
            // SAFETY note: StorageClient trait objects aren't `'static`
            // across an await boundary here, so we fan out futures and
            // join them rather than `tokio::spawn`.
            handles.push(async move {
                let _permit = semaphore.acquire().await;
                let result = transfer_one(source, target, &src, &dst).await;
                (src, dst, result)
            });
        }
        let results = futures::future::join_all(handles).await;
        for (src, dst, result) in results {
            match result {
                Ok(()) => outcome.summary.succeeded += 1,
                Err(error) => {
                    outcome.summary.record_failure(src.clone());
                    outcome.failed_uploads.push(FailedUpload {
                        source_path: src,
                        target_path: dst,
                        kind: FailedUploadKind::Subtitle,
                        error,
                    });
                }
            }
        }
    }

    // Both streams done: refresh every touched directory at concurrency 4.
    let dirs: Vec<String> = touched_dirs.into_iter().collect();
    for chunk in dirs.chunks(crate::constants::pools::REFRESH_CONCURRENCY) {
        let futs = chunk.iter().map(|d| target.refresh_dir(d));
        let _ = futures::future::join_all(futs).await;
    }

    outcome
}

/// Decodes a subtitle's bytes for a log line only; the bytes written to
/// the target are always the original, untouched bytes. Falls back to
/// GBK (common for Chinese subtitle files) when the content isn't valid
/// UTF-8, matching what source subtitle servers actually emit.
fn trace_subtitle_preview(path: &str, bytes: &[u8]) {
    if !matches!(extension_of(path).as_str(), ".srt" | ".ass" | ".ssa") {
        return;
    }
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => std::borrow::Cow::Borrowed(text),
        Err(_) => {
            let (text, _, had_errors) = encoding_rs::GBK.decode(bytes);
            if had_errors {
                tracing::debug!(path, "subtitle content is neither valid UTF-8 nor clean GBK");
            }
            text
        }
    };
    tracing::trace!(path, preview = %text.chars().take(80).collect::<String>(), "read subtitle content");
}

async fn transfer_one(
    source: &dyn StorageClient,
    target: &dyn StorageClient,
    src: &str,
    dst: &str,
) -> Result<(), String> {
    let bytes = source
        .get_content(src)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "source file not found".to_string())?;
    trace_subtitle_preview(src, &bytes);
    if let Some(dir) = ensure_dir_cache_key(dst) {
        let _ = target.mkdir(dir).await;
    }
    let ok = target.put_content(dst, &bytes).await.map_err(|e| e.to_string())?;
    if ok {
        Ok(())
    } else {
        Err("upload rejected".to_string())
    }
}

/// Drains `failed_uploads` serially against `target`/`source`: successes
/// are removed, still-failing entries are retained and returned for the
/// caller to merge back.
pub async fn retry_failed(
    source: &dyn StorageClient,
    target: &dyn StorageClient,
    failed: Vec<FailedUpload>,
) -> (usize, Vec<FailedUpload>) {
    let mut succeeded = 0;
    let mut remaining = Vec::new();
    for item in failed {
        match transfer_one(source, target, &item.source_path, &item.target_path).await {
            Ok(()) => succeeded += 1,
            Err(error) => remaining.push(FailedUpload { error, ..item }),
        }
    }
    (succeeded, remaining)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Classification, ClassifiedFile, SubtitleRef};
    use crate::domain::Kind;
    use crate::naming::Subcategory;
    use crate::storage::{Backend, FileInfo, Result as StorageResult};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeClient {
        moves: StdMutex<Vec<(String, String)>>,
        copies: StdMutex<Vec<(String, String)>>,
        puts: StdMutex<Vec<(String, Vec<u8>)>>,
        refreshed: StdMutex<Vec<String>>,
        contents: HashMap<String, Vec<u8>>,
        fail_move: bool,
    }

    #[async_trait]
    impl StorageClient for FakeClient {
        fn backend(&self) -> Backend {
            Backend::Alist
        }
        async fn list(&self, _path: &str) -> StorageResult<Vec<FileInfo>> {
            Ok(vec![])
        }
        async fn get_content(&self, path: &str) -> StorageResult<Option<Vec<u8>>> {
            Ok(self.contents.get(path).cloned())
        }
        async fn put_content(&self, path: &str, bytes: &[u8]) -> StorageResult<bool> {
            self.puts.lock().unwrap().push((path.to_string(), bytes.to_vec()));
            Ok(true)
        }
        async fn mkdir(&self, _path: &str) -> StorageResult<bool> {
            Ok(true)
        }
        async fn move_file(&self, source: &str, destination: &str) -> StorageResult<bool> {
            if self.fail_move {
                return Ok(false);
            }
            self.moves
                .lock()
                .unwrap()
                .push((source.to_string(), destination.to_string()));
            Ok(true)
        }
        async fn copy(&self, source: &str, destination: &str) -> StorageResult<bool> {
            self.copies
                .lock()
                .unwrap()
                .push((source.to_string(), destination.to_string()));
            Ok(true)
        }
        async fn delete(&self, _path: &str) -> StorageResult<bool> {
            Ok(true)
        }
        async fn exists(&self, _path: &str) -> StorageResult<bool> {
            Ok(true)
        }
        async fn direct_url(&self, path: &str) -> StorageResult<Option<String>> {
            Ok(Some(format!("http://example.com{path}")))
        }
        async fn refresh_dir(&self, path: &str) -> StorageResult<bool> {
            self.refreshed.lock().unwrap().push(path.to_string());
            Ok(true)
        }
        async fn upload_batch(
            &self,
            files: Vec<(String, Vec<u8>)>,
            _concurrency: usize,
        ) -> (usize, usize, Vec<String>) {
            let count = files.len();
            self.puts.lock().unwrap().extend(files);
            (count, 0, vec![])
        }
    }

    fn sample_classification() -> Classification {
        let file = ClassifiedFile {
            source_path: "/lib/show/ep01.mkv".to_string(),
            name: "ep01.mkv".to_string(),
            episode: 1,
            season: 1,
            subtitles: vec![
                SubtitleRef {
                    source_path: "/lib/show/ep01.chs.ass".to_string(),
                    language: "chs".to_string(),
                },
                SubtitleRef {
                    source_path: "/lib/show/ep01.eng.srt".to_string(),
                    language: "eng".to_string(),
                },
            ],
        };
        Classification {
            series_id: crate::domain::SeriesId::new("tmdb:1"),
            name: "Show".to_string(),
            kind: Kind::Tv,
            year: Some(2020),
            genres: vec![],
            subcategory: Subcategory::Default,
            seasons: HashMap::from([(1, vec![file])]),
            files: vec![],
        }
    }

    #[tokio::test]
    async fn organize_moves_video_and_handles_subtitle_defaulting() {
        let client = FakeClient::default();
        let classifications = vec![sample_classification()];
        let summary = organize(
            &client,
            &classifications,
            "/output",
            NamingLanguage::En,
            false,
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(summary.failed, 0);
        let moves = client.moves.lock().unwrap();
        assert!(moves.iter().any(|(s, _)| s == "/lib/show/ep01.mkv"));
        // Tagged move for both subtitles.
        assert!(moves.iter().any(|(s, d)| s.ends_with("ep01.chs.ass") && d.contains(".chs.")));
        assert!(moves.iter().any(|(s, d)| s.ends_with("ep01.eng.srt") && d.contains(".eng.")));
        let copies = client.copies.lock().unwrap();
        // Default copy only for the chs subtitle (higher priority than eng).
        assert_eq!(copies.len(), 1);
        assert!(copies[0].0.ends_with("ep01.chs.ass"));
        assert!(!copies[0].1.contains(".chs.") && !copies[0].1.contains(".eng."));
    }

    #[tokio::test]
    async fn organize_records_failed_video_move() {
        let client = FakeClient {
            fail_move: true,
            ..FakeClient::default()
        };
        let classifications = vec![sample_classification()];
        let summary = organize(
            &client,
            &classifications,
            "/output",
            NamingLanguage::En,
            false,
            &CancellationToken::new(),
        )
        .await;
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failed_paths, vec!["/lib/show/ep01.mkv".to_string()]);
    }

    #[tokio::test]
    async fn generate_strm_writes_url_bytes_and_refreshes_dirs() {
        let source = FakeClient::default();
        let target = FakeClient::default();
        let classifications = vec![sample_classification()];

        let outcome = generate_strm(
            &source,
            &target,
            &classifications,
            "/output",
            NamingLanguage::En,
            0.0,
            &CancellationToken::new(),
        )
        .await;

        let puts = target.puts.lock().unwrap();
        let strm_entry = puts.iter().find(|(p, _)| p.ends_with(".strm")).unwrap();
        assert_eq!(
            String::from_utf8(strm_entry.1.clone()).unwrap(),
            "http://example.com/lib/show/ep01.mkv"
        );
        assert!(!target.refreshed.lock().unwrap().is_empty());
        assert_eq!(outcome.summary.failed, 2); // both subtitle source files absent from `contents`
        assert_eq!(outcome.failed_uploads.len(), 2);
    }

    #[tokio::test]
    async fn retry_failed_moves_successes_out_of_the_list() {
        let mut contents = HashMap::new();
        contents.insert("/a.srt".to_string(), b"hello".to_vec());
        let source = FakeClient {
            contents,
            ..FakeClient::default()
        };
        let target = FakeClient::default();

        let failed = vec![
            FailedUpload {
                source_path: "/a.srt".to_string(),
                target_path: "/out/a.srt".to_string(),
                kind: FailedUploadKind::Subtitle,
                error: "previous failure".to_string(),
            },
            FailedUpload {
                source_path: "/missing.srt".to_string(),
                target_path: "/out/missing.srt".to_string(),
                kind: FailedUploadKind::Subtitle,
                error: "previous failure".to_string(),
            },
        ];

        let (succeeded, remaining) = retry_failed(&source, &target, failed).await;
        assert_eq!(succeeded, 1);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].source_path, "/missing.srt");
    }

    #[test]
    fn subtitle_preview_handles_utf8_and_gbk_without_panicking() {
        trace_subtitle_preview("/a.srt", "Hello, world".as_bytes());
        let (gbk_bytes, _, _) = encoding_rs::GBK.encode("你好");
        trace_subtitle_preview("/b.srt", &gbk_bytes);
        trace_subtitle_preview("/c.mkv", &[0xff, 0xfe, 0x00]);
    }
}
