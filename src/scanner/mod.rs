//! Scanner: depth-first remote-tree traversal producing a flat inventory
//! of recognized video/subtitle files.

use crate::constants::{COMPOUND_LANGUAGE_CODES, SUBTITLE_EXTENSIONS, VIDEO_EXTENSIONS};
use crate::domain::FileKind;
use crate::storage::{FileInfo, StorageClient};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// One recognized file discovered during a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannedFile {
    pub path: String,
    pub name: String,
    pub size: Option<u64>,
    #[serde(rename = "type")]
    pub kind: FileKind,
    pub directory: String,
    /// Present only for `kind = Subtitle`; defaults to `"und"`.
    pub language: Option<String>,
}

/// Traversal bounds and pacing.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub recursive: bool,
    pub max_depth: Option<u32>,
    pub max_files: Option<usize>,
    pub scan_delay_s: f64,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            max_depth: None,
            max_files: None,
            scan_delay_s: 0.0,
        }
    }
}

/// Outcome of a scan: the inventory plus directories that failed to list.
#[derive(Debug, Default)]
pub struct ScanResult {
    pub files: Vec<ScannedFile>,
    pub failed_directories: Vec<String>,
    pub truncated: bool,
}

struct WorkItem {
    path: String,
    depth: u32,
}

/// Traverse `start_path` via `client`, collecting recognized files.
///
/// Depth-first, explicit work-stack (each "descend" is a network round
/// trip, so this does not use a local-filesystem crate like `walkdir`).
/// Sleeps `scan_delay_s` between listings after the first.
pub async fn scan(
    client: &dyn StorageClient,
    start_path: &str,
    options: &ScanOptions,
    cancel: &CancellationToken,
) -> ScanResult {
    let mut result = ScanResult::default();
    let mut stack = vec![WorkItem {
        path: start_path.to_string(),
        depth: 0,
    }];
    let mut first_listing = true;

    while let Some(item) = stack.pop() {
        if cancel.is_cancelled() {
            result.truncated = true;
            break;
        }
        if let Some(max_files) = options.max_files {
            if result.files.len() >= max_files {
                result.truncated = true;
                break;
            }
        }

        if !first_listing && options.scan_delay_s > 0.0 {
            sleep(std::time::Duration::from_secs_f64(options.scan_delay_s)).await;
        }
        first_listing = false;

        let entries = match client.list(&item.path).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(path = %item.path, error = %err, "directory listing failed, skipping");
                result.failed_directories.push(item.path.clone());
                continue;
            }
        };

        for entry in entries {
            if entry.is_dir {
                if options.recursive && within_depth(item.depth, options.max_depth) {
                    stack.push(WorkItem {
                        path: entry.path.clone(),
                        depth: item.depth + 1,
                    });
                }
                continue;
            }
            if let Some(scanned) = classify_entry(&entry, &item.path) {
                result.files.push(scanned);
                if let Some(max_files) = options.max_files {
                    if result.files.len() >= max_files {
                        result.truncated = true;
                        break;
                    }
                }
            }
        }
    }

    result
}

fn within_depth(current_depth: u32, max_depth: Option<u32>) -> bool {
    match max_depth {
        Some(max) => current_depth < max,
        None => true,
    }
}

fn classify_entry(entry: &FileInfo, directory: &str) -> Option<ScannedFile> {
    let ext = entry.name.rsplit_once('.').map(|(_, e)| e.to_lowercase())?;
    if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(ScannedFile {
            path: entry.path.clone(),
            name: entry.name.clone(),
            size: entry.size,
            kind: FileKind::Video,
            directory: directory.to_string(),
            language: None,
        })
    } else if SUBTITLE_EXTENSIONS.contains(&ext.as_str()) {
        Some(ScannedFile {
            path: entry.path.clone(),
            name: entry.name.clone(),
            size: entry.size,
            kind: FileKind::Subtitle,
            directory: directory.to_string(),
            language: Some(extract_subtitle_language(&entry.name)),
        })
    } else {
        None
    }
}

/// Subtitle language-code extraction.
pub fn extract_subtitle_language(filename: &str) -> String {
    let stem = SUBTITLE_EXTENSIONS
        .iter()
        .find_map(|ext| filename.strip_suffix(&format!(".{ext}")))
        .unwrap_or(filename);

    let segments: Vec<&str> = stem.split('.').collect();
    if let Some(last) = segments.last() {
        let lowered = last.to_lowercase();
        if COMPOUND_LANGUAGE_CODES.contains(&lowered.as_str()) {
            return lowered;
        }
        if let Some(mapped) = map_single_code(&lowered) {
            return mapped.to_string();
        }
    }

    for token in stem.split(|c| c == '.' || c == '_') {
        if let Some(mapped) = map_single_code(&token.to_lowercase()) {
            return mapped.to_string();
        }
    }

    "und".to_string()
}

fn map_single_code(token: &str) -> Option<&'static str> {
    match token {
        "chs" | "chi" | "sc" | "gb" | "zh-cn" | "zho" => Some("chs"),
        "cht" | "tc" | "big5" | "zh-tw" => Some("cht"),
        "eng" | "en" => Some("eng"),
        "jpn" | "jap" | "jp" | "ja" => Some("jpn"),
        "kor" | "ko" => Some("kor"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Backend, Result, StorageCredentials};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    struct FakeClient {
        tree: HashMap<String, Vec<FileInfo>>,
        list_calls: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl StorageClient for FakeClient {
        fn backend(&self) -> Backend {
            Backend::Alist
        }

        async fn list(&self, path: &str) -> Result<Vec<FileInfo>> {
            self.list_calls.lock().unwrap().push(path.to_string());
            Ok(self.tree.get(path).cloned().unwrap_or_default())
        }

        async fn get_content(&self, _path: &str) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }

        async fn put_content(&self, _path: &str, _bytes: &[u8]) -> Result<bool> {
            Ok(true)
        }

        async fn mkdir(&self, _path: &str) -> Result<bool> {
            Ok(true)
        }

        async fn move_file(&self, _source: &str, _destination: &str) -> Result<bool> {
            Ok(true)
        }

        async fn copy(&self, _source: &str, _destination: &str) -> Result<bool> {
            Ok(true)
        }

        async fn delete(&self, _path: &str) -> Result<bool> {
            Ok(true)
        }

        async fn exists(&self, _path: &str) -> Result<bool> {
            Ok(true)
        }

        async fn direct_url(&self, _path: &str) -> Result<Option<String>> {
            Ok(None)
        }

        async fn refresh_dir(&self, _path: &str) -> Result<bool> {
            Ok(true)
        }

        async fn upload_batch(
            &self,
            _files: Vec<(String, Vec<u8>)>,
            _concurrency: usize,
        ) -> (usize, usize, Vec<String>) {
            (0, 0, vec![])
        }
    }

    fn file(path: &str, is_dir: bool) -> FileInfo {
        let name = path.rsplit('/').next().unwrap_or(path).to_string();
        FileInfo {
            path: path.to_string(),
            name,
            is_dir,
            size: if is_dir { None } else { Some(100) },
            modified: None,
        }
    }

    #[allow(dead_code)]
    fn unused_credentials() -> StorageCredentials {
        StorageCredentials {
            url: String::new(),
            username: String::new(),
            password: String::new(),
        }
    }

    #[tokio::test]
    async fn recursive_scan_collects_video_and_subtitle_files() {
        let mut tree = HashMap::new();
        tree.insert(
            "/lib".to_string(),
            vec![file("/lib/season1", true), file("/lib/readme.txt", false)],
        );
        tree.insert(
            "/lib/season1".to_string(),
            vec![
                file("/lib/season1/ep01.mkv", false),
                file("/lib/season1/ep01.chs.ass", false),
            ],
        );
        let client = FakeClient {
            tree,
            list_calls: StdMutex::new(vec![]),
        };

        let result = scan(
            &client,
            "/lib",
            &ScanOptions::default(),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(result.files.len(), 2);
        assert!(result.files.iter().any(|f| f.kind == FileKind::Video));
        let subtitle = result
            .files
            .iter()
            .find(|f| f.kind == FileKind::Subtitle)
            .unwrap();
        assert_eq!(subtitle.language.as_deref(), Some("chs"));
    }

    #[tokio::test]
    async fn max_depth_zero_lists_only_entry_directory() {
        let mut tree = HashMap::new();
        tree.insert("/lib".to_string(), vec![file("/lib/season1", true)]);
        tree.insert(
            "/lib/season1".to_string(),
            vec![file("/lib/season1/ep01.mkv", false)],
        );
        let client = FakeClient {
            tree,
            list_calls: StdMutex::new(vec![]),
        };

        let options = ScanOptions {
            max_depth: Some(0),
            ..ScanOptions::default()
        };
        let result = scan(&client, "/lib", &options, &CancellationToken::new()).await;

        assert!(result.files.is_empty());
        assert_eq!(*client.list_calls.lock().unwrap(), vec!["/lib".to_string()]);
    }

    #[test]
    fn language_extraction_prefers_compound_code() {
        assert_eq!(extract_subtitle_language("ep01.chsjp.ass"), "chsjp");
        assert_eq!(extract_subtitle_language("ep01.eng.srt"), "eng");
        assert_eq!(extract_subtitle_language("ep01.srt"), "und");
        assert_eq!(extract_subtitle_language("ep01_jp_extra.sub"), "jpn");
    }
}
