//! Alist REST backend.
//!
//! A config-less client wrapping `reqwest::Client`, with a login/
//! `ensure_token` pair, methods returning `Result<T>`, and retry/backoff
//! handled inline per request rather than via a generic middleware layer.

use super::cache::DirectoryCache;
use super::rate_limiter::RateLimiter;
use super::{Backend, FileInfo, Result, StorageClient, StorageError};
use crate::constants::storage as cfg;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore};
use tokio::time::sleep;

pub struct AlistClient {
    http: reqwest::Client,
    url: String,
    username: String,
    password: String,
    base_path: String,
    token: RwLock<Option<String>>,
    rate_limiter: RateLimiter,
    dir_cache: DirectoryCache<Vec<FileInfo>>,
    /// Set once an unrecoverable login failure has been observed, so
    /// subsequent operations fail fast instead of retrying a login that
    /// will not succeed (credentials don't change mid-session).
    auth_failed: AtomicBool,
}

impl AlistClient {
    #[must_use]
    pub fn new(url: impl Into<String>, username: impl Into<String>, password: impl Into<String>, base_path: impl Into<String>) -> Self {
        Self::with_rate_limit(url, username, password, base_path, Duration::ZERO)
    }

    #[must_use]
    pub fn with_rate_limit(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        base_path: impl Into<String>,
        min_interval: Duration,
    ) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(cfg::CONNECT_TIMEOUT)
            .timeout(cfg::READ_WRITE_TIMEOUT)
            .pool_idle_timeout(cfg::POOL_IDLE_TIMEOUT)
            .pool_max_idle_per_host(cfg::MIN_IDLE_CONNECTIONS_PER_HOST)
            .cookie_store(true)
            .build()
            .expect("reqwest client config is static and valid");

        let mut base_path = base_path.into();
        if !base_path.starts_with('/') {
            base_path = format!("/{base_path}");
        }
        let base_path = base_path.trim_end_matches('/').to_string();
        let base_path = if base_path.is_empty() { "/".to_string() } else { base_path };

        Self {
            http,
            url: url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
            base_path,
            token: RwLock::new(None),
            rate_limiter: RateLimiter::new(min_interval),
            dir_cache: DirectoryCache::new(cfg::CACHE_CAPACITY, cfg::CACHE_TTL),
            auth_failed: AtomicBool::new(false),
        }
    }

    fn full_path(&self, path: &str) -> String {
        if path.is_empty() || path == "/" {
            return self.base_path.clone();
        }
        if let Some(stripped) = path.strip_prefix('/') {
            if stripped.is_empty() {
                return self.base_path.clone();
            }
            return format!("/{stripped}");
        }
        format!("{}/{}", self.base_path, path)
    }

    async fn login(&self) -> Result<String> {
        let resp = self
            .http
            .post(format!("{}/api/auth/login", self.url))
            .json(&json!({"username": self.username, "password": self.password}))
            .send()
            .await?;
        let data: Value = resp.json().await.unwrap_or(Value::Null);
        match data.get("code").and_then(Value::as_i64) {
            Some(200) => {
                let token = data
                    .pointer("/data/token")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                *self.token.write().await = Some(token.clone());
                Ok(token)
            }
            _ => {
                self.auth_failed.store(true, Ordering::Relaxed);
                Err(StorageError::Authentication(
                    data.get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("login rejected")
                        .to_string(),
                ))
            }
        }
    }

    async fn ensure_token(&self) -> Result<String> {
        if self.auth_failed.load(Ordering::Relaxed) {
            return Err(StorageError::Authentication("previous login failed".into()));
        }
        if let Some(token) = self.token.read().await.clone() {
            return Ok(token);
        }
        self.login().await
    }

    /// POST `{url}/api/fs/{endpoint}` with automatic retry on transient
    /// failure, 429 rate-limit backoff, and one free re-login on 401.
    async fn post_fs(&self, endpoint: &str, body: Value) -> Result<Value> {
        let mut last_err = StorageError::Transient("no attempts made".into());
        let mut attempt = 0u32;
        let mut free_relogin_used = false;
        loop {
            self.rate_limiter.wait().await;
            let token = self.ensure_token().await?;
            let result = self
                .http
                .post(format!("{}/api/fs/{endpoint}", self.url))
                .header("Authorization", token)
                .json(&body)
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().as_u16() == 429 => {
                    sleep(cfg::RATE_LIMIT_BACKOFF).await;
                    attempt += 1;
                }
                Ok(resp) => {
                    let status = resp.status();
                    let data: Value = resp.json().await.unwrap_or(Value::Null);
                    match data.get("code").and_then(Value::as_i64) {
                        Some(200) => return Ok(data),
                        Some(401) => {
                            *self.token.write().await = None;
                            last_err = StorageError::Authentication("token rejected".into());
                            if free_relogin_used {
                                // second 401 in a row counts against the
                                // retry budget instead of looping forever
                                attempt += 1;
                            } else {
                                free_relogin_used = true;
                                continue;
                            }
                        }
                        Some(429) => {
                            sleep(cfg::RATE_LIMIT_BACKOFF).await;
                            attempt += 1;
                        }
                        _ => {
                            let message = data
                                .get("message")
                                .and_then(Value::as_str)
                                .unwrap_or("unknown")
                                .to_string();
                            if message.to_lowercase().contains("too many") {
                                sleep(cfg::RATE_LIMIT_BACKOFF).await;
                            } else {
                                last_err = if status.is_success() {
                                    StorageError::NotFound(message)
                                } else {
                                    StorageError::Transient(format!("HTTP {status}: {message}"))
                                };
                                sleep(cfg::RETRY_BASE_DELAY * (attempt + 1)).await;
                            }
                            attempt += 1;
                        }
                    }
                }
                Err(e) => {
                    last_err = StorageError::Request(e);
                    sleep(cfg::RETRY_BASE_DELAY * (attempt + 1)).await;
                    attempt += 1;
                }
            }

            if attempt > cfg::MAX_RETRIES {
                return Err(last_err);
            }
        }
    }
}

#[async_trait]
impl StorageClient for AlistClient {
    fn backend(&self) -> Backend {
        Backend::Alist
    }

    async fn list(&self, path: &str) -> Result<Vec<FileInfo>> {
        let full = self.full_path(path);
        let cache_key = format!("list:{full}");
        if let Some(cached) = self.dir_cache.get(&cache_key).await {
            return Ok(cached);
        }

        let data = self
            .post_fs(
                "list",
                json!({"path": full, "refresh": false, "page": 1, "per_page": 0}),
            )
            .await?;

        let content = data.pointer("/data/content").cloned().unwrap_or(Value::Array(vec![]));
        let entries: Vec<FileInfo> = content
            .as_array()
            .into_iter()
            .flatten()
            .map(|item| {
                let name = item.get("name").and_then(Value::as_str).unwrap_or_default();
                FileInfo {
                    path: format!("{}/{name}", full.trim_end_matches('/')),
                    name: name.to_string(),
                    is_dir: item.get("is_dir").and_then(Value::as_bool).unwrap_or(false),
                    size: item.get("size").and_then(Value::as_u64),
                    modified: item.get("modified").and_then(Value::as_str).map(str::to_string),
                }
            })
            .collect();

        self.dir_cache.set(cache_key, entries.clone()).await;
        Ok(entries)
    }

    async fn get_content(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let Some(url) = self.direct_url(path).await? else {
            return Ok(None);
        };
        self.rate_limiter.wait().await;
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Ok(None);
        }
        Ok(Some(resp.bytes().await?.to_vec()))
    }

    async fn put_content(&self, path: &str, bytes: &[u8]) -> Result<bool> {
        let full = self.full_path(path);
        self.rate_limiter.wait().await;
        let token = self.ensure_token().await?;
        let encoded = percent_encoding::utf8_percent_encode(&full, percent_encoding::NON_ALPHANUMERIC).to_string();
        let resp = self
            .http
            .put(format!("{}/api/fs/put", self.url))
            .header("Authorization", token)
            .header("File-Path", encoded)
            .header("Content-Type", "application/octet-stream")
            .body(bytes.to_vec())
            .send()
            .await?;
        if !resp.status().is_success() {
            return Ok(false);
        }
        let data: Value = resp.json().await.unwrap_or(Value::Null);
        let ok = data.get("code").and_then(Value::as_i64) == Some(200);
        if ok {
            if let Some(parent) = full.rsplit_once('/').map(|(p, _)| p) {
                self.dir_cache.invalidate(&format!("list:{parent}")).await;
            }
        }
        Ok(ok)
    }

    async fn mkdir(&self, path: &str) -> Result<bool> {
        let full = self.full_path(path);
        let data = self.post_fs("mkdir", json!({"path": full})).await;
        match data {
            Ok(_) => {
                if let Some(parent) = full.rsplit_once('/').map(|(p, _)| p) {
                    self.dir_cache.invalidate(&format!("list:{parent}")).await;
                }
                Ok(true)
            }
            // code 500 on mkdir commonly means "already exists", which is success.
            Err(StorageError::NotFound(_)) => Ok(true),
            Err(e) => Err(e),
        }
    }

    async fn move_file(&self, source: &str, destination: &str) -> Result<bool> {
        let src = self.full_path(source);
        let dst = self.full_path(destination);
        let (src_dir, src_name) = split_parent(&src);
        let (dst_dir, dst_name) = split_parent(&dst);

        let ok = if src_dir == dst_dir {
            self.post_fs("rename", json!({"path": src, "name": dst_name}))
                .await
                .is_ok()
        } else {
            let moved = self
                .post_fs(
                    "move",
                    json!({"src_dir": src_dir, "dst_dir": dst_dir, "names": [src_name]}),
                )
                .await
                .is_ok();
            if moved && src_name != dst_name {
                let new_path = format!("{dst_dir}/{src_name}");
                self.post_fs("rename", json!({"path": new_path, "name": dst_name}))
                    .await
                    .is_ok()
            } else {
                moved
            }
        };

        if ok {
            self.dir_cache.invalidate(&format!("list:{src_dir}")).await;
            self.dir_cache.invalidate(&format!("list:{dst_dir}")).await;
        }
        Ok(ok)
    }

    async fn copy(&self, source: &str, destination: &str) -> Result<bool> {
        let src = self.full_path(source);
        let dst = self.full_path(destination);
        let (src_dir, src_name) = split_parent(&src);
        let (dst_dir, dst_name) = split_parent(&dst);

        let copied = self
            .post_fs(
                "copy",
                json!({"src_dir": src_dir, "dst_dir": dst_dir, "names": [src_name]}),
            )
            .await
            .is_ok();
        if !copied {
            return Ok(false);
        }

        // Alist copy is asynchronous; poll until the target is visible or
        // time out and continue optimistically — a deliberate choice,
        // flagged for revisit.
        let copied_path = format!("{dst_dir}/{src_name}");
        let deadline = tokio::time::Instant::now() + cfg::ALIST_COPY_POLL_TIMEOUT;
        while tokio::time::Instant::now() < deadline {
            sleep(cfg::ALIST_COPY_POLL_INTERVAL).await;
            if self.exists(&copied_path).await.unwrap_or(false) {
                break;
            }
        }

        let ok = if src_name != dst_name {
            self.post_fs("rename", json!({"path": copied_path, "name": dst_name}))
                .await
                .is_ok()
        } else {
            true
        };
        if ok {
            self.dir_cache.invalidate(&format!("list:{dst_dir}")).await;
        }
        Ok(ok)
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        let full = self.full_path(path);
        let (dir, name) = split_parent(&full);
        let ok = self
            .post_fs("remove", json!({"dir": dir, "names": [name]}))
            .await
            .is_ok();
        if ok {
            self.dir_cache.invalidate(&format!("list:{dir}")).await;
        }
        Ok(ok)
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full = self.full_path(path);
        self.rate_limiter.wait().await;
        let token = self.ensure_token().await?;
        let resp = self
            .http
            .post(format!("{}/api/fs/get", self.url))
            .header("Authorization", token)
            .json(&json!({"path": full}))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Ok(false);
        }
        let data: Value = resp.json().await.unwrap_or(Value::Null);
        Ok(data.get("code").and_then(Value::as_i64) == Some(200))
    }

    async fn direct_url(&self, path: &str) -> Result<Option<String>> {
        let full = self.full_path(path);
        self.rate_limiter.wait().await;
        let token = self.ensure_token().await?;
        let resp = self
            .http
            .post(format!("{}/api/fs/get", self.url))
            .header("Authorization", token)
            .json(&json!({"path": full}))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Ok(None);
        }
        let data: Value = resp.json().await.unwrap_or(Value::Null);
        if data.get("code").and_then(Value::as_i64) != Some(200) {
            return Ok(None);
        }
        Ok(data
            .pointer("/data/raw_url")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn refresh_dir(&self, path: &str) -> Result<bool> {
        let full = self.full_path(path);
        let result = self
            .post_fs("list", json!({"path": full, "refresh": true, "page": 1, "per_page": 1}))
            .await;
        self.dir_cache.invalidate(&format!("list:{full}")).await;
        Ok(result.is_ok())
    }

    async fn upload_batch(
        &self,
        files: Vec<(String, Vec<u8>)>,
        concurrency: usize,
    ) -> (usize, usize, Vec<String>) {
        if files.is_empty() {
            return (0, 0, vec![]);
        }

        // 1. Collect every ancestor directory across all paths.
        let mut dirs_to_create: std::collections::BTreeSet<String> = Default::default();
        for (path, _) in &files {
            let full = self.full_path(path);
            let parts: Vec<&str> = full.trim_start_matches('/').split('/').collect();
            for i in 1..=parts.len().saturating_sub(1) {
                dirs_to_create.insert(format!("/{}", parts[..i].join("/")));
            }
        }
        let touched_dirs: Vec<String> = dirs_to_create.iter().cloned().collect();
        let mut sorted_dirs: Vec<String> = dirs_to_create.into_iter().collect();
        sorted_dirs.sort_by_key(|d| d.matches('/').count());

        // 2. Serially pre-create directories through the rate gate.
        for dir in sorted_dirs {
            let _ = self.mkdir(&dir).await;
        }

        // 3. Parallel upload, bypassing the rate gate (own semaphore).
        let semaphore = std::sync::Arc::new(Semaphore::new(concurrency.max(1)));
        let mut tasks = Vec::with_capacity(files.len());
        for (path, bytes) in files {
            let semaphore = semaphore.clone();
            let full = self.full_path(&path);
            let token = self.ensure_token().await.ok();
            let http = self.http.clone();
            let url = self.url.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await;
                let Some(token) = token else {
                    return (false, path);
                };
                let encoded =
                    percent_encoding::utf8_percent_encode(&full, percent_encoding::NON_ALPHANUMERIC)
                        .to_string();
                let result = http
                    .put(format!("{url}/api/fs/put"))
                    .header("Authorization", token)
                    .header("File-Path", encoded)
                    .header("Content-Type", "application/octet-stream")
                    .body(bytes)
                    .send()
                    .await;
                let ok = match result {
                    Ok(resp) if resp.status().is_success() => resp
                        .json::<Value>()
                        .await
                        .ok()
                        .and_then(|data| data.get("code").and_then(Value::as_i64))
                        == Some(200),
                    _ => false,
                };
                (ok, path)
            }));
        }

        let mut success = 0;
        let mut failed_paths = Vec::new();
        for task in tasks {
            match task.await {
                Ok((true, _)) => success += 1,
                Ok((false, path)) => failed_paths.push(path),
                Err(_) => {}
            }
        }
        let error = failed_paths.len();
        for dir in &touched_dirs {
            self.dir_cache.invalidate(&format!("list:{dir}")).await;
        }
        (success, error, failed_paths)
    }
}

fn split_parent(full_path: &str) -> (String, String) {
    match full_path.rsplit_once('/') {
        Some((dir, name)) => {
            let dir = if dir.is_empty() { "/".to_string() } else { dir.to_string() };
            (dir, name.to_string())
        }
        None => ("/".to_string(), full_path.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_path_joins_relative_to_base() {
        let client = AlistClient::new("http://x", "u", "p", "/115/anime");
        assert_eq!(client.full_path("show/ep1.mkv"), "/115/anime/show/ep1.mkv");
        assert_eq!(client.full_path("/abs/path"), "/abs/path");
        assert_eq!(client.full_path("/"), "/115/anime");
    }

    #[test]
    fn split_parent_handles_root_level() {
        assert_eq!(split_parent("/a/b"), ("/a".to_string(), "b".to_string()));
        assert_eq!(split_parent("/a"), ("/".to_string(), "a".to_string()));
    }

    async fn mount_login(server: &wiremock::MockServer) {
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/api/auth/login"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({
                "code": 200,
                "data": {"token": "tok"},
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn post_fs_backs_off_once_on_429_then_succeeds() {
        let server = wiremock::MockServer::start().await;
        mount_login(&server).await;

        let attempts = std::sync::Arc::new(AtomicBool::new(false));
        let attempts_clone = attempts.clone();
        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/api/fs/list"))
            .respond_with(move |_: &wiremock::Request| {
                if attempts_clone.swap(true, Ordering::SeqCst) {
                    wiremock::ResponseTemplate::new(200)
                        .set_body_json(json!({"code": 200, "data": {"content": []}}))
                } else {
                    wiremock::ResponseTemplate::new(429)
                }
            })
            .mount(&server)
            .await;

        let client = AlistClient::new(server.uri(), "u", "p", "/");
        let started = std::time::Instant::now();
        let result = client.post_fs("list", json!({"path": "/"})).await;

        assert!(result.is_ok());
        assert!(attempts.load(Ordering::SeqCst));
        assert!(started.elapsed() >= cfg::RATE_LIMIT_BACKOFF);
    }

    #[tokio::test]
    async fn post_fs_401_retry_is_bounded() {
        let server = wiremock::MockServer::start().await;
        mount_login(&server).await;

        wiremock::Mock::given(wiremock::matchers::method("POST"))
            .and(wiremock::matchers::path("/api/fs/list"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(json!({
                "code": 401,
                "message": "token expired",
            })))
            .mount(&server)
            .await;

        let client = AlistClient::new(server.uri(), "u", "p", "/");
        let result = client.post_fs("list", json!({"path": "/"})).await;

        assert!(result.is_err());
    }
}
