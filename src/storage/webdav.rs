//! Generic WebDAV backend.
//!
//! PROPFIND/MKCOL/PUT/MOVE/COPY/DELETE over HTTP Basic auth. Listing
//! responses are parsed with `quick-xml`.

use super::cache::DirectoryCache;
use super::rate_limiter::RateLimiter;
use super::{Backend, FileInfo, Result, StorageClient, StorageError};
use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::sleep;

use crate::constants::storage as cfg;

pub struct WebDavClient {
    http: reqwest::Client,
    url: String,
    username: String,
    password: String,
    base_path: String,
    rate_limiter: RateLimiter,
    dir_cache: DirectoryCache<Vec<FileInfo>>,
}

impl WebDavClient {
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
            .build()
            .expect("reqwest client config is static and valid");
        let mut base_path = base_path.into();
        if !base_path.starts_with('/') {
            base_path = format!("/{base_path}");
        }
        Self {
            http,
            url: url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
            base_path: base_path.trim_end_matches('/').to_string(),
            rate_limiter: RateLimiter::new(min_interval),
            dir_cache: DirectoryCache::new(cfg::CACHE_CAPACITY, cfg::CACHE_TTL),
        }
    }

    fn full_path(&self, path: &str) -> String {
        if path.is_empty() || path == "/" {
            return self.base_path.clone();
        }
        if let Some(stripped) = path.strip_prefix('/') {
            return format!("/{stripped}");
        }
        format!("{}/{}", self.base_path, path)
    }

    fn resource_url(&self, path: &str) -> String {
        format!("{}/dav{}", self.url, self.full_path(path))
    }

    async fn request_with_retry(
        &self,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let mut attempt = 0u32;
        let mut last_err = StorageError::Transient("no attempts made".into());
        loop {
            self.rate_limiter.wait().await;
            match build()
                .basic_auth(&self.username, Some(&self.password))
                .send()
                .await
            {
                Ok(resp) if resp.status().as_u16() == 429 => {
                    sleep(cfg::RATE_LIMIT_BACKOFF).await;
                }
                Ok(resp) if resp.status().as_u16() == 401 => {
                    return Err(StorageError::Authentication("rejected credentials".into()));
                }
                Ok(resp) if resp.status().is_success() || resp.status().as_u16() == 207 => {
                    return Ok(resp);
                }
                Ok(resp) => {
                    last_err = StorageError::Transient(format!("HTTP {}", resp.status()));
                    sleep(cfg::RETRY_BASE_DELAY * (attempt + 1)).await;
                }
                Err(e) => {
                    last_err = StorageError::Request(e);
                    sleep(cfg::RETRY_BASE_DELAY * (attempt + 1)).await;
                }
            }
            attempt += 1;
            if attempt > cfg::MAX_RETRIES {
                return Err(last_err);
            }
        }
    }
}

#[async_trait]
impl StorageClient for WebDavClient {
    fn backend(&self) -> Backend {
        Backend::WebDav
    }

    async fn list(&self, path: &str) -> Result<Vec<FileInfo>> {
        let full = self.full_path(path);
        let cache_key = format!("list:{full}");
        if let Some(cached) = self.dir_cache.get(&cache_key).await {
            return Ok(cached);
        }

        let url = self.resource_url(path);
        let resp = self
            .request_with_retry(|| {
                self.http
                    .request(
                        reqwest::Method::from_bytes(b"PROPFIND").unwrap(),
                        &url,
                    )
                    .header("Depth", "1")
                    .header("Content-Type", "application/xml")
                    .body(PROPFIND_BODY)
            })
            .await?;
        let body = resp.text().await?;
        // hrefs in the response are absolute paths under `/dav`, so the
        // self-entry filter needs the same prefix `full` lacks.
        let entries = parse_propfind(&body, &format!("/dav{full}"));
        self.dir_cache.set(cache_key, entries.clone()).await;
        Ok(entries)
    }

    async fn get_content(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let url = self.resource_url(path);
        match self.request_with_retry(|| self.http.get(&url)).await {
            Ok(resp) => Ok(Some(resp.bytes().await?.to_vec())),
            Err(StorageError::Transient(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn put_content(&self, path: &str, bytes: &[u8]) -> Result<bool> {
        let url = self.resource_url(path);
        let body = bytes.to_vec();
        let ok = self
            .request_with_retry(|| self.http.put(&url).body(body.clone()))
            .await
            .is_ok();
        if ok {
            if let Some(parent) = self.full_path(path).rsplit_once('/').map(|(p, _)| p) {
                self.dir_cache.invalidate(&format!("list:{parent}")).await;
            }
        }
        Ok(ok)
    }

    async fn mkdir(&self, path: &str) -> Result<bool> {
        let url = self.resource_url(path);
        let result = self
            .request_with_retry(|| {
                self.http
                    .request(reqwest::Method::from_bytes(b"MKCOL").unwrap(), &url)
            })
            .await;
        match result {
            Ok(_) => {
                if let Some(parent) = self.full_path(path).rsplit_once('/').map(|(p, _)| p) {
                    self.dir_cache.invalidate(&format!("list:{parent}")).await;
                }
                Ok(true)
            }
            // MKCOL on an existing collection returns 405 Method Not Allowed; treat as success.
            Err(StorageError::Transient(msg)) if msg.contains("405") => Ok(true),
            Err(e) => Err(e),
        }
    }

    async fn move_file(&self, source: &str, destination: &str) -> Result<bool> {
        let src_url = self.resource_url(source);
        let dst_url = self.resource_url(destination);
        let ok = self
            .request_with_retry(|| {
                self.http
                    .request(reqwest::Method::from_bytes(b"MOVE").unwrap(), &src_url)
                    .header("Destination", dst_url.clone())
                    .header("Overwrite", "F")
            })
            .await
            .is_ok();
        if ok {
            self.dir_cache
                .invalidate_parents_of(&self.full_path(source))
                .await;
            self.dir_cache
                .invalidate_parents_of(&self.full_path(destination))
                .await;
        }
        Ok(ok)
    }

    async fn copy(&self, source: &str, destination: &str) -> Result<bool> {
        let src_url = self.resource_url(source);
        let dst_url = self.resource_url(destination);
        let ok = self
            .request_with_retry(|| {
                self.http
                    .request(reqwest::Method::from_bytes(b"COPY").unwrap(), &src_url)
                    .header("Destination", dst_url.clone())
                    .header("Overwrite", "F")
            })
            .await
            .is_ok();
        if ok {
            self.dir_cache
                .invalidate_parents_of(&self.full_path(destination))
                .await;
        }
        Ok(ok)
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        let url = self.resource_url(path);
        let ok = self.request_with_retry(|| self.http.delete(&url)).await.is_ok();
        if ok {
            self.dir_cache.invalidate_parents_of(&self.full_path(path)).await;
        }
        Ok(ok)
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let url = self.resource_url(path);
        Ok(self.request_with_retry(|| self.http.head(&url)).await.is_ok())
    }

    async fn direct_url(&self, path: &str) -> Result<Option<String>> {
        Ok(Some(self.resource_url(path)))
    }

    async fn refresh_dir(&self, path: &str) -> Result<bool> {
        // WebDAV has no server-side cache to refresh; just evict locally.
        self.dir_cache
            .invalidate(&format!("list:{}", self.full_path(path)))
            .await;
        Ok(true)
    }

    async fn upload_batch(
        &self,
        files: Vec<(String, Vec<u8>)>,
        concurrency: usize,
    ) -> (usize, usize, Vec<String>) {
        if files.is_empty() {
            return (0, 0, vec![]);
        }

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
        for dir in sorted_dirs {
            let _ = self.mkdir(&dir).await;
        }

        let semaphore = std::sync::Arc::new(Semaphore::new(concurrency.max(1)));
        let mut tasks = Vec::with_capacity(files.len());
        for (path, bytes) in files {
            let semaphore = semaphore.clone();
            let url = self.resource_url(&path);
            let http = self.http.clone();
            let username = self.username.clone();
            let password = self.password.clone();
            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await;
                let ok = http
                    .put(&url)
                    .basic_auth(&username, Some(&password))
                    .body(bytes)
                    .send()
                    .await
                    .is_ok_and(|r| r.status().is_success());
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

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:propfind xmlns:D="DAV:">
  <D:prop>
    <D:displayname/>
    <D:resourcetype/>
    <D:getcontentlength/>
    <D:getlastmodified/>
  </D:prop>
</D:propfind>"#;

/// Parses a PROPFIND multistatus response into `FileInfo` entries,
/// skipping the entry for `parent_path` itself (the collection being
/// listed, which WebDAV servers include as the first `<D:response>`).
fn parse_propfind(xml: &str, parent_path: &str) -> Vec<FileInfo> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current_href: Option<String> = None;
    let mut is_collection = false;
    let mut size: Option<u64> = None;
    let mut modified: Option<String> = None;
    let mut in_tag: Option<String> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = local_name(e.name().as_ref());
                if name == "response" {
                    current_href = None;
                    is_collection = false;
                    size = None;
                    modified = None;
                }
                if name == "collection" {
                    is_collection = true;
                }
                in_tag = Some(name);
            }
            Ok(Event::Text(t)) => {
                let text = t.unescape().unwrap_or_default().to_string();
                match in_tag.as_deref() {
                    Some("href") => current_href = Some(text),
                    Some("getcontentlength") => size = text.parse().ok(),
                    Some("getlastmodified") => modified = Some(text),
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                let name = local_name(e.name().as_ref());
                if name == "response" {
                    if let Some(href) = current_href.take() {
                        let decoded = percent_encoding::percent_decode_str(&href)
                            .decode_utf8_lossy()
                            .to_string();
                        let trimmed = decoded.trim_end_matches('/');
                        if trimmed == parent_path || trimmed.is_empty() {
                            continue;
                        }
                        let name = trimmed.rsplit('/').next().unwrap_or(trimmed).to_string();
                        entries.push(FileInfo {
                            path: trimmed.to_string(),
                            name,
                            is_dir: is_collection,
                            size,
                            modified: modified.clone(),
                        });
                    }
                }
                in_tag = None;
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    entries
}

fn local_name(qname: &[u8]) -> String {
    let s = String::from_utf8_lossy(qname);
    s.rsplit(':').next().unwrap_or(&s).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_propfind_multistatus() {
        let xml = r#"<?xml version="1.0"?>
<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/dav/series/</D:href>
    <D:propstat><D:prop><D:resourcetype><D:collection/></D:resourcetype></D:prop></D:propstat>
  </D:response>
  <D:response>
    <D:href>/dav/series/ep1.mkv</D:href>
    <D:propstat><D:prop><D:getcontentlength>1024</D:getcontentlength></D:prop></D:propstat>
  </D:response>
</D:multistatus>"#;
        let entries = parse_propfind(xml, "/dav/series");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "ep1.mkv");
        assert_eq!(entries[0].size, Some(1024));
        assert!(!entries[0].is_dir);
    }

    #[test]
    fn full_path_prefixes_base() {
        let client = WebDavClient::new("http://x", "u", "p", "/remote.php/dav/files/u");
        assert_eq!(
            client.full_path("series/ep1.mkv"),
            "/remote.php/dav/files/u/series/ep1.mkv"
        );
    }

    #[tokio::test]
    async fn list_backs_off_once_on_429_then_succeeds() {
        let server = wiremock::MockServer::start().await;
        let succeeded = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let succeeded_clone = succeeded.clone();
        wiremock::Mock::given(wiremock::matchers::method("PROPFIND"))
            .and(wiremock::matchers::path("/dav"))
            .respond_with(move |_: &wiremock::Request| {
                if succeeded_clone.swap(true, std::sync::atomic::Ordering::SeqCst) {
                    wiremock::ResponseTemplate::new(207)
                        .set_body_string(r#"<?xml version="1.0"?><D:multistatus xmlns:D="DAV:"></D:multistatus>"#)
                        .append_header("content-type", "application/xml")
                } else {
                    wiremock::ResponseTemplate::new(429)
                }
            })
            .mount(&server)
            .await;

        let client = WebDavClient::new(server.uri(), "u", "p", "/");
        let started = std::time::Instant::now();
        let result = client.list("/").await;

        assert!(result.is_ok());
        assert!(succeeded.load(std::sync::atomic::Ordering::SeqCst));
        assert!(started.elapsed() >= cfg::RATE_LIMIT_BACKOFF);
    }

    #[tokio::test]
    async fn request_with_retry_fails_fast_on_401() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("PROPFIND"))
            .and(wiremock::matchers::path("/dav"))
            .respond_with(wiremock::ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = WebDavClient::new(server.uri(), "u", "p", "/");
        let result = client.list("/").await;

        assert!(matches!(result, Err(StorageError::Authentication(_))));
    }
}
