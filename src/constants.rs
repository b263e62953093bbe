//! Application-wide constants
//!
//! Centralizes magic values that are used across multiple modules.

/// Video file extensions recognized during scanning, lowercase, no leading dot.
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "m4v", "ts", "rmvb", "rm", "3gp", "m2ts",
    "vob", "mpg", "mpeg",
];

/// Subtitle file extensions recognized during scanning, lowercase, no leading dot.
pub const SUBTITLE_EXTENSIONS: &[&str] = &["srt", "ass", "ssa", "sub"];

/// Compound language codes kept verbatim when found as the last dot segment.
pub const COMPOUND_LANGUAGE_CODES: &[&str] =
    &["scjp", "tcjp", "chsjp", "chtjp", "chs_jp", "cht_jp"];

/// Subtitle default-selection priority, most preferred first.
pub const SUBTITLE_LANGUAGE_PRIORITY: &[&str] = &[
    "chs", "sc", "chsjp", "scjp", "cht", "tc", "chtjp", "tcjp", "eng", "en", "jpn", "jap", "jp",
    "und",
];

/// Directory cache and rate-limit/retry tuning.
pub mod storage {
    use std::time::Duration;

    pub const CACHE_TTL: Duration = Duration::from_secs(300);
    pub const CACHE_CAPACITY: usize = 100;
    pub const MAX_RETRIES: u32 = 3;
    pub const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(5);
    pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
    pub const ALIST_COPY_POLL_INTERVAL: Duration = Duration::from_millis(500);
    pub const ALIST_COPY_POLL_TIMEOUT: Duration = Duration::from_secs(30);
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
    pub const READ_WRITE_TIMEOUT: Duration = Duration::from_secs(60);
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(10);
    pub const MIN_IDLE_CONNECTIONS_PER_HOST: usize = 32;
}

/// Concurrency pool sizes.
pub mod pools {
    pub const UPLOAD_CONCURRENCY: usize = 16;
    pub const REFRESH_CONCURRENCY: usize = 4;
}

/// Number-extraction bounds.
pub mod numbers {
    pub const MIN_EPISODE_NUMBER: i32 = 1;
    pub const MAX_EPISODE_NUMBER: i32 = 999;
}

/// Per-file-failure reporting limits.
pub mod reporting {
    pub const MAX_FAILED_PATHS_SHOWN: usize = 10;
}
