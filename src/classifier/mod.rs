//! Classifier: pure rule-matching and episode-number extraction
//! over a scanned file inventory.

use crate::domain::SeriesId;
use crate::resolver::SeriesMapping;
use crate::scanner::{ScannedFile, extract_subtitle_language};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

/// One classification rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MappingRule {
    Series {
        path_pattern: String,
        series_id: SeriesId,
        context: SeriesContext,
    },
    Movie {
        file_pattern: String,
        series_id: SeriesId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesContext {
    Cumulative,
    Season(i32),
}

/// Outcome status for one classified file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifyStatus {
    Matched,
    Unmatched,
    Error,
}

/// One file's classification result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifyResult {
    pub file_path: String,
    pub file_name: String,
    pub extracted_number: Option<i32>,
    pub status: ClassifyStatus,
    pub series_id: Option<SeriesId>,
    pub season: i32,
    pub episode: i32,
    pub output_name: Option<String>,
    pub error_message: Option<String>,
}

fn get_regex(slot: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    slot.get_or_init(|| Regex::new(pattern).expect("classifier regex patterns are compile-time constants"))
}

fn codec_marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    get_regex(&RE, r"(?i)x264|x265|h264|h265|hevc|avc|ma10p|10bit")
}

/// Number-extraction pattern chain. Tried in order; first match
/// whose value is in `[1, 999]` wins.
fn number_patterns() -> [&'static Regex; 6] {
    static P1: OnceLock<Regex> = OnceLock::new();
    static P2: OnceLock<Regex> = OnceLock::new();
    static P3: OnceLock<Regex> = OnceLock::new();
    static P4: OnceLock<Regex> = OnceLock::new();
    static P5: OnceLock<Regex> = OnceLock::new();
    static P6: OnceLock<Regex> = OnceLock::new();
    [
        get_regex(&P1, r"(?i)EP?\.?(\d{2,4})"),
        get_regex(&P2, r"(?i)E(\d{2,4})"),
        get_regex(&P3, r"第(\d{1,4})[集话話]"),
        get_regex(&P4, r"\[(\d{2,4})\]"),
        get_regex(&P5, r"[.\s\-_](\d{2,4})[.\s\-_\[]"),
        get_regex(&P6, r"(?i)S\d+E(\d{2,4})"),
    ]
}

/// Extracts the episode number from a filename.
///
/// Strips codec markers first, then tries each pattern in the fixed
/// order. Pattern 2 is a plain `E(\d{2,4})` match with a manual
/// not-preceded-by-x/h post-filter standing in for `(?<![xh])E(\d{2,4})`,
/// since the `regex` crate has no lookbehind support.
#[must_use]
pub fn extract_episode_number(filename: &str) -> Option<i32> {
    let stripped = codec_marker_regex().replace_all(filename, "");

    for (index, pattern) in number_patterns().into_iter().enumerate() {
        let Some(caps) = pattern.captures(&stripped) else {
            continue;
        };
        if index == 1 {
            let full_match = caps.get(0).unwrap();
            let preceding = full_match.start().checked_sub(1).map(|i| stripped.as_bytes()[i]);
            if let Some(byte) = preceding {
                let ch = (byte as char).to_ascii_lowercase();
                if ch == 'x' || ch == 'h' {
                    continue;
                }
            }
        }
        if let Ok(value) = caps[1].parse::<i32>() {
            if (crate::constants::numbers::MIN_EPISODE_NUMBER..=crate::constants::numbers::MAX_EPISODE_NUMBER)
                .contains(&value)
            {
                return Some(value);
            }
        }
    }
    None
}

/// Strips extension and any trailing recognized language-code segment so
/// two files (video + subtitle) can be compared for a shared base name.
#[must_use]
pub fn base_name(filename: &str, is_subtitle: bool) -> String {
    let without_ext = filename.rsplit_once('.').map_or(filename, |(stem, _)| stem);
    if !is_subtitle {
        return without_ext.to_string();
    }
    let lang = extract_subtitle_language(filename);
    if lang == "und" {
        return without_ext.to_string();
    }
    without_ext
        .strip_suffix(&format!(".{lang}"))
        .unwrap_or(without_ext)
        .to_string()
}

fn matches_rule(file: &ScannedFile, rule: &MappingRule) -> bool {
    match rule {
        MappingRule::Series { path_pattern, .. } => file
            .path
            .to_lowercase()
            .contains(&path_pattern.to_lowercase()),
        MappingRule::Movie { file_pattern, .. } => {
            file.name.to_lowercase().contains(&file_pattern.to_lowercase())
        }
    }
}

/// Classifies the scanned inventory against the rule set and cached
/// series mappings. Only video files are classified directly;
/// subtitles are attached by the materializer via [`base_name`] grouping.
#[must_use]
pub fn classify(
    files: &[ScannedFile],
    rules: &[MappingRule],
    series_maps: &HashMap<(SeriesId, crate::domain::Kind), std::sync::Arc<SeriesMapping>>,
) -> Vec<ClassifyResult> {
    files
        .iter()
        .filter(|f| f.kind == crate::domain::FileKind::Video)
        .map(|file| classify_one(file, rules, series_maps))
        .collect()
}

fn classify_one(
    file: &ScannedFile,
    rules: &[MappingRule],
    series_maps: &HashMap<(SeriesId, crate::domain::Kind), std::sync::Arc<SeriesMapping>>,
) -> ClassifyResult {
    let Some(rule) = rules.iter().find(|r| matches_rule(file, r)) else {
        return ClassifyResult {
            file_path: file.path.clone(),
            file_name: file.name.clone(),
            extracted_number: None,
            status: ClassifyStatus::Unmatched,
            series_id: None,
            season: 0,
            episode: 0,
            output_name: None,
            error_message: Some("no rule".to_string()),
        };
    };

    match rule {
        MappingRule::Movie { series_id, .. } => ClassifyResult {
            file_path: file.path.clone(),
            file_name: file.name.clone(),
            extracted_number: None,
            status: ClassifyStatus::Matched,
            series_id: Some(series_id.clone()),
            season: 0,
            episode: 0,
            output_name: None,
            error_message: None,
        },
        MappingRule::Series {
            series_id, context, ..
        } => classify_series_file(file, series_id, *context, series_maps),
    }
}

fn classify_series_file(
    file: &ScannedFile,
    series_id: &SeriesId,
    context: SeriesContext,
    series_maps: &HashMap<(SeriesId, crate::domain::Kind), std::sync::Arc<SeriesMapping>>,
) -> ClassifyResult {
    let Some(number) = extract_episode_number(&file.name) else {
        return ClassifyResult {
            file_path: file.path.clone(),
            file_name: file.name.clone(),
            extracted_number: None,
            status: ClassifyStatus::Error,
            series_id: Some(series_id.clone()),
            season: 0,
            episode: 0,
            output_name: None,
            error_message: Some("no number".to_string()),
        };
    };

    let mapping = series_maps
        .get(&(series_id.clone(), crate::domain::Kind::Tv))
        .or_else(|| series_maps.get(&(series_id.clone(), crate::domain::Kind::Movie)));

    let episode_info = mapping.and_then(|m| match context {
        SeriesContext::Cumulative => m.by_cumulative.get(&number).copied(),
        SeriesContext::Season(season) => m.by_season_episode.get(&(season, number)).copied(),
    });

    match episode_info {
        Some(info) => ClassifyResult {
            file_path: file.path.clone(),
            file_name: file.name.clone(),
            extracted_number: Some(number),
            status: ClassifyStatus::Matched,
            series_id: Some(series_id.clone()),
            season: info.season,
            episode: info.canonical_episode,
            output_name: Some(format!("S{:02}E{:02}", info.season, info.canonical_episode)),
            error_message: None,
        },
        None => ClassifyResult {
            file_path: file.path.clone(),
            file_name: file.name.clone(),
            extracted_number: Some(number),
            status: ClassifyStatus::Unmatched,
            series_id: Some(series_id.clone()),
            season: 0,
            episode: 0,
            output_name: None,
            error_message: Some("no mapping entry for extracted number".to_string()),
        },
    }
}

/// One subtitle attached to a classified video by base-name grouping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleRef {
    pub source_path: String,
    pub language: String,
}

/// A classified video plus its grouped subtitles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedFile {
    pub source_path: String,
    pub name: String,
    pub episode: i32,
    pub season: i32,
    pub subtitles: Vec<SubtitleRef>,
}

/// Per-series aggregate consumed by the Materializer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub series_id: SeriesId,
    pub name: String,
    pub kind: crate::domain::Kind,
    pub year: Option<i32>,
    pub genres: Vec<String>,
    pub subcategory: crate::naming::Subcategory,
    pub seasons: HashMap<i32, Vec<ClassifiedFile>>,
    pub files: Vec<ClassifiedFile>,
}

/// Groups matched `classify` results into per-series `Classification`s,
/// attaching subtitles that share a video's base name in the same
/// directory.
#[must_use]
pub fn aggregate_classifications(
    results: &[ClassifyResult],
    all_files: &[ScannedFile],
    series_details: &HashMap<SeriesId, crate::metadata::SeriesDetails>,
) -> Vec<Classification> {
    let subtitles_by_dir: HashMap<&str, Vec<&ScannedFile>> = all_files
        .iter()
        .filter(|f| f.kind == crate::domain::FileKind::Subtitle)
        .fold(HashMap::new(), |mut acc, f| {
            acc.entry(f.directory.as_str()).or_default().push(f);
            acc
        });

    let video_dirs: HashMap<&str, &str> = all_files
        .iter()
        .map(|f| (f.path.as_str(), f.directory.as_str()))
        .collect();

    let mut by_series: HashMap<SeriesId, Classification> = HashMap::new();

    for result in results.iter().filter(|r| r.status == ClassifyStatus::Matched) {
        let Some(series_id) = &result.series_id else {
            continue;
        };
        let details = series_details.get(series_id);
        let entry = by_series.entry(series_id.clone()).or_insert_with(|| Classification {
            series_id: series_id.clone(),
            name: details.map_or_else(|| series_id.to_string(), |d| d.title.clone()),
            kind: details.map_or(crate::domain::Kind::Tv, |d| d.kind),
            year: details.and_then(|d| d.year),
            genres: details.map(|d| d.genres.clone()).unwrap_or_default(),
            subcategory: crate::naming::derive_subcategory(
                details.map(|d| d.genres.as_slice()).unwrap_or_default(),
            ),
            seasons: HashMap::new(),
            files: Vec::new(),
        });

        let directory = video_dirs.get(result.file_path.as_str()).copied().unwrap_or("");
        let video_base = base_name(&result.file_name, false);
        let subtitles = subtitles_by_dir
            .get(directory)
            .into_iter()
            .flatten()
            .filter(|s| base_name(&s.name, true) == video_base)
            .map(|s| SubtitleRef {
                source_path: s.path.clone(),
                language: s.language.clone().unwrap_or_else(|| "und".to_string()),
            })
            .collect();

        let classified = ClassifiedFile {
            source_path: result.file_path.clone(),
            name: result.file_name.clone(),
            episode: result.episode,
            season: result.season,
            subtitles,
        };

        if entry.kind == crate::domain::Kind::Movie {
            entry.files.push(classified);
        } else {
            entry.seasons.entry(result.season).or_default().push(classified);
        }
    }

    by_series.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FileKind, Kind};
    use crate::resolver::EpisodeInfo;

    fn scanned(path: &str) -> ScannedFile {
        ScannedFile {
            path: path.to_string(),
            name: path.rsplit('/').next().unwrap().to_string(),
            size: Some(1),
            kind: FileKind::Video,
            directory: "/lib".to_string(),
            language: None,
        }
    }

    fn mapping_with(series_id: &str) -> (SeriesId, Kind, std::sync::Arc<SeriesMapping>) {
        let id = SeriesId::new(series_id);
        let info = EpisodeInfo {
            season: 1,
            episode_in_season: 1,
            canonical_episode: 1,
            cumulative: 1,
        };
        let mapping = SeriesMapping {
            series_id: id.clone(),
            title: "Show".to_string(),
            kind: Kind::Tv,
            by_cumulative: HashMap::from([(1, info)]),
            by_season_episode: HashMap::from([((1, 1), info)]),
            total_seasons: 1,
            total_episodes: 1,
            specials: vec![],
        };
        (id, Kind::Tv, std::sync::Arc::new(mapping))
    }

    #[test]
    fn extracts_number_from_ep_pattern() {
        assert_eq!(extract_episode_number("Show.EP01.mkv"), Some(1));
        assert_eq!(extract_episode_number("Show.E05.1080p.mkv"), Some(5));
    }

    #[test]
    fn pattern_two_rejects_x264_h265_false_positives() {
        // "x264" would match a bare E-pattern on digits if not filtered.
        assert_eq!(extract_episode_number("Show.x264.mkv"), None);
    }

    #[test]
    fn extracts_chinese_episode_marker() {
        assert_eq!(extract_episode_number("节目第03集.mkv"), Some(3));
    }

    #[test]
    fn out_of_range_first_match_falls_through_to_next_pattern_not_next_occurrence() {
        // "[0000]" is this pattern's first occurrence and is out of
        // range (0); a second occurrence of the *same* pattern later in
        // the name ("[05]") must not be tried — the chain should move
        // on to the remaining patterns instead, none of which match.
        assert_eq!(extract_episode_number("Show.[0000].ok.[05].mkv"), None);
    }

    #[test]
    fn base_name_strips_extension_and_language_tag() {
        assert_eq!(base_name("ep01.mkv", false), "ep01");
        assert_eq!(base_name("ep01.chs.ass", true), "ep01");
        assert_eq!(base_name("ep01.srt", true), "ep01");
    }

    #[test]
    fn classify_matches_cumulative_rule() {
        let (id, kind, mapping) = mapping_with("tmdb:1");
        let maps = HashMap::from([((id.clone(), kind), mapping)]);
        let rules = vec![MappingRule::Series {
            path_pattern: "/lib".to_string(),
            series_id: id,
            context: SeriesContext::Cumulative,
        }];
        let files = vec![scanned("/lib/Show.EP01.mkv")];

        let results = classify(&files, &rules, &maps);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, ClassifyStatus::Matched);
        assert_eq!(results[0].output_name.as_deref(), Some("S01E01"));
    }

    #[test]
    fn classify_reports_no_rule_when_nothing_matches() {
        let files = vec![scanned("/other/Show.EP01.mkv")];
        let results = classify(&files, &[], &HashMap::new());
        assert_eq!(results[0].status, ClassifyStatus::Unmatched);
        assert_eq!(results[0].error_message.as_deref(), Some("no rule"));
    }

    #[test]
    fn classify_reports_no_number_for_unnumbered_file() {
        let (id, _, _) = mapping_with("tmdb:1");
        let rules = vec![MappingRule::Series {
            path_pattern: "/lib".to_string(),
            series_id: id,
            context: SeriesContext::Cumulative,
        }];
        let files = vec![scanned("/lib/Show.mkv")];

        let results = classify(&files, &rules, &HashMap::new());
        assert_eq!(results[0].status, ClassifyStatus::Error);
        assert_eq!(results[0].error_message.as_deref(), Some("no number"));
    }

    #[test]
    fn classify_movie_rule_sets_zero_season_and_episode() {
        let id = SeriesId::new("tmdb:movie:1");
        let rules = vec![MappingRule::Movie {
            file_pattern: "movie".to_string(),
            series_id: id,
        }];
        let files = vec![scanned("/lib/Some.Movie.2020.mkv")];

        let results = classify(&files, &rules, &HashMap::new());
        assert_eq!(results[0].status, ClassifyStatus::Matched);
        assert_eq!(results[0].season, 0);
        assert_eq!(results[0].episode, 0);
    }
}
