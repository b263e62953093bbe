//! Naming / Subcategory: filename sanitation, folder path synthesis, and
//! the subcategory display-name tables.

use crate::domain::{Kind, NamingLanguage};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde::{Deserialize, Serialize};

/// One of the five fixed subcategories a series falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subcategory {
    Animation,
    Documentary,
    Music,
    Variety,
    Default,
}

/// Walks `genres` in order and returns the first matching subcategory from
/// a fixed ordered table. `Default` if nothing matches.
#[must_use]
pub fn derive_subcategory(genres: &[String]) -> Subcategory {
    for genre in genres {
        let lowered = genre.to_lowercase();
        if lowered.contains("animation") || genre.contains('动') {
            return Subcategory::Animation;
        }
        if lowered.contains("documentary") || genre.contains("纪录") {
            return Subcategory::Documentary;
        }
        if lowered.contains("music") || genre.contains("音乐") {
            return Subcategory::Music;
        }
        if lowered.contains("reality") || lowered.contains("talk") || genre.contains("真人秀") || genre.contains("脱口秀") {
            return Subcategory::Variety;
        }
    }
    Subcategory::Default
}

/// Four-way (subcategory, kind, language) → display-name lookup table.
#[must_use]
pub fn subcategory_display_name(subcategory: Subcategory, kind: Kind, language: NamingLanguage) -> &'static str {
    use NamingLanguage::{En, Zh};
    use Subcategory::{Animation, Default, Documentary, Music, Variety};
    match (subcategory, kind, language) {
        (Animation, _, Zh) => "动画",
        (Animation, _, En) => "Anime",
        (Documentary, _, Zh) => "纪录片",
        (Documentary, _, En) => "Documentary",
        (Music, _, Zh) => "音乐",
        (Music, _, En) => "Music",
        (Variety, _, Zh) => "综艺",
        (Variety, _, En) => "Variety",
        (Default, Kind::Tv, Zh) => "剧集",
        (Default, Kind::Tv, En) => "TV",
        (Default, Kind::Movie, Zh) => "电影",
        (Default, Kind::Movie, En) => "Movies",
    }
}

/// Top-level kind folder name used when synthesizing a file's target path.
#[must_use]
pub fn kind_folder(kind: Kind, language: NamingLanguage) -> &'static str {
    match (kind, language) {
        (Kind::Tv, NamingLanguage::Zh) => "剧集",
        (Kind::Tv, NamingLanguage::En) => "TV",
        (Kind::Movie, NamingLanguage::Zh) => "电影",
        (Kind::Movie, NamingLanguage::En) => "Movies",
    }
}

/// Filename/folder sanitation, applied in this exact order since
/// later steps depend on earlier ones having already run (e.g. the
/// trailing-`.`/space trim in step 7 must happen after the `!`-stripping
/// in steps 4-5, or a title ending in `"! "` leaves a dangling space).
#[must_use]
pub fn sanitize_filename(input: &str) -> String {
    let mut s: String = input
        .chars()
        .map(|c| match c {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '.',
            '~' => '-',
            other => other,
        })
        .collect();

    s.retain(|c| c != '\'');

    s = s.trim_end_matches('!').to_string();
    s = s.trim_start_matches('!').to_string();

    while s.contains("..") {
        s = s.replace("..", ".");
    }

    s.trim_matches(|c: char| c == '.' || c == ' ').to_string()
}

#[must_use]
pub fn format_series_folder(title: &str, year: Option<i32>) -> String {
    let clean_title = sanitize_filename(title);
    match year {
        Some(y) => format!("{clean_title} ({y})"),
        None => clean_title,
    }
}

#[must_use]
pub fn format_season_folder(season: i32) -> String {
    format!("Season {season:02}")
}

#[must_use]
pub fn format_movie_folder(title: &str, year: Option<i32>) -> String {
    format_series_folder(title, year)
}

#[must_use]
pub fn format_episode_name(title: &str, season: i32, episode: i32, ext: &str) -> String {
    let clean_title = sanitize_filename(title);
    format!("{clean_title}.S{season:02}.E{episode:02}{ext}")
}

#[must_use]
pub fn format_movie_name(title: &str, year: Option<i32>, ext: &str) -> String {
    let clean_title = sanitize_filename(title).replace(' ', ".");
    match year {
        Some(y) => format!("{clean_title}.{y}{ext}"),
        None => format!("{clean_title}{ext}"),
    }
}

#[must_use]
pub fn format_subtitle_name(
    title: &str,
    season: i32,
    episode: i32,
    language: Option<&str>,
    ext: &str,
) -> String {
    let clean_title = sanitize_filename(title);
    match language {
        Some(lang) => format!("{clean_title}.S{season:02}.E{episode:02}.{lang}{ext}"),
        None => format!("{clean_title}.S{season:02}.E{episode:02}{ext}"),
    }
}

/// Pick the single "default" subtitle among a set of candidates by
/// language priority. Returns the index of the winner, if any.
#[must_use]
pub fn pick_default_subtitle_index(languages: &[String]) -> Option<usize> {
    crate::constants::SUBTITLE_LANGUAGE_PRIORITY
        .iter()
        .find_map(|preferred| languages.iter().position(|l| l == preferred))
}

/// Characters JavaScript's `encodeURI` leaves unescaped beyond the usual
/// unreserved set (`!'()*` are untouched by `encodeURI`, but `/` is kept
/// literal here since it separates path segments).
const ENCODE_URI_RESERVED: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Percent-encodes a path the way JavaScript's `encodeURI` would, leaving
/// `/` unescaped so a full path can be encoded in one pass for direct URL
/// construction.
#[must_use]
pub fn encode_uri_path(path: &str) -> String {
    utf8_percent_encode(path, ENCODE_URI_RESERVED).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_forbidden_characters() {
        assert_eq!(sanitize_filename("A/B:C*D?E\"F<G>H|I"), "A.B.C.D.E.F.G.H.I");
    }

    #[test]
    fn sanitize_collapses_runs_of_dots() {
        assert_eq!(sanitize_filename("Title...Name"), "Title.Name");
    }

    #[test]
    fn sanitize_strips_quotes_and_tilde() {
        assert_eq!(sanitize_filename("It's~Here"), "Its-Here");
    }

    #[test]
    fn sanitize_strips_leading_trailing_bang_then_trims() {
        // Trailing "!" isn't literally at the string's end here (a space
        // follows it), so only the leading "!" and the trailing space
        // are removed, per the fixed step order.
        assert_eq!(sanitize_filename("!Wow! "), "Wow!");
        assert_eq!(sanitize_filename("!Wow!"), "Wow");
    }

    #[test]
    fn sanitize_trims_leading_trailing_dots_and_spaces() {
        assert_eq!(sanitize_filename("  .Title. "), "Title");
    }

    #[test]
    fn subcategory_derivation_matches_first_genre_hit() {
        let genres = vec!["Drama".to_string(), "Animation".to_string()];
        assert_eq!(derive_subcategory(&genres), Subcategory::Animation);
        assert_eq!(derive_subcategory(&["Drama".to_string()]), Subcategory::Default);
    }

    #[test]
    fn subcategory_display_table_covers_all_combinations() {
        assert_eq!(
            subcategory_display_name(Subcategory::Animation, Kind::Tv, NamingLanguage::Zh),
            "动画"
        );
        assert_eq!(
            subcategory_display_name(Subcategory::Default, Kind::Movie, NamingLanguage::En),
            "Movies"
        );
    }

    #[test]
    fn episode_and_movie_filename_formats() {
        assert_eq!(
            format_episode_name("Show", 1, 2, ".mkv"),
            "Show.S01.E02.mkv"
        );
        assert_eq!(format_movie_name("A Movie", Some(2020), ".mkv"), "A.Movie.2020.mkv");
        assert_eq!(format_movie_name("A Movie", None, ".mkv"), "A.Movie.mkv");
    }

    #[test]
    fn default_subtitle_picked_by_priority() {
        let langs = vec!["eng".to_string(), "chs".to_string(), "jpn".to_string()];
        assert_eq!(pick_default_subtitle_index(&langs), Some(1));
        assert_eq!(pick_default_subtitle_index(&["und".to_string()]), Some(0));
        assert_eq!(pick_default_subtitle_index(&[]), None);
    }

    #[test]
    fn encode_uri_path_leaves_slash_and_unicode_but_escapes_space() {
        let encoded = encode_uri_path("/动画/Show S01E02.mkv");
        assert!(encoded.starts_with('/'));
        assert!(encoded.contains("%20"));
    }
}
