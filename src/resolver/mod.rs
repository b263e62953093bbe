//! Episode Resolver: builds and caches the cumulative/season-episode
//! numbering map for a series from the metadata collaborator.

use crate::domain::{Kind, SeriesId};
use crate::metadata::{MetadataProvider, Result as MetadataResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// One episode's position in both the per-season and cumulative numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeInfo {
    pub season: i32,
    pub episode_in_season: i32,
    pub canonical_episode: i32,
    pub cumulative: i32,
}

/// Aggregated per-season numbering, derived from a built `SeriesMapping`
/// (resolved from `tmdb_mapping.py`'s `get_season_info`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeasonInfo {
    pub season: i32,
    pub episode_count: i32,
    pub canonical_start: i32,
    pub canonical_end: i32,
    pub cumulative_start: i32,
    pub cumulative_end: i32,
}

/// The complete episode numbering for one series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesMapping {
    pub series_id: SeriesId,
    pub title: String,
    pub kind: Kind,
    pub by_cumulative: HashMap<i32, EpisodeInfo>,
    pub by_season_episode: HashMap<(i32, i32), EpisodeInfo>,
    pub total_seasons: i32,
    pub total_episodes: i32,
    pub specials: Vec<EpisodeInfo>,
}

impl SeriesMapping {
    #[must_use]
    pub fn season_info(&self, season: i32) -> Option<SeasonInfo> {
        let mut episodes: Vec<&EpisodeInfo> = self
            .by_season_episode
            .values()
            .filter(|e| e.season == season)
            .collect();
        if episodes.is_empty() {
            return None;
        }
        episodes.sort_by_key(|e| e.episode_in_season);
        let first = episodes.first()?;
        let last = episodes.last()?;
        Some(SeasonInfo {
            season,
            episode_count: episodes.len() as i32,
            canonical_start: first.canonical_episode,
            canonical_end: last.canonical_episode,
            cumulative_start: first.cumulative,
            cumulative_end: last.cumulative,
        })
    }

    #[must_use]
    pub fn all_seasons_info(&self) -> Vec<SeasonInfo> {
        (1..=self.total_seasons)
            .filter_map(|s| self.season_info(s))
            .collect()
    }
}

/// Build a `SeriesMapping` from the metadata provider.
///
/// Season 0 (specials) is excluded from cumulative numbering and exposed
/// separately via `specials`, each with `cumulative = 0`.
pub async fn build_series_mapping(
    provider: &dyn MetadataProvider,
    series_id: &SeriesId,
    kind: Kind,
) -> MetadataResult<SeriesMapping> {
    let details = provider.details(series_id, kind).await?;

    let mut by_cumulative = HashMap::new();
    let mut by_season_episode = HashMap::new();
    let mut specials = Vec::new();
    let mut cumulative = 0;
    let mut total_episodes = 0;
    let mut total_seasons = 0;

    let mut seasons = details.seasons.clone();
    seasons.sort_by_key(|s| s.season_number);

    for season in &seasons {
        if season.season_number == 0 {
            for episode in &season.episodes {
                specials.push(EpisodeInfo {
                    season: 0,
                    episode_in_season: episode.episode_number,
                    canonical_episode: episode.episode_number,
                    cumulative: 0,
                });
            }
            continue;
        }

        total_seasons = total_seasons.max(season.season_number);
        for (index, episode) in season.episodes.iter().enumerate() {
            cumulative += 1;
            total_episodes += 1;
            let episode_in_season = i32::try_from(index + 1).unwrap_or(i32::MAX);
            let info = EpisodeInfo {
                season: season.season_number,
                episode_in_season,
                canonical_episode: episode.episode_number,
                cumulative,
            };
            by_cumulative.insert(cumulative, info);
            by_season_episode.insert((season.season_number, episode_in_season), info);
        }
    }

    Ok(SeriesMapping {
        series_id: details.series_id,
        title: details.title,
        kind: details.kind,
        by_cumulative,
        by_season_episode,
        total_seasons,
        total_episodes,
        specials,
    })
}

/// Process-wide cache of built mappings, keyed by `(series_id, kind)` — the
/// source implementation keyed on a bare int, which collides when the same
/// numeric ID exists as both a TV series and a movie across providers.
#[derive(Default)]
pub struct SeriesMappingCache {
    inner: Mutex<HashMap<(SeriesId, Kind), Arc<SeriesMapping>>>,
}

impl SeriesMappingCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_build(
        &self,
        provider: &dyn MetadataProvider,
        series_id: &SeriesId,
        kind: Kind,
    ) -> MetadataResult<Arc<SeriesMapping>> {
        let key = (series_id.clone(), kind);
        let mut inner = self.inner.lock().await;
        if let Some(mapping) = inner.get(&key) {
            return Ok(Arc::clone(mapping));
        }
        let mapping = Arc::new(build_series_mapping(provider, series_id, kind).await?);
        inner.insert(key, Arc::clone(&mapping));
        Ok(mapping)
    }

    pub async fn clear(&self) {
        self.inner.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::test_double::FakeMetadataProvider;

    #[tokio::test]
    async fn builds_cumulative_and_season_maps() {
        let details = FakeMetadataProvider::tv_series("tmdb:1", "Show", vec![(1, 12), (2, 13)]);
        let provider = FakeMetadataProvider::with_series(details);

        let mapping = build_series_mapping(&provider, &SeriesId::new("tmdb:1"), Kind::Tv)
            .await
            .unwrap();

        assert_eq!(mapping.total_seasons, 2);
        assert_eq!(mapping.total_episodes, 25);
        assert_eq!(mapping.by_cumulative[&1].season, 1);
        assert_eq!(mapping.by_cumulative[&13].season, 2);
        assert_eq!(mapping.by_cumulative[&13].episode_in_season, 1);
        assert_eq!(mapping.by_season_episode[&(2, 1)].cumulative, 13);
    }

    #[tokio::test]
    async fn season_zero_becomes_specials_not_cumulative() {
        let mut details = FakeMetadataProvider::tv_series("tmdb:2", "Show", vec![(0, 2), (1, 5)]);
        details.seasons[0].season_number = 0;
        let provider = FakeMetadataProvider::with_series(details);

        let mapping = build_series_mapping(&provider, &SeriesId::new("tmdb:2"), Kind::Tv)
            .await
            .unwrap();

        assert_eq!(mapping.specials.len(), 2);
        assert!(mapping.specials.iter().all(|e| e.cumulative == 0));
        assert_eq!(mapping.total_episodes, 5);
        assert_eq!(mapping.by_cumulative[&1].season, 1);
    }

    #[tokio::test]
    async fn cache_reuses_built_mapping_for_same_key() {
        let details = FakeMetadataProvider::tv_series("tmdb:3", "Show", vec![(1, 3)]);
        let provider = FakeMetadataProvider::with_series(details);
        let cache = SeriesMappingCache::new();

        let first = cache
            .get_or_build(&provider, &SeriesId::new("tmdb:3"), Kind::Tv)
            .await
            .unwrap();
        let second = cache
            .get_or_build(&provider, &SeriesId::new("tmdb:3"), Kind::Tv)
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn season_info_reports_ranges() {
        let mapping = SeriesMapping {
            series_id: SeriesId::new("x"),
            title: "X".to_string(),
            kind: Kind::Tv,
            by_cumulative: HashMap::new(),
            by_season_episode: HashMap::from([
                (
                    (1, 1),
                    EpisodeInfo {
                        season: 1,
                        episode_in_season: 1,
                        canonical_episode: 1,
                        cumulative: 1,
                    },
                ),
                (
                    (1, 2),
                    EpisodeInfo {
                        season: 1,
                        episode_in_season: 2,
                        canonical_episode: 2,
                        cumulative: 2,
                    },
                ),
            ]),
            total_seasons: 1,
            total_episodes: 2,
            specials: vec![],
        };

        let info = mapping.season_info(1).unwrap();
        assert_eq!(info.episode_count, 2);
        assert_eq!(info.cumulative_end, 2);
        assert!(mapping.season_info(2).is_none());
    }
}
