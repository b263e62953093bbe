//! Metadata collaborator contract backing `lookup_metadata` /
//! `get_metadata_details`.
//!
//! The actual movie/TV database lookup is an external collaborator out of
//! scope for this repository; this module defines the pure contract the
//! episode resolver depends on, plus an in-memory test double used by the
//! resolver's and orchestrator's own tests.

use crate::domain::{Kind, SeriesId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod tmdb;
pub use tmdb::TmdbMetadataProvider;

/// One episode as reported by the provider, before resolver numbering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderEpisode {
    /// The provider's own episode number within the season (may not be
    /// contiguous or may be renumbered relative to broadcast order).
    pub episode_number: i32,
}

/// One season as reported by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSeason {
    pub season_number: i32,
    pub episodes: Vec<ProviderEpisode>,
}

/// Series-level metadata as reported by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesDetails {
    pub series_id: SeriesId,
    pub title: String,
    pub kind: Kind,
    pub year: Option<i32>,
    pub genres: Vec<String>,
    pub seasons: Vec<ProviderSeason>,
}

/// A single search hit for `lookup_metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub series_id: SeriesId,
    pub title: String,
    pub kind: Kind,
    pub year: Option<i32>,
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata provider request failed: {0}")]
    Request(String),
    #[error("series not found: {0}")]
    NotFound(SeriesId),
}

pub type Result<T> = std::result::Result<T, MetadataError>;

/// The collaborator the episode resolver depends on.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn search(&self, query: &str, kind: Kind) -> Result<Vec<SearchHit>>;

    async fn details(&self, series_id: &SeriesId, kind: Kind) -> Result<SeriesDetails>;
}

#[cfg(test)]
pub mod test_double {
    use super::{
        Kind, MetadataProvider, ProviderEpisode, ProviderSeason, Result, SearchHit, SeriesDetails,
        SeriesId,
    };
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Fixed in-memory catalog used by resolver/classifier/orchestrator tests.
    pub struct FakeMetadataProvider {
        pub catalog: HashMap<String, SeriesDetails>,
    }

    impl FakeMetadataProvider {
        #[must_use]
        pub fn with_series(details: SeriesDetails) -> Self {
            let mut catalog = HashMap::new();
            catalog.insert(details.series_id.to_string(), details);
            Self { catalog }
        }

        #[must_use]
        pub fn tv_series(id: &str, title: &str, seasons: Vec<(i32, i32)>) -> SeriesDetails {
            SeriesDetails {
                series_id: SeriesId::new(id),
                title: title.to_string(),
                kind: Kind::Tv,
                year: Some(2020),
                genres: vec!["Animation".to_string()],
                seasons: seasons
                    .into_iter()
                    .map(|(season_number, episode_count)| ProviderSeason {
                        season_number,
                        episodes: (1..=episode_count)
                            .map(|n| ProviderEpisode { episode_number: n })
                            .collect(),
                    })
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl MetadataProvider for FakeMetadataProvider {
        async fn search(&self, query: &str, kind: Kind) -> Result<Vec<SearchHit>> {
            Ok(self
                .catalog
                .values()
                .filter(|d| d.kind == kind && d.title.to_lowercase().contains(&query.to_lowercase()))
                .map(|d| SearchHit {
                    series_id: d.series_id.clone(),
                    title: d.title.clone(),
                    kind: d.kind,
                    year: d.year,
                })
                .collect())
        }

        async fn details(&self, series_id: &SeriesId, _kind: Kind) -> Result<SeriesDetails> {
            self.catalog
                .get(series_id.as_str())
                .cloned()
                .ok_or_else(|| super::MetadataError::NotFound(series_id.clone()))
        }
    }
}
