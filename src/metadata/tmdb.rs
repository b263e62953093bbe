//! TMDB-backed `MetadataProvider`: a real TMDB-shaped client substitutable
//! for the pure trait contract in [`super`], in the same shape as
//! [`crate::storage::alist`]'s login/request pattern: a config-less client
//! struct, methods returning `Result<T>`, retries left to the caller.

use super::{Kind, MetadataError, MetadataProvider, ProviderEpisode, ProviderSeason, Result, SearchHit, SeriesDetails, SeriesId};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

pub struct TmdbMetadataProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl TmdbMetadataProvider {
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client config is static and valid");

        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn media_segment(kind: Kind) -> &'static str {
        match kind {
            Kind::Tv => "tv",
            Kind::Movie => "movie",
        }
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let mut req = self
            .http
            .get(format!("{}{path}", self.base_url))
            .query(&[("api_key", self.api_key.as_str())]);
        for (k, v) in query {
            req = req.query(&[(*k, v.as_str())]);
        }
        let resp = req
            .send()
            .await
            .map_err(|e| MetadataError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(MetadataError::Request(format!("TMDB returned {}", resp.status())));
        }
        resp.json::<T>()
            .await
            .map_err(|e| MetadataError::Request(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct TmdbSearchResponse {
    results: Vec<TmdbSearchResult>,
}

#[derive(Debug, Deserialize)]
struct TmdbSearchResult {
    id: i64,
    #[serde(default, alias = "name")]
    title: String,
    release_date: Option<String>,
    first_air_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TmdbDetailsResponse {
    #[serde(default, alias = "name")]
    title: String,
    release_date: Option<String>,
    first_air_date: Option<String>,
    #[serde(default)]
    genres: Vec<TmdbGenre>,
    #[serde(default)]
    seasons: Vec<TmdbSeasonSummary>,
}

#[derive(Debug, Deserialize)]
struct TmdbGenre {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TmdbSeasonSummary {
    season_number: i32,
}

#[derive(Debug, Deserialize)]
struct TmdbSeasonDetailsResponse {
    episodes: Vec<TmdbEpisodeSummary>,
}

#[derive(Debug, Deserialize)]
struct TmdbEpisodeSummary {
    episode_number: i32,
}

fn extract_year(release_date: &Option<String>, first_air_date: &Option<String>) -> Option<i32> {
    release_date
        .as_deref()
        .or(first_air_date.as_deref())
        .and_then(|d| d.get(0..4))
        .and_then(|y| y.parse().ok())
}

#[async_trait]
impl MetadataProvider for TmdbMetadataProvider {
    async fn search(&self, query: &str, kind: Kind) -> Result<Vec<SearchHit>> {
        let path = format!("/search/{}", Self::media_segment(kind));
        let response: TmdbSearchResponse = self
            .get_json(&path, &[("query", query.to_string())])
            .await?;

        Ok(response
            .results
            .into_iter()
            .map(|r| SearchHit {
                series_id: SeriesId::new(r.id.to_string()),
                title: r.title,
                kind,
                year: extract_year(&r.release_date, &r.first_air_date),
            })
            .collect())
    }

    async fn details(&self, series_id: &SeriesId, kind: Kind) -> Result<SeriesDetails> {
        let path = format!("/{}/{}", Self::media_segment(kind), series_id.as_str());
        let details: TmdbDetailsResponse = self.get_json(&path, &[]).await?;

        let mut seasons = Vec::new();
        if matches!(kind, Kind::Tv) {
            // Season 0 (specials) is fetched too — the resolver is what
            // excludes it from cumulative numbering while still exposing
            // it via `SeriesMapping::specials`.
            for summary in &details.seasons {
                let season_path = format!(
                    "/tv/{}/season/{}",
                    series_id.as_str(),
                    summary.season_number
                );
                let season_details: TmdbSeasonDetailsResponse =
                    self.get_json(&season_path, &[]).await?;
                seasons.push(ProviderSeason {
                    season_number: summary.season_number,
                    episodes: season_details
                        .episodes
                        .into_iter()
                        .map(|e| ProviderEpisode {
                            episode_number: e.episode_number,
                        })
                        .collect(),
                });
            }
        }

        Ok(SeriesDetails {
            series_id: series_id.clone(),
            title: details.title,
            kind,
            year: extract_year(&details.release_date, &details.first_air_date),
            genres: details.genres.into_iter().map(|g| g.name).collect(),
            seasons,
        })
    }
}
