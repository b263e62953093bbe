//! Domain primitives shared across the storage, resolver, classifier and
//! materializer layers.
//!
//! Follows the Newtype pattern to keep series identifiers, which are
//! opaque strings supplied by the metadata collaborator, from being
//! confused with session identifiers or raw paths.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier for a metadata-provider entry (movie or TV series).
///
/// Treated as an opaque string rather than parsed as an integer, since
/// different metadata providers use different ID schemes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeriesId(String);

impl SeriesId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SeriesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SeriesId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for SeriesId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Media kind, replacing boolean blindness between "is this a movie".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Tv,
    Movie,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tv => "tv",
            Self::Movie => "movie",
        })
    }
}

/// The two file kinds the scanner recognizes; anything else is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Video,
    Subtitle,
}

/// Display language for folder/category names resolved in the naming module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NamingLanguage {
    #[default]
    Zh,
    En,
}

/// Session identifier. A newtype over UUID so it cannot be confused with
/// a `SeriesId` or a raw path string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(uuid::Uuid);

impl SessionId {
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(uuid::Uuid::parse_str(s)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_id_equality_and_display() {
        let a = SeriesId::new("tmdb:123");
        let b = SeriesId::from("tmdb:123");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "tmdb:123");
    }

    #[test]
    fn kind_display() {
        assert_eq!(Kind::Tv.to_string(), "tv");
        assert_eq!(Kind::Movie.to_string(), "movie");
    }

    #[test]
    fn session_id_roundtrips_through_string() {
        let id = SessionId::new();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
