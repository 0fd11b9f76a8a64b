//! Wire types for the TMDB movie endpoints. Field names follow the API's
//! snake_case keys. Anything a list response may omit is an `Option` and is
//! skipped again on serialization, so a parsed value re-serializes to the
//! fields it was read from. An explicit `null` reads as unset, the same as a
//! missing key, and is omitted on the way back out.
use serde::{Deserialize, Serialize};

use crate::links::{self, ImageSize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backdrop_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub popularity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote_average: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adult: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre_ids: Option<Vec<i64>>,

    // Detail-only fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revenue: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genres: Option<Vec<Genre>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub production_companies: Option<Vec<ProductionCompany>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub production_countries: Option<Vec<ProductionCountry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spoken_languages: Option<Vec<SpokenLanguage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imdb_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tagline: Option<String>,

    /// Never sent by TMDB. Filled in by the repository from the favorites store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favourite: Option<bool>,
}

impl Movie {
    pub fn with_favourite(mut self, favourite: bool) -> Self {
        self.favourite = Some(favourite);
        self
    }

    pub fn poster_url(&self, size: ImageSize) -> Option<String> {
        self.poster_path
            .as_deref()
            .and_then(|p| links::image_url(p, size))
    }

    pub fn backdrop_url(&self, size: ImageSize) -> Option<String> {
        self.backdrop_path
            .as_deref()
            .and_then(|p| links::image_url(p, size))
    }
}

/// One page of a movie list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MovieCollection {
    pub page: u32,
    pub results: Vec<Movie>,
    pub total_results: u32,
    pub total_pages: u32,
}

impl MovieCollection {
    /// Wraps a complete, unpaginated result set as a single page.
    pub fn single_page(page: u32, results: Vec<Movie>) -> Self {
        let total_results = results.len() as u32;
        Self {
            page,
            results,
            total_results,
            total_pages: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: String,
    pub author: String,
    pub content: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewCollection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub page: u32,
    pub results: Vec<Review>,
    pub total_results: u32,
    pub total_pages: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub id: String,
    pub iso_639_1: String,
    pub iso_3166_1: String,
    /// Provider-side identifier, e.g. a YouTube video id.
    pub key: String,
    pub name: String,
    pub site: String,
    pub size: u32,
    #[serde(rename = "type")]
    pub video_type: String,
}

impl Video {
    pub fn is_youtube(&self) -> bool {
        self.site.eq_ignore_ascii_case("YouTube")
    }

    pub fn watch_url(&self) -> Option<String> {
        self.is_youtube().then(|| links::youtube_watch_url(&self.key))
    }

    pub fn thumbnail_url(&self) -> Option<String> {
        self.is_youtube()
            .then(|| links::youtube_thumbnail_url(&self.key))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrailersCollection {
    pub id: i64,
    pub results: Vec<Video>,
}

impl TrailersCollection {
    pub fn youtube_trailers(&self) -> impl Iterator<Item = &Video> {
        self.results.iter().filter(|v| v.is_youtube())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genre {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionCompany {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionCountry {
    pub iso_3166_1: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpokenLanguage {
    pub iso_639_1: String,
    pub name: String,
}
