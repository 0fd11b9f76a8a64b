use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::Result;
use crate::favorites::{FavoritesChanged, FavoritesStore};
use crate::models::{Movie, MovieCollection, ReviewCollection, TrailersCollection};
use crate::tmdb::TmdbApi;

pub const DEFAULT_PAGE: u32 = 1;

/// Pages are 1-indexed; a missing or zero page means the first one.
pub fn page_or_default(page: Option<u32>) -> u32 {
    page.filter(|p| *p > 0).unwrap_or(DEFAULT_PAGE)
}

/// Which list the movies screen shows, and so which source backs it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    #[default]
    MostPopular,
    TopRated,
    Favorites,
}

impl SortMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortMode::MostPopular => "most_popular",
            SortMode::TopRated => "top_rated",
            SortMode::Favorites => "favorites",
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortMode {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "most_popular" | "popular" => Ok(SortMode::MostPopular),
            "top_rated" => Ok(SortMode::TopRated),
            "favorites" | "favourites" => Ok(SortMode::Favorites),
            other => Err(anyhow::anyhow!(
                "unknown sort mode '{}' (expected most_popular, top_rated or favorites)",
                other
            )),
        }
    }
}

/// The one entry point the presentation layer talks to. Catalog lists and
/// details come back with `favourite` already resolved against the store.
/// Errors from either source are returned unchanged and never retried.
#[derive(Clone)]
pub struct MovieRepository {
    tmdb: Arc<dyn TmdbApi>,
    favorites: Arc<dyn FavoritesStore>,
    default_language: Option<String>,
}

impl MovieRepository {
    pub fn new(tmdb: Arc<dyn TmdbApi>, favorites: Arc<dyn FavoritesStore>) -> Self {
        Self {
            tmdb,
            favorites,
            default_language: None,
        }
    }

    pub fn with_default_language(mut self, language: Option<String>) -> Self {
        self.default_language = language;
        self
    }

    pub async fn get_movies(
        &self,
        sort_mode: SortMode,
        page: Option<u32>,
        language: Option<&str>,
    ) -> Result<MovieCollection> {
        let page = page_or_default(page);
        debug!(%sort_mode, page, "loading movies");
        match sort_mode {
            SortMode::MostPopular => self.get_popular_movies(Some(page), language).await,
            SortMode::TopRated => self.get_top_rated_movies(Some(page), language).await,
            SortMode::Favorites => self.list_favorites(page).await,
        }
    }

    pub async fn get_popular_movies(
        &self,
        page: Option<u32>,
        language: Option<&str>,
    ) -> Result<MovieCollection> {
        let page = page.map(|p| p.max(DEFAULT_PAGE));
        let collection = self
            .tmdb
            .get_popular_movies(page, self.language(language))
            .await?;
        self.mark_favourites(collection).await
    }

    pub async fn get_top_rated_movies(
        &self,
        page: Option<u32>,
        language: Option<&str>,
    ) -> Result<MovieCollection> {
        let page = page.map(|p| p.max(DEFAULT_PAGE));
        let collection = self
            .tmdb
            .get_top_rated_movies(page, self.language(language))
            .await?;
        self.mark_favourites(collection).await
    }

    pub async fn get_movie_detail(&self, movie_id: i64, language: Option<&str>) -> Result<Movie> {
        let movie = self
            .tmdb
            .get_movie_detail(movie_id, self.language(language))
            .await?;
        let favourite = self.favorites.is_favorite(movie.id).await?;
        if favourite {
            // Keeps the stored list fields in step with the catalog.
            self.favorites.update_favorite(&movie).await?;
        }
        Ok(movie.with_favourite(favourite))
    }

    pub async fn get_reviews(&self, movie_id: i64) -> Result<ReviewCollection> {
        self.tmdb.get_movie_reviews(movie_id).await
    }

    pub async fn get_trailers(&self, movie_id: i64) -> Result<TrailersCollection> {
        self.tmdb.get_movie_trailers(movie_id).await
    }

    pub async fn list_favorites(&self, page: u32) -> Result<MovieCollection> {
        self.favorites.list_favorites(page.max(DEFAULT_PAGE)).await
    }

    pub async fn add_favorite(&self, movie: &Movie) -> Result<()> {
        self.favorites.add_favorite(movie).await
    }

    pub async fn remove_favorite(&self, movie_id: i64) -> Result<()> {
        self.favorites.remove_favorite(movie_id).await
    }

    pub async fn is_favorite(&self, movie_id: i64) -> Result<bool> {
        self.favorites.is_favorite(movie_id).await
    }

    /// Flips the stored state and returns the new one. The returned value is
    /// only produced once the store write went through.
    pub async fn toggle_favorite(&self, movie: &Movie) -> Result<bool> {
        let favourite = self.favorites.toggle_favorite(movie).await?;
        info!(movie_id = movie.id, favourite, "favorite toggled");
        Ok(favourite)
    }

    pub fn subscribe_favorites(&self) -> broadcast::Receiver<FavoritesChanged> {
        self.favorites.subscribe()
    }

    fn language<'a>(&'a self, requested: Option<&'a str>) -> Option<&'a str> {
        requested.or(self.default_language.as_deref())
    }

    async fn mark_favourites(&self, mut collection: MovieCollection) -> Result<MovieCollection> {
        let ids = self.favorites.favorite_ids().await?;
        for movie in &mut collection.results {
            movie.favourite = Some(ids.contains(&movie.id));
        }
        Ok(collection)
    }
}
