#![allow(dead_code)]

use popular_movies::error::{DataError, Result};
use popular_movies::models::{
    Movie, MovieCollection, Review, ReviewCollection, TrailersCollection, Video,
};
use popular_movies::tmdb::TmdbApi;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// In-process stand-in for the TMDB catalog.
#[derive(Default)]
pub struct FakeTmdb {
    pub popular: MovieCollection,
    pub top_rated: MovieCollection,
    pub details: Vec<Movie>,
    /// When set, every catalog call fails with this HTTP status.
    pub fail_status: Option<u16>,
    /// When set, popular-movie calls park until notified.
    pub popular_gate: Option<Arc<Notify>>,
    pub calls: AtomicUsize,
    pub languages: Mutex<Vec<Option<String>>>,
}

impl FakeTmdb {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self, language: Option<&str>) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.languages
            .lock()
            .unwrap()
            .push(language.map(str::to_string));
        match self.fail_status {
            Some(status) => Err(DataError::Api {
                status,
                message: "Invalid API key: You must be granted a valid key.".to_string(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl TmdbApi for FakeTmdb {
    async fn get_popular_movies(
        &self,
        page: Option<u32>,
        language: Option<&str>,
    ) -> Result<MovieCollection> {
        self.record(language)?;
        if let Some(gate) = &self.popular_gate {
            gate.notified().await;
        }
        let mut collection = self.popular.clone();
        collection.page = page.unwrap_or(collection.page);
        Ok(collection)
    }

    async fn get_top_rated_movies(
        &self,
        page: Option<u32>,
        language: Option<&str>,
    ) -> Result<MovieCollection> {
        self.record(language)?;
        let mut collection = self.top_rated.clone();
        collection.page = page.unwrap_or(collection.page);
        Ok(collection)
    }

    async fn get_movie_detail(&self, movie_id: i64, language: Option<&str>) -> Result<Movie> {
        self.record(language)?;
        self.details
            .iter()
            .find(|m| m.id == movie_id)
            .cloned()
            .ok_or_else(|| DataError::Api {
                status: 404,
                message: "The resource you requested could not be found.".to_string(),
            })
    }

    async fn get_movie_reviews(&self, movie_id: i64) -> Result<ReviewCollection> {
        self.record(None)?;
        Ok(ReviewCollection {
            id: Some(movie_id),
            page: 1,
            results: vec![Review {
                id: "58aa82f09251416f92006a3a".to_string(),
                author: "Salma".to_string(),
                content: "Loved it.".to_string(),
                url: "https://www.themoviedb.org/review/58aa82f09251416f92006a3a".to_string(),
            }],
            total_results: 1,
            total_pages: 1,
        })
    }

    async fn get_movie_trailers(&self, movie_id: i64) -> Result<TrailersCollection> {
        self.record(None)?;
        Ok(TrailersCollection {
            id: movie_id,
            results: vec![Video {
                id: "58c9f0a19251415bd0002d35".to_string(),
                iso_639_1: "en".to_string(),
                iso_3166_1: "US".to_string(),
                key: "d96cjJhvlMA".to_string(),
                name: "Official Trailer".to_string(),
                site: "YouTube".to_string(),
                size: 1080,
                video_type: "Trailer".to_string(),
            }],
        })
    }
}

pub fn movie(id: i64, title: &str) -> Movie {
    Movie {
        id,
        title: Some(title.to_string()),
        original_title: Some(title.to_string()),
        original_language: Some("en".to_string()),
        overview: Some(format!("About {title}")),
        release_date: Some("2017-03-18".to_string()),
        poster_path: Some(format!("/poster{id}.jpg")),
        backdrop_path: Some(format!("/backdrop{id}.jpg")),
        popularity: Some(98.5),
        vote_average: Some(7.5),
        vote_count: Some(4200),
        genre_ids: Some(vec![28, 12]),
        ..Movie::default()
    }
}

pub fn collection(page: u32, total_pages: u32, results: Vec<Movie>) -> MovieCollection {
    MovieCollection {
        page,
        total_results: results.len() as u32,
        total_pages,
        results,
    }
}
