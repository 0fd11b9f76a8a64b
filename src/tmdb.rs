use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{DataError, Result};
use crate::models::{Movie, MovieCollection, ReviewCollection, TrailersCollection};

/// The movie catalog endpoints the application reads from.
#[async_trait]
pub trait TmdbApi: Send + Sync {
    async fn get_popular_movies(
        &self,
        page: Option<u32>,
        language: Option<&str>,
    ) -> Result<MovieCollection>;
    async fn get_top_rated_movies(
        &self,
        page: Option<u32>,
        language: Option<&str>,
    ) -> Result<MovieCollection>;
    async fn get_movie_detail(&self, movie_id: i64, language: Option<&str>) -> Result<Movie>;
    async fn get_movie_reviews(&self, movie_id: i64) -> Result<ReviewCollection>;
    async fn get_movie_trailers(&self, movie_id: i64) -> Result<TrailersCollection>;
}

#[derive(Debug, Clone)]
pub struct TmdbClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl TmdbClient {
    pub fn from_config(config: &Config) -> Result<Self> {
        let user_agent = format!("popular-movies/{}", env!("CARGO_PKG_VERSION"));
        let client = Client::builder()
            .connect_timeout(config.request_timeout.min(std::time::Duration::from_secs(5)))
            .timeout(config.request_timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self::with_client(
            client,
            config.api_key.clone(),
            config.api_base_url.clone(),
        ))
    }

    pub fn with_client(client: Client, api_key: String, base_url: String) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, Option<String>)],
    ) -> Result<T> {
        if self.api_key.is_empty() {
            return Err(DataError::missing_api_key());
        }

        let mut query = String::new();
        for (name, value) in params {
            if let Some(value) = value {
                query.push_str(&format!("&{}={}", name, urlencoding::encode(value)));
            }
        }
        debug!("GET {}{}?api_key=<redacted>{}", self.base_url, path, query);
        let url = format!(
            "{}{}?api_key={}{}",
            self.base_url,
            path,
            urlencoding::encode(&self.api_key),
            query
        );

        let res = self.client.get(&url).send().await?;
        let status = res.status();
        if !status.is_success() {
            // The status alone decides the error; an unreadable body only loses the message.
            let text = res.text().await.unwrap_or_default();
            let message = match api_status_message(&text) {
                Some(message) => message,
                None if text.trim().is_empty() => status.to_string(),
                None => text,
            };
            warn!("TMDB {} answered {}: {}", path, status, message);
            return Err(DataError::Api {
                status: status.as_u16(),
                message,
            });
        }
        let text = res.text().await?;
        serde_json::from_str(&text).map_err(|source| DataError::Parse {
            endpoint: path.to_string(),
            source,
        })
    }
}

#[async_trait]
impl TmdbApi for TmdbClient {
    async fn get_popular_movies(
        &self,
        page: Option<u32>,
        language: Option<&str>,
    ) -> Result<MovieCollection> {
        self.get_json("/movie/popular", &list_params(page, language))
            .await
    }

    async fn get_top_rated_movies(
        &self,
        page: Option<u32>,
        language: Option<&str>,
    ) -> Result<MovieCollection> {
        self.get_json("/movie/top_rated", &list_params(page, language))
            .await
    }

    async fn get_movie_detail(&self, movie_id: i64, language: Option<&str>) -> Result<Movie> {
        let path = format!("/movie/{movie_id}");
        self.get_json(&path, &[("language", language.map(str::to_string))])
            .await
    }

    async fn get_movie_reviews(&self, movie_id: i64) -> Result<ReviewCollection> {
        let path = format!("/movie/{movie_id}/reviews");
        self.get_json(&path, &[]).await
    }

    async fn get_movie_trailers(&self, movie_id: i64) -> Result<TrailersCollection> {
        let path = format!("/movie/{movie_id}/videos");
        self.get_json(&path, &[]).await
    }
}

fn list_params(page: Option<u32>, language: Option<&str>) -> [(&'static str, Option<String>); 2] {
    [
        ("page", page.map(|p| p.to_string())),
        ("language", language.map(str::to_string)),
    ]
}

/// TMDB error bodies look like `{"status_code": 7, "status_message": "..."}`.
fn api_status_message(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        status_message: Option<String>,
    }
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.status_message)
}
