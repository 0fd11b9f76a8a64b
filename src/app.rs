use crate::config::Config;
use crate::error::DataError;
use crate::favorites::SqliteFavorites;
use crate::models::Movie;
use crate::repository::{page_or_default, MovieRepository, SortMode};
use crate::tmdb::TmdbClient;
use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<MovieRepository>,
}

pub async fn run_server(config: Config) -> Result<()> {
    let tmdb = TmdbClient::from_config(&config).context("Failed to build TMDB HTTP client")?;
    let favorites = SqliteFavorites::connect(&config.database_url)
        .await
        .with_context(|| format!("Failed to open favorites database {}", config.database_url))?;
    let repository = MovieRepository::new(Arc::new(tmdb), Arc::new(favorites))
        .with_default_language(config.default_language.clone());

    let state = AppState {
        repository: Arc::new(repository),
    };
    let app = build_router(state);

    info!("Listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/movies", get(list_movies))
        .route("/movies/:id", get(movie_detail))
        .route("/movies/:id/reviews", get(movie_reviews))
        .route("/movies/:id/videos", get(movie_videos))
        .route("/favorites", get(list_favorites))
        .route(
            "/favorites/:id",
            get(favorite_status).put(add_favorite).delete(remove_favorite),
        )
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    sort: Option<String>,
    page: Option<u32>,
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LanguageQuery {
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    page: Option<u32>,
}

async fn list_movies(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Response {
    let sort_mode = match query.sort.as_deref().map(str::parse::<SortMode>) {
        None => SortMode::default(),
        Some(Ok(mode)) => mode,
        Some(Err(e)) => return bad_request(&e.to_string()),
    };
    match state
        .repository
        .get_movies(sort_mode, query.page, query.language.as_deref())
        .await
    {
        Ok(collection) => Json(collection).into_response(),
        Err(e) => error_response(e),
    }
}

async fn movie_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<LanguageQuery>,
) -> Response {
    match state
        .repository
        .get_movie_detail(id, query.language.as_deref())
        .await
    {
        Ok(movie) => Json(movie).into_response(),
        Err(e) => error_response(e),
    }
}

async fn movie_reviews(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.repository.get_reviews(id).await {
        Ok(reviews) => Json(reviews).into_response(),
        Err(e) => error_response(e),
    }
}

async fn movie_videos(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.repository.get_trailers(id).await {
        Ok(trailers) => Json(trailers).into_response(),
        Err(e) => error_response(e),
    }
}

async fn list_favorites(State(state): State<AppState>, Query(query): Query<PageQuery>) -> Response {
    match state
        .repository
        .list_favorites(page_or_default(query.page))
        .await
    {
        Ok(collection) => Json(collection).into_response(),
        Err(e) => error_response(e),
    }
}

async fn favorite_status(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.repository.is_favorite(id).await {
        Ok(favourite) => Json(json!({ "id": id, "favourite": favourite })).into_response(),
        Err(e) => error_response(e),
    }
}

async fn add_favorite(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Result<Json<Movie>, JsonRejection>,
) -> Response {
    let movie = match body {
        Ok(Json(movie)) => movie,
        Err(rejection) => {
            warn!("Rejecting favorite body: {}", rejection.body_text());
            return bad_request(&rejection.body_text());
        }
    };
    if movie.id != id {
        return bad_request(&format!(
            "movie id {} does not match path id {}",
            movie.id, id
        ));
    }
    match state.repository.add_favorite(&movie).await {
        Ok(()) => Json(json!({ "id": id, "favourite": true })).into_response(),
        Err(e) => error_response(e),
    }
}

async fn remove_favorite(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.repository.remove_favorite(id).await {
        Ok(()) => Json(json!({ "id": id, "favourite": false })).into_response(),
        Err(e) => error_response(e),
    }
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message, "retryable": false })),
    )
        .into_response()
}

fn error_response(err: DataError) -> Response {
    let status = match &err {
        DataError::Api { status, .. } => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        DataError::Network(_) => StatusCode::SERVICE_UNAVAILABLE,
        DataError::Parse { .. } => StatusCode::BAD_GATEWAY,
        DataError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("Request failed: {}", err);
    } else {
        warn!("Request failed: {}", err);
    }
    (
        status,
        Json(json!({ "error": err.to_string(), "retryable": err.is_retryable() })),
    )
        .into_response()
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}
