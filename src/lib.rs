pub mod app;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod favorites;
pub mod links;
pub mod models;
pub mod repository;
pub mod tmdb;

pub use error::{DataError, Result};
pub use favorites::{FavoritesStore, SqliteFavorites};
pub use models::{Movie, MovieCollection, Review, ReviewCollection, TrailersCollection, Video};
pub use repository::{MovieRepository, SortMode};
pub use tmdb::{TmdbApi, TmdbClient};
