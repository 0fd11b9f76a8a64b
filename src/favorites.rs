use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use sqlx::query::Query;
use sqlx::sqlite::{
    Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions,
};
use std::collections::HashSet;
use std::str::FromStr;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

use crate::error::Result;
use crate::models::{Movie, MovieCollection};

const CHANGE_CHANNEL_CAPACITY: usize = 64;
const MAX_FILE_CONNECTIONS: u32 = 4;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS movies (
    _id INTEGER PRIMARY KEY,
    original_title TEXT,
    original_language TEXT,
    overview TEXT,
    release_date TEXT,
    poster_path TEXT,
    popularity REAL,
    title TEXT,
    vote_average REAL,
    vote_count INTEGER,
    backdrop_path TEXT,
    added_at TEXT NOT NULL
)";

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

const SELECT_COLUMNS: &str = "SELECT _id, original_title, original_language, overview, \
    release_date, poster_path, popularity, title, vote_average, vote_count, backdrop_path \
    FROM movies";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Updated,
    Removed,
}

/// Published whenever the favorites table structurally changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FavoritesChanged {
    pub movie_id: i64,
    pub kind: ChangeKind,
}

/// Durable set of favorited movies keyed by movie id.
#[async_trait]
pub trait FavoritesStore: Send + Sync {
    /// Every stored favorite as one page (`total_pages == 1`). The page number
    /// is echoed back, the store does not paginate.
    async fn list_favorites(&self, page: u32) -> Result<MovieCollection>;
    /// Upsert: adding an id that is already stored refreshes its fields.
    async fn add_favorite(&self, movie: &Movie) -> Result<()>;
    /// Refreshes the stored fields of an existing favorite from `movie`.
    /// Fields `movie` leaves unset keep their stored value. Returns true only
    /// when a stored value changed; unknown ids are never inserted.
    async fn update_favorite(&self, movie: &Movie) -> Result<bool>;
    /// Removing an id that is not stored is a no-op.
    async fn remove_favorite(&self, movie_id: i64) -> Result<()>;
    /// Adds `movie` when absent, removes it when present, and returns the new
    /// state. The check and the write happen as one step.
    async fn toggle_favorite(&self, movie: &Movie) -> Result<bool>;
    async fn is_favorite(&self, movie_id: i64) -> Result<bool>;
    async fn favorite_ids(&self) -> Result<HashSet<i64>>;
    fn subscribe(&self) -> broadcast::Receiver<FavoritesChanged>;
}

pub struct SqliteFavorites {
    pool: SqlitePool,
    write_lock: Mutex<()>,
    changes: broadcast::Sender<FavoritesChanged>,
}

#[derive(Debug, sqlx::FromRow)]
struct FavoriteRow {
    #[sqlx(rename = "_id")]
    id: i64,
    original_title: Option<String>,
    original_language: Option<String>,
    overview: Option<String>,
    release_date: Option<String>,
    poster_path: Option<String>,
    popularity: Option<f64>,
    title: Option<String>,
    vote_average: Option<f64>,
    vote_count: Option<i64>,
    backdrop_path: Option<String>,
}

impl FavoriteRow {
    /// The subset of `movie` the table keeps.
    fn from_movie(movie: &Movie) -> Self {
        Self {
            id: movie.id,
            original_title: movie.original_title.clone(),
            original_language: movie.original_language.clone(),
            overview: movie.overview.clone(),
            release_date: movie.release_date.clone(),
            poster_path: movie.poster_path.clone(),
            popularity: movie.popularity,
            title: movie.title.clone(),
            vote_average: movie.vote_average,
            vote_count: movie.vote_count,
            backdrop_path: movie.backdrop_path.clone(),
        }
    }

    /// Binds every stored column except `_id`, in table order.
    fn bind_columns<'q>(&'q self, query: SqliteQuery<'q>) -> SqliteQuery<'q> {
        query
            .bind(&self.original_title)
            .bind(&self.original_language)
            .bind(&self.overview)
            .bind(&self.release_date)
            .bind(&self.poster_path)
            .bind(self.popularity)
            .bind(&self.title)
            .bind(self.vote_average)
            .bind(self.vote_count)
            .bind(&self.backdrop_path)
    }

    fn into_movie(self) -> Movie {
        Movie {
            id: self.id,
            title: self.title,
            original_title: self.original_title,
            original_language: self.original_language,
            overview: self.overview,
            release_date: self.release_date,
            poster_path: self.poster_path,
            backdrop_path: self.backdrop_path,
            popularity: self.popularity,
            vote_average: self.vote_average,
            vote_count: self.vote_count,
            favourite: Some(true),
            ..Movie::default()
        }
    }
}

impl SqliteFavorites {
    /// Opens (creating if needed) the database at `database_url`, e.g.
    /// `sqlite://popular_movies.db` or `sqlite::memory:`.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // An in-memory database lives and dies with its single connection.
        let pool = if is_in_memory(database_url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(MAX_FILE_CONNECTIONS)
                .connect_with(options)
                .await?
        };
        info!("Opened favorites database at {}", database_url);
        Self::with_pool(pool).await
    }

    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:").await
    }

    pub async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            pool,
            write_lock: Mutex::new(()),
            changes,
        })
    }

    fn notify(&self, movie_id: i64, kind: ChangeKind) {
        debug!(movie_id, ?kind, "favorites changed");
        // No subscribers is fine.
        let _ = self.changes.send(FavoritesChanged { movie_id, kind });
    }

    async fn exists(&self, movie_id: i64) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM movies WHERE _id = ?")
            .bind(movie_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    // Callers of the `*_locked` helpers must hold `write_lock`.

    async fn upsert_locked(&self, movie: &Movie, existed: bool) -> Result<()> {
        let row = FavoriteRow::from_movie(movie);
        let added_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let query = sqlx::query(
            "INSERT INTO movies (_id, original_title, original_language, overview, release_date, \
             poster_path, popularity, title, vote_average, vote_count, backdrop_path, added_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(_id) DO UPDATE SET \
             original_title = excluded.original_title, \
             original_language = excluded.original_language, \
             overview = excluded.overview, \
             release_date = excluded.release_date, \
             poster_path = excluded.poster_path, \
             popularity = excluded.popularity, \
             title = excluded.title, \
             vote_average = excluded.vote_average, \
             vote_count = excluded.vote_count, \
             backdrop_path = excluded.backdrop_path",
        )
        .bind(row.id);
        row.bind_columns(query)
            .bind(added_at)
            .execute(&self.pool)
            .await?;

        let kind = if existed {
            ChangeKind::Updated
        } else {
            ChangeKind::Added
        };
        info!(movie_id = movie.id, "Stored favorite '{}'", display_title(movie));
        self.notify(movie.id, kind);
        Ok(())
    }

    async fn delete_locked(&self, movie_id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM movies WHERE _id = ?")
            .bind(movie_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() > 0 {
            info!(movie_id, "Removed favorite");
            self.notify(movie_id, ChangeKind::Removed);
        }
        Ok(())
    }
}

#[async_trait]
impl FavoritesStore for SqliteFavorites {
    async fn list_favorites(&self, page: u32) -> Result<MovieCollection> {
        let rows: Vec<FavoriteRow> =
            sqlx::query_as(&format!("{SELECT_COLUMNS} ORDER BY added_at, _id"))
                .fetch_all(&self.pool)
                .await?;
        let movies = rows.into_iter().map(FavoriteRow::into_movie).collect();
        Ok(MovieCollection::single_page(page, movies))
    }

    async fn add_favorite(&self, movie: &Movie) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let existed = self.exists(movie.id).await?;
        self.upsert_locked(movie, existed).await
    }

    async fn update_favorite(&self, movie: &Movie) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let row = FavoriteRow::from_movie(movie);
        let query = row.bind_columns(sqlx::query(
            "UPDATE movies SET \
             original_title = COALESCE(?, original_title), \
             original_language = COALESCE(?, original_language), \
             overview = COALESCE(?, overview), \
             release_date = COALESCE(?, release_date), \
             poster_path = COALESCE(?, poster_path), \
             popularity = COALESCE(?, popularity), \
             title = COALESCE(?, title), \
             vote_average = COALESCE(?, vote_average), \
             vote_count = COALESCE(?, vote_count), \
             backdrop_path = COALESCE(?, backdrop_path) \
             WHERE _id = ? AND NOT ( \
             original_title IS COALESCE(?, original_title) AND \
             original_language IS COALESCE(?, original_language) AND \
             overview IS COALESCE(?, overview) AND \
             release_date IS COALESCE(?, release_date) AND \
             poster_path IS COALESCE(?, poster_path) AND \
             popularity IS COALESCE(?, popularity) AND \
             title IS COALESCE(?, title) AND \
             vote_average IS COALESCE(?, vote_average) AND \
             vote_count IS COALESCE(?, vote_count) AND \
             backdrop_path IS COALESCE(?, backdrop_path))",
        ));
        let result = row.bind_columns(query.bind(row.id)).execute(&self.pool).await?;

        let updated = result.rows_affected() > 0;
        if updated {
            debug!(movie_id = movie.id, "Refreshed favorite '{}'", display_title(movie));
            self.notify(movie.id, ChangeKind::Updated);
        }
        Ok(updated)
    }

    async fn remove_favorite(&self, movie_id: i64) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.delete_locked(movie_id).await
    }

    async fn toggle_favorite(&self, movie: &Movie) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        if self.exists(movie.id).await? {
            self.delete_locked(movie.id).await?;
            Ok(false)
        } else {
            self.upsert_locked(movie, false).await?;
            Ok(true)
        }
    }

    async fn is_favorite(&self, movie_id: i64) -> Result<bool> {
        self.exists(movie_id).await
    }

    async fn favorite_ids(&self) -> Result<HashSet<i64>> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT _id FROM movies")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<FavoritesChanged> {
        self.changes.subscribe()
    }
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

fn display_title(movie: &Movie) -> &str {
    movie
        .title
        .as_deref()
        .or(movie.original_title.as_deref())
        .unwrap_or("untitled")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movie(id: i64, title: &str) -> Movie {
        Movie {
            id,
            title: Some(title.to_string()),
            original_title: Some(title.to_string()),
            original_language: Some("en".to_string()),
            overview: Some(format!("{title} overview")),
            release_date: Some("2017-03-18".to_string()),
            poster_path: Some(format!("/{id}.jpg")),
            popularity: Some(12.5),
            vote_average: Some(7.25),
            vote_count: Some(1200),
            tagline: Some("not stored".to_string()),
            ..Movie::default()
        }
    }

    #[tokio::test]
    async fn add_then_remove_flips_membership() {
        let store = SqliteFavorites::in_memory().await.unwrap();
        let m = movie(100, "A");
        assert!(!store.is_favorite(m.id).await.unwrap());
        store.add_favorite(&m).await.unwrap();
        assert!(store.is_favorite(m.id).await.unwrap());
        store.remove_favorite(m.id).await.unwrap();
        assert!(!store.is_favorite(m.id).await.unwrap());
    }

    #[tokio::test]
    async fn adding_twice_keeps_a_single_row() {
        let store = SqliteFavorites::in_memory().await.unwrap();
        store.add_favorite(&movie(1, "First")).await.unwrap();
        store.add_favorite(&movie(1, "First, renamed")).await.unwrap();

        let list = store.list_favorites(1).await.unwrap();
        assert_eq!(list.results.len(), 1);
        assert_eq!(list.total_results, 1);
        assert_eq!(list.results[0].title.as_deref(), Some("First, renamed"));
    }

    #[tokio::test]
    async fn list_returns_stored_projection_in_insertion_order() {
        let store = SqliteFavorites::in_memory().await.unwrap();
        store.add_favorite(&movie(30, "C")).await.unwrap();
        store.add_favorite(&movie(10, "A")).await.unwrap();
        store.add_favorite(&movie(20, "B")).await.unwrap();

        let list = store.list_favorites(4).await.unwrap();
        assert_eq!(list.page, 4);
        assert_eq!(list.total_pages, 1);
        let ids: Vec<i64> = list.results.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![30, 10, 20]);

        let stored = &list.results[1];
        assert_eq!(stored.favourite, Some(true));
        assert_eq!(stored.tagline, None);
        assert_eq!(stored.vote_average, Some(7.25));
        assert_eq!(stored.vote_count, Some(1200));
        assert_eq!(stored.backdrop_path, None);
    }

    #[tokio::test]
    async fn removing_unknown_id_is_a_silent_no_op() {
        let store = SqliteFavorites::in_memory().await.unwrap();
        let mut events = store.subscribe();
        store.remove_favorite(404).await.unwrap();
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn update_only_touches_existing_rows() {
        let store = SqliteFavorites::in_memory().await.unwrap();
        assert!(!store.update_favorite(&movie(5, "Missing")).await.unwrap());
        assert!(!store.is_favorite(5).await.unwrap());

        store.add_favorite(&movie(5, "Old")).await.unwrap();
        assert!(store.update_favorite(&movie(5, "New")).await.unwrap());
        let list = store.list_favorites(1).await.unwrap();
        assert_eq!(list.results[0].title.as_deref(), Some("New"));
    }

    #[tokio::test]
    async fn update_keeps_stored_values_for_unset_fields() {
        let store = SqliteFavorites::in_memory().await.unwrap();
        store.add_favorite(&movie(8, "Eight")).await.unwrap();
        let mut events = store.subscribe();

        assert!(!store.update_favorite(&movie(8, "Eight")).await.unwrap());
        let sparse = Movie {
            id: 8,
            vote_count: Some(1300),
            ..Movie::default()
        };
        assert!(store.update_favorite(&sparse).await.unwrap());
        assert!(!store.update_favorite(&sparse).await.unwrap());

        let stored = &store.list_favorites(1).await.unwrap().results[0];
        assert_eq!(stored.title.as_deref(), Some("Eight"));
        assert_eq!(stored.poster_path.as_deref(), Some("/8.jpg"));
        assert_eq!(stored.vote_count, Some(1300));

        assert_eq!(events.try_recv().unwrap().kind, ChangeKind::Updated);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn toggle_flips_and_reports_the_new_state() {
        let store = SqliteFavorites::in_memory().await.unwrap();
        let m = movie(12, "Twelve");
        assert!(store.toggle_favorite(&m).await.unwrap());
        assert!(store.is_favorite(12).await.unwrap());
        assert!(!store.toggle_favorite(&m).await.unwrap());
        assert!(!store.is_favorite(12).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_toggles_cancel_out() {
        let store = std::sync::Arc::new(SqliteFavorites::in_memory().await.unwrap());
        let m = movie(21, "Pair");

        let (a, b) = tokio::join!(store.toggle_favorite(&m), store.toggle_favorite(&m));
        let mut states = vec![a.unwrap(), b.unwrap()];
        states.sort();
        assert_eq!(states, vec![false, true]);
        assert!(!store.is_favorite(21).await.unwrap());
    }

    #[tokio::test]
    async fn structural_changes_are_published() {
        let store = SqliteFavorites::in_memory().await.unwrap();
        let mut events = store.subscribe();

        store.add_favorite(&movie(7, "Seven")).await.unwrap();
        store.add_favorite(&movie(7, "Seven")).await.unwrap();
        store.remove_favorite(7).await.unwrap();

        let kinds: Vec<ChangeKind> = (0..3).map(|_| events.try_recv().unwrap().kind).collect();
        assert_eq!(
            kinds,
            vec![ChangeKind::Added, ChangeKind::Updated, ChangeKind::Removed]
        );
    }

    #[tokio::test]
    async fn favorite_ids_match_the_stored_set() {
        let store = SqliteFavorites::in_memory().await.unwrap();
        for id in [1, 2, 3] {
            store.add_favorite(&movie(id, "x")).await.unwrap();
        }
        store.remove_favorite(2).await.unwrap();
        assert_eq!(store.favorite_ids().await.unwrap(), HashSet::from([1, 3]));
    }
}
