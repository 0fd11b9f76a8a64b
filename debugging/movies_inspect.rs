//! Call one movie catalog endpoint through the repository and print the JSON.
//! Usage:
//!   cargo run --bin movies_inspect -- list <most_popular|top_rated|favorites> [page]
//!   cargo run --bin movies_inspect -- detail <tmdb_id>
//!   cargo run --bin movies_inspect -- reviews <tmdb_id>
//!   cargo run --bin movies_inspect -- videos <tmdb_id>
//! Requires TMDB_API_KEY in the environment (.env supported).

use anyhow::{Context, Result};
use dotenvy::dotenv;
use popular_movies::config::Config;
use popular_movies::links::ImageSize;
use popular_movies::{MovieRepository, SortMode, SqliteFavorites, TmdbClient};
use serde::Serialize;
use std::env;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Command {
    List,
    Detail,
    Reviews,
    Videos,
}

impl FromStr for Command {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "list" => Ok(Command::List),
            "detail" => Ok(Command::Detail),
            "reviews" => Ok(Command::Reviews),
            "videos" => Ok(Command::Videos),
            _ => Err(anyhow::anyhow!(
                "command must be one of 'list', 'detail', 'reviews', 'videos'"
            )),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: cargo run --bin movies_inspect -- list <sort_mode> [page]");
        eprintln!("       cargo run --bin movies_inspect -- <detail|reviews|videos> <tmdb_id>");
        std::process::exit(1);
    }

    let command = Command::from_str(&args[1])?;
    let config = Config::from_env()?;
    let tmdb = TmdbClient::from_config(&config)?;
    let favorites = SqliteFavorites::connect(&config.database_url).await?;
    let repository = MovieRepository::new(Arc::new(tmdb), Arc::new(favorites))
        .with_default_language(config.default_language.clone());

    match command {
        Command::List => {
            let sort_mode = SortMode::from_str(&args[2])?;
            let page = args
                .get(3)
                .map(|p| p.parse::<u32>().context("page must be a positive integer"))
                .transpose()?;
            let movies = repository.get_movies(sort_mode, page, None).await?;
            for movie in &movies.results {
                eprintln!(
                    "{:>8}  {}  {}",
                    movie.id,
                    movie.title.as_deref().unwrap_or("?"),
                    movie.poster_url(ImageSize::W185).unwrap_or_default()
                );
            }
            print_json(&movies)?;
        }
        Command::Detail => {
            let movie = repository.get_movie_detail(parse_id(&args[2])?, None).await?;
            print_json(&movie)?;
        }
        Command::Reviews => {
            let reviews = repository.get_reviews(parse_id(&args[2])?).await?;
            print_json(&reviews)?;
        }
        Command::Videos => {
            let trailers = repository.get_trailers(parse_id(&args[2])?).await?;
            for video in trailers.youtube_trailers() {
                eprintln!("{}  {}", video.name, video.watch_url().unwrap_or_default());
            }
            print_json(&trailers)?;
        }
    }

    Ok(())
}

fn parse_id(raw: &str) -> Result<i64> {
    raw.parse().context("tmdb_id must be an integer")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
