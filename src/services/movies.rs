use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};
use validator::Validate;

use super::scheduler;
use crate::error::{BookingError, BookingResult, ConflictReason};
use crate::models::{movie::image_base64, Movie, NewMovie};
use crate::store::{CinemaStore, MovieGuard, StoreError};

const MOVIE_TITLE_INDEX: &str = "movies_active_title_key";

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct MovieRequest {
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[validate(range(min = 1895))]
    pub year: i32,
    #[validate(length(max = 255))]
    pub director: String,
    #[serde(default)]
    pub synopsis: String,
    #[validate(range(min = 1))]
    pub length: i32,
    #[serde(default, with = "image_base64")]
    pub image: Vec<u8>,
}

#[derive(Clone)]
pub struct MovieService {
    store: Arc<dyn CinemaStore>,
}

impl MovieService {
    pub fn new(store: Arc<dyn CinemaStore>) -> Self {
        Self { store }
    }

    /// Newest first, optionally capped at `count`.
    pub async fn list_latest(&self, count: Option<i64>) -> BookingResult<Vec<Movie>> {
        self.store
            .list_movies(count.map(|c| c.max(0)))
            .await
            .map_err(BookingError::from_store("Failed to list movies"))
    }

    pub async fn get(&self, id: i64) -> BookingResult<Movie> {
        self.store
            .find_movie(id)
            .await
            .map_err(BookingError::from_store("Failed to load movie"))?
            .ok_or(BookingError::NotFound("Movie"))
    }

    pub async fn create(&self, request: MovieRequest) -> BookingResult<Movie> {
        request.validate()?;
        self.ensure_title_free(&request.title, None).await?;

        let movie = self
            .store
            .insert_movie(NewMovie {
                title: request.title,
                year: request.year,
                director: request.director,
                synopsis: request.synopsis,
                length: request.length,
                image: request.image,
                created_at: Utc::now(),
            })
            .await
            .map_err(duplicate_or("Failed to create movie"))?;

        info!(movie_id = movie.id, title = %movie.title, "movie created");
        Ok(movie)
    }

    /// The length may only grow while the movie has no screenings. That check
    /// runs under the store's lock on the movie.
    pub async fn update(&self, id: i64, request: MovieRequest) -> BookingResult<Movie> {
        request.validate()?;
        let existing = self.get(id).await?;
        self.ensure_title_free(&request.title, Some(id)).await?;

        let new_length = request.length;
        let movie = Movie {
            title: request.title,
            year: request.year,
            director: request.director,
            synopsis: request.synopsis,
            length: request.length,
            image: request.image,
            ..existing
        };

        let guard: MovieGuard<'_> = &|current, screenings| {
            scheduler::check_length_change(current, new_length, screenings).map_err(BookingError::from)
        };
        let found = self
            .store
            .update_movie(&movie, guard)
            .await
            .map_err(duplicate_or("Failed to update movie"))
            .inspect_err(|e| debug!("update of movie {} rejected: {}", id, e))?;
        if !found {
            return Err(BookingError::NotFound("Movie"));
        }

        info!(movie_id = id, length = new_length, "movie updated");
        Ok(movie)
    }

    pub async fn delete(&self, id: i64) -> BookingResult<()> {
        let deleted = self
            .store
            .soft_delete_movie(id, Utc::now())
            .await
            .map_err(BookingError::from_store("Failed to delete movie"))?;
        if !deleted {
            return Err(BookingError::NotFound("Movie"));
        }
        info!(movie_id = id, "movie deleted");
        Ok(())
    }

    async fn ensure_title_free(&self, title: &str, exclude_id: Option<i64>) -> BookingResult<()> {
        let taken = self
            .store
            .movie_title_taken(title, exclude_id)
            .await
            .map_err(BookingError::from_store("Failed to check movie title"))?;
        if taken {
            return Err(ConflictReason::DuplicateName { entity: "Movie" }.into());
        }
        Ok(())
    }
}

fn duplicate_or(context: &'static str) -> impl FnOnce(StoreError) -> BookingError {
    move |e| {
        if e.is_unique_violation_of(MOVIE_TITLE_INDEX) {
            ConflictReason::DuplicateName { entity: "Movie" }.into()
        } else {
            BookingError::from_store(context)(e)
        }
    }
}
