//! Movie catalog endpoints.
//!
//! # Endpoints
//!
//! - `GET    /v1/movies` - List with filtering, sorting and pagination (`movies:read`)
//! - `POST   /v1/movies` - Create (`movies:write`)
//! - `GET    /v1/movies/{id}` - Show one (`movies:read`)
//! - `PATCH  /v1/movies/{id}` - Partial update with optimistic locking (`movies:write`)
//! - `DELETE /v1/movies/{id}` - Delete (`movies:write`)
//!
//! All of them sit behind an authenticate, require-activated and
//! require-permission pipeline, so a handler only runs for an allowed caller.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::header::LOCATION;
use axum::http::{HeaderMap, HeaderName, StatusCode};
use tracing::{info, instrument};

use super::extract::{JsonBody, QueryParams, movie_id};
use crate::error::{AppError, AppResult};
use crate::models::movie::MOVIE_SORT_SAFELIST;
use crate::models::{
    CreateMovieRequest, Envelope, Filters, Metadata, Movie, MovieFilter, MovieQuery, Page,
    UpdateMovieRequest,
};
use crate::state::AppState;
use crate::validation::Validator;

/// Header a client sends on PATCH to refuse the update unless the stored
/// movie is still at that version.
pub const EXPECTED_VERSION_HEADER: &str = "x-expected-version";

/// List movies.
///
/// # Query Parameters
///
/// - `title`: every word must match a whole title word, ignoring case
/// - `genres`: comma separated; a movie must carry every one
/// - `page` (default 1), `page_size` (default 20)
/// - `sort`: `id`, `title`, `year`, `runtime`, optionally prefixed with `-`
#[instrument(skip(state, qs))]
pub async fn list_movies(
    State(state): State<AppState>,
    qs: QueryParams,
) -> AppResult<Json<Page<Movie>>> {
    let mut v = Validator::new();
    let filter = MovieFilter {
        title: qs.string("title", ""),
        genres: qs.csv("genres", &[]),
    };
    let filters = Filters::new(
        qs.int("page", 1, &mut v),
        qs.int("page_size", 20, &mut v),
        qs.string("sort", "id"),
        MOVIE_SORT_SAFELIST,
    );
    filters.validate(&mut v);
    v.finish()?;

    let query = MovieQuery {
        filter,
        filters: filters.clone(),
    };
    let (movies, total) = state
        .models
        .timed("movies.list", state.models.movies.list(&query))
        .await?;

    Ok(Json(Page {
        metadata: Metadata::calculate(total, filters.page, filters.page_size),
        result: movies,
    }))
}

#[instrument(skip(state, payload))]
pub async fn create_movie(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<CreateMovieRequest>,
) -> AppResult<(StatusCode, [(HeaderName, String); 1], Json<Envelope<Movie>>)> {
    let mut movie = Movie::from_request(payload);

    let mut v = Validator::new();
    movie.validate(&mut v);
    v.finish()?;

    state
        .models
        .timed("movies.insert", state.models.movies.insert(&mut movie))
        .await?;

    info!(movie_id = movie.id, title = %movie.title, "Movie created");
    Ok((
        StatusCode::CREATED,
        [(LOCATION, format!("/v1/movies/{}", movie.id))],
        Json(Envelope::new(movie)),
    ))
}

#[instrument(skip(state))]
pub async fn show_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Envelope<Movie>>> {
    let id = movie_id(&id)?;
    let movie = state
        .models
        .timed("movies.get", state.models.movies.get(id))
        .await?;
    Ok(Json(Envelope::new(movie)))
}

/// Partial update. Only the fields present in the body change.
///
/// A concurrent update between the read and the write answers 409, as does an
/// `X-Expected-Version` header naming a version other than the stored one.
#[instrument(skip(state, headers, payload))]
pub async fn update_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    JsonBody(payload): JsonBody<UpdateMovieRequest>,
) -> AppResult<Json<Envelope<Movie>>> {
    let id = movie_id(&id)?;
    let mut movie = state
        .models
        .timed("movies.get", state.models.movies.get(id))
        .await?;

    if let Some(expected) = headers.get(EXPECTED_VERSION_HEADER) {
        let current = movie.version.to_string();
        if expected.as_bytes() != current.as_bytes() {
            return Err(AppError::EditConflict);
        }
    }

    movie.apply(payload);

    let mut v = Validator::new();
    movie.validate(&mut v);
    v.finish()?;

    state
        .models
        .timed("movies.update", state.models.movies.update(&mut movie))
        .await?;

    info!(movie_id = movie.id, version = movie.version, "Movie updated");
    Ok(Json(Envelope::new(movie)))
}

#[instrument(skip(state))]
pub async fn delete_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Envelope<&'static str>>> {
    let id = movie_id(&id)?;
    state
        .models
        .timed("movies.delete", state.models.movies.delete(id))
        .await?;

    info!(movie_id = id, "Movie deleted");
    Ok(Json(Envelope::new("movie deleted successfully")))
}
