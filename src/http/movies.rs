//! Movie handlers.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};

use crate::http::request::{expected_version, parse_id, read_csv, read_int, read_string, JsonBody};
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::models::filters::validate_filters;
use crate::models::movie::{select_movies, validate_movie, SORT_SAFELIST};
use crate::models::{Filters, Movie, MovieChanges, MovieQuery, NewMovie, Validator};
use crate::store::{retry_on_conflict, update_versioned, VersionedStore};

pub async fn list_movies(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let mut v = Validator::new();
    let query = MovieQuery {
        title: read_string(&params, "title", ""),
        genres: read_csv(&params, "genres"),
        filters: Filters {
            page: read_int(&params, "page", 1, &mut v),
            page_size: read_int(&params, "page_size", 20, &mut v),
            sort: read_string(&params, "sort", "id"),
            sort_safelist: SORT_SAFELIST,
        },
    };
    validate_filters(&mut v, &query.filters);
    v.into_result().map_err(ApiError::FailedValidation)?;

    let (movies, metadata) = select_movies(state.movies.list(), &query);
    Ok(Json(json!({ "movies": movies, "metadata": metadata })))
}

pub async fn create_movie(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<NewMovie>,
) -> Result<Response, ApiError> {
    validated(&input)?;
    let movie = state.movies.insert(input)?;
    tracing::info!(movie_id = movie.id, "movie created");

    let (id, title) = (movie.id, movie.title.clone());
    state.tasks.spawn("catalogue_notification", async move {
        tracing::info!(movie_id = id, %title, "catalogue change published");
        Ok::<_, String>(())
    });

    let location = format!("/v1/movies/{}", movie.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(json!({ "movie": movie })),
    )
        .into_response())
}

pub async fn show_movie(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&raw_id)?;
    let movie = state.movies.get(id).ok_or(ApiError::NotFound)?;
    Ok(Json(json!({ "movie": movie })))
}

/// PATCH: fields left out of the body keep their stored values.
pub async fn update_movie(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    headers: HeaderMap,
    JsonBody(changes): JsonBody<MovieChanges>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&raw_id)?;
    let expected = expected_version(&headers)?;
    let movie = write_movie(&state, id, expected, changes).await?;
    Ok(Json(json!({ "movie": movie })))
}

/// PUT: the body must describe the whole movie.
pub async fn replace_movie(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
    headers: HeaderMap,
    JsonBody(input): JsonBody<NewMovie>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&raw_id)?;
    let expected = expected_version(&headers)?;
    validated(&input)?;
    let movie = write_movie(&state, id, expected, MovieChanges::from(input)).await?;
    Ok(Json(json!({ "movie": movie })))
}

pub async fn delete_movie(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&raw_id)?;
    if !state.movies.delete(id) {
        return Err(ApiError::NotFound);
    }
    tracing::info!(movie_id = id, "movie deleted");
    Ok(Json(json!({ "message": "movie successfully deleted" })))
}

fn validated(input: &NewMovie) -> Result<(), ApiError> {
    let mut v = Validator::new();
    validate_movie(&mut v, input);
    v.into_result().map_err(ApiError::FailedValidation)
}

/// Apply `changes` through a conditional update.
///
/// With a pinned version the write happens once and a stale version is a
/// conflict for the client to resolve. Without one, conflicts are retried
/// against a fresh read.
async fn write_movie(
    state: &AppState,
    id: i64,
    expected: Option<i32>,
    changes: MovieChanges,
) -> Result<Movie, ApiError> {
    let store = state.movies.as_ref();
    match expected {
        Some(version) => {
            let current = store.get(id).ok_or(ApiError::NotFound)?;
            validated(&current.patched(&changes))?;
            Ok(update_versioned(store, id, version, changes)?)
        }
        None => {
            retry_on_conflict(store, id, state.conflict_retry, |current: &Movie| -> Result<MovieChanges, ApiError> {
                validated(&current.patched(&changes))?;
                Ok(changes.clone())
            })
            .await
        }
    }
}
