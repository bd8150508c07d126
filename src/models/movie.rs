//! Movie records.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::models::filters::{calculate_metadata, Filters, Metadata};
use crate::models::validator::{unique, Validator};
use crate::models::{current_year, now_unix};
use crate::store::Record;

pub const SORT_SAFELIST: &[&str] = &[
    "id", "title", "year", "runtime", "-id", "-title", "-year", "-runtime",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid runtime format")]
pub struct RuntimeFormatError;

/// Running time in minutes. On the wire it is the string `"<n> mins"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Runtime(pub i32);

impl Runtime {
    pub fn minutes(&self) -> i32 {
        self.0
    }

    fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mins", self.0)
    }
}

impl FromStr for Runtime {
    type Err = RuntimeFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(' ');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(minutes), Some("mins"), None) => minutes
                .parse::<i32>()
                .map(Runtime)
                .map_err(|_| RuntimeFormatError),
            _ => Err(RuntimeFormatError),
        }
    }
}

impl Serialize for Runtime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Runtime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Movie {
    pub id: i64,
    #[serde(skip)]
    pub created_at: i64,
    pub title: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub year: i32,
    #[serde(skip_serializing_if = "Runtime::is_zero")]
    pub runtime: Runtime,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub genres: Vec<String>,
    pub version: i32,
}

fn is_zero(value: &i32) -> bool {
    *value == 0
}

/// Body of a create or full-replace request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewMovie {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub year: i32,
    #[serde(default)]
    pub runtime: Runtime,
    /// `None` when the field was absent.
    #[serde(default)]
    pub genres: Option<Vec<String>>,
}

/// Body of a partial update. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MovieChanges {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub runtime: Option<Runtime>,
    pub genres: Option<Vec<String>>,
}

impl From<NewMovie> for MovieChanges {
    fn from(movie: NewMovie) -> Self {
        Self {
            title: Some(movie.title),
            year: Some(movie.year),
            runtime: Some(movie.runtime),
            genres: Some(movie.genres.unwrap_or_default()),
        }
    }
}

impl Movie {
    /// The movie as it would look after `changes`, in validatable form.
    pub fn patched(&self, changes: &MovieChanges) -> NewMovie {
        NewMovie {
            title: changes.title.clone().unwrap_or_else(|| self.title.clone()),
            year: changes.year.unwrap_or(self.year),
            runtime: changes.runtime.unwrap_or(self.runtime),
            genres: Some(changes.genres.clone().unwrap_or_else(|| self.genres.clone())),
        }
    }
}

impl Record for Movie {
    type New = NewMovie;
    type Changes = MovieChanges;

    fn id(&self) -> i64 {
        self.id
    }

    fn version(&self) -> i32 {
        self.version
    }

    fn set_version(&mut self, version: i32) {
        self.version = version;
    }

    fn create(id: i64, new: NewMovie) -> Self {
        Movie {
            id,
            created_at: now_unix(),
            title: new.title,
            year: new.year,
            runtime: new.runtime,
            genres: new.genres.unwrap_or_default(),
            version: 1,
        }
    }

    fn apply(&mut self, changes: MovieChanges) {
        if let Some(title) = changes.title {
            self.title = title;
        }
        if let Some(year) = changes.year {
            self.year = year;
        }
        if let Some(runtime) = changes.runtime {
            self.runtime = runtime;
        }
        if let Some(genres) = changes.genres {
            self.genres = genres;
        }
    }
}

pub fn validate_movie(v: &mut Validator, movie: &NewMovie) {
    v.check(!movie.title.is_empty(), "title", "must be provided");
    v.check(movie.title.len() <= 500, "title", "must not be more than 500 bytes long");

    v.check(movie.year != 0, "year", "must be provided");
    v.check(movie.year >= 1888, "year", "must be greater than 1888");
    v.check(movie.year <= current_year(), "year", "must not be in the future");

    v.check(movie.runtime.minutes() != 0, "runtime", "must be provided");
    v.check(movie.runtime.minutes() > 0, "runtime", "must be a positive integer");

    match &movie.genres {
        None => v.add_error("genres", "must be provided"),
        Some(genres) => {
            v.check(!genres.is_empty(), "genres", "must contain at least 1 genre");
            v.check(genres.len() <= 5, "genres", "must not contain more than 5 genres");
            v.check(unique(genres), "genres", "must not contain duplicate values");
        }
    }
}

/// List query for movies.
#[derive(Debug, Clone)]
pub struct MovieQuery {
    pub title: String,
    pub genres: Vec<String>,
    pub filters: Filters,
}

/// Filter, sort and paginate `movies`.
///
/// Title matches are case-insensitive substrings; every requested genre must
/// be present. Ties in the sort column fall back to ascending id.
pub fn select_movies(movies: Vec<Movie>, query: &MovieQuery) -> (Vec<Movie>, Metadata) {
    let title = query.title.to_lowercase();
    let mut matched: Vec<Movie> = movies
        .into_iter()
        .filter(|movie| title.is_empty() || movie.title.to_lowercase().contains(&title))
        .filter(|movie| query.genres.iter().all(|genre| movie.genres.contains(genre)))
        .collect();

    let filters = &query.filters;
    matched.sort_by(|a, b| {
        let ordering = match filters.sort_column() {
            "title" => a.title.cmp(&b.title),
            "year" => a.year.cmp(&b.year),
            "runtime" => a.runtime.cmp(&b.runtime),
            _ => a.id.cmp(&b.id),
        };
        let ordering = if filters.sort_descending() {
            ordering.reverse()
        } else {
            ordering
        };
        match ordering {
            Ordering::Equal => a.id.cmp(&b.id),
            other => other,
        }
    });

    let metadata = calculate_metadata(matched.len() as i64, filters.page, filters.page_size);
    let page = matched
        .into_iter()
        .skip(filters.offset())
        .take(filters.limit())
        .collect();
    (page, metadata)
}
