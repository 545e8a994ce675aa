use std::fmt;

use chrono::{DateTime, Datelike, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::models::filters::Filters;
use crate::validation::{MAX_TEXT_BYTES, Validator, unique};

/// Sort keys accepted by `GET /v1/movies`.
pub const MOVIE_SORT_SAFELIST: &[&str] = &[
    "id", "title", "year", "runtime", "-id", "-title", "-year", "-runtime",
];

/// First year a film could have been released.
pub const EARLIEST_YEAR: i32 = 1888;

pub const MAX_GENRES: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct Movie {
    pub id: i64,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    pub title: String,
    #[serde(skip_serializing_if = "is_zero_year")]
    pub year: i32,
    #[serde(skip_serializing_if = "Runtime::is_zero")]
    pub runtime: Runtime,
    pub genres: Vec<String>,
    pub version: i32,
}

fn is_zero_year(year: &i32) -> bool {
    *year == 0
}

/// Movie length in minutes, written to JSON as `"<n> mins"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Runtime(pub i32);

impl Runtime {
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mins", self.0)
    }
}

impl std::str::FromStr for Runtime {
    type Err = InvalidRuntimeFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(' ');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(n), Some("mins"), None) => n
                .parse::<i32>()
                .map(Runtime)
                .map_err(|_| InvalidRuntimeFormat),
            _ => Err(InvalidRuntimeFormat),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid runtime format")]
pub struct InvalidRuntimeFormat;

impl Serialize for Runtime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Runtime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RuntimeVisitor;

        impl Visitor<'_> for RuntimeVisitor {
            type Value = Runtime;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string of the form \"<n> mins\"")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Runtime, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(RuntimeVisitor)
    }
}

/// Body of `POST /v1/movies`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateMovieRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub year: i32,
    #[serde(default)]
    pub runtime: Runtime,
    #[serde(default)]
    pub genres: Option<Vec<String>>,
}

/// Body of `PATCH /v1/movies/{id}`. Absent fields are left unchanged.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateMovieRequest {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub runtime: Option<Runtime>,
    pub genres: Option<Vec<String>>,
}

impl Movie {
    pub fn from_request(req: CreateMovieRequest) -> Self {
        Self {
            id: 0,
            created_at: Utc::now(),
            title: req.title,
            year: req.year,
            runtime: req.runtime,
            genres: req.genres.unwrap_or_default(),
            version: 0,
        }
    }

    pub fn apply(&mut self, update: UpdateMovieRequest) {
        if let Some(title) = update.title {
            self.title = title;
        }
        if let Some(year) = update.year {
            self.year = year;
        }
        if let Some(runtime) = update.runtime {
            self.runtime = runtime;
        }
        if let Some(genres) = update.genres {
            self.genres = genres;
        }
    }

    pub fn validate(&self, v: &mut Validator) {
        v.check(!self.title.is_empty(), "title", "must be provided");
        v.check(
            self.title.len() <= MAX_TEXT_BYTES,
            "title",
            "must not be more than 500 bytes long",
        );

        v.check(self.year != 0, "year", "must be provided");
        v.check(self.year >= EARLIEST_YEAR, "year", "must be 1888 or later");
        v.check(
            self.year <= Utc::now().year(),
            "year",
            "must not be in the future",
        );

        v.check(!self.runtime.is_zero(), "runtime", "must be provided");
        v.check(self.runtime.0 > 0, "runtime", "must be a positive integer");

        v.check(!self.genres.is_empty(), "genres", "must contain at least 1 genre");
        v.check(
            self.genres.len() <= MAX_GENRES,
            "genres",
            "must not contain more than 5 genres",
        );
        v.check(unique(&self.genres), "genres", "must not contain duplicate values");
    }
}

/// Title and genre filters for listings.
#[derive(Debug, Clone, Default)]
pub struct MovieFilter {
    pub title: String,
    pub genres: Vec<String>,
}

/// A validated listing request.
#[derive(Debug, Clone)]
pub struct MovieQuery {
    pub filter: MovieFilter,
    pub filters: Filters,
}

impl MovieFilter {
    /// Every word of the title filter must equal a whole word of the title,
    /// ignoring case, and every requested genre must be present.
    pub fn matches(&self, movie: &Movie) -> bool {
        let words: Vec<String> = title_words(&movie.title).collect();
        let title_ok = title_words(&self.title).all(|word| words.contains(&word));
        let genres_ok = self
            .genres
            .iter()
            .all(|g| movie.genres.iter().any(|mg| mg.eq_ignore_ascii_case(g)));
        title_ok && genres_ok
    }
}

/// Lowercased words, split on anything that is not a letter or digit.
fn title_words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}
