//! HTTP client for the Greenlight API.

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const EXPECTED_VERSION_HEADER: &str = "X-Expected-Version";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status. `error` is the value
    /// of the `error` field: a message string or a map of field messages.
    #[error("server returned {status}: {error}")]
    Api {
        status: StatusCode,
        error: serde_json::Value,
    },
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Http(err) => err.status(),
            ClientError::Api { status, .. } => Some(*status),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Health {
    pub status: String,
    pub system_info: SystemInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemInfo {
    pub environment: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Movie {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub year: Option<i32>,
    /// For example `"102 mins"`.
    #[serde(default)]
    pub runtime: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    pub version: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewMovie {
    pub title: String,
    pub year: i32,
    pub runtime: String,
    pub genres: Vec<String>,
}

/// Partial update. `None` fields are left out of the request body.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MoviePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genres: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ListParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Comma separated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genres: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub current_page: i64,
    pub page_size: i64,
    pub first_page: i64,
    pub last_page: i64,
    pub total_records: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MovieList {
    pub movies: Vec<Movie>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    pub id: i64,
    pub created_at: i64,
    pub name: String,
    pub email: String,
    pub activated: bool,
}

#[derive(Deserialize)]
struct MovieEnvelope {
    movie: Movie,
}

#[derive(Deserialize)]
struct UserEnvelope {
    user: User,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: serde_json::Value,
}

pub struct GreenlightClient {
    client: Client,
    base_url: String,
}

impl GreenlightClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn healthcheck(&self) -> Result<Health, ClientError> {
        send(self.client.get(self.url("/v1/healthcheck"))).await
    }

    pub async fn list_movies(&self, params: &ListParams) -> Result<MovieList, ClientError> {
        send(self.client.get(self.url("/v1/movies")).query(params)).await
    }

    pub async fn get_movie(&self, id: i64) -> Result<Movie, ClientError> {
        let envelope: MovieEnvelope = send(self.client.get(self.url(&format!("/v1/movies/{id}")))).await?;
        Ok(envelope.movie)
    }

    pub async fn create_movie(&self, movie: &NewMovie) -> Result<Movie, ClientError> {
        let envelope: MovieEnvelope = send(self.client.post(self.url("/v1/movies")).json(movie)).await?;
        Ok(envelope.movie)
    }

    /// PATCH a movie. With `expected_version` the server refuses the write
    /// with 409 if the movie has changed since that version was read.
    pub async fn update_movie(
        &self,
        id: i64,
        patch: &MoviePatch,
        expected_version: Option<i32>,
    ) -> Result<Movie, ClientError> {
        let mut request = self.client.patch(self.url(&format!("/v1/movies/{id}"))).json(patch);
        if let Some(version) = expected_version {
            request = request.header(EXPECTED_VERSION_HEADER, version.to_string());
        }
        let envelope: MovieEnvelope = send(request).await?;
        Ok(envelope.movie)
    }

    pub async fn replace_movie(&self, id: i64, movie: &NewMovie) -> Result<Movie, ClientError> {
        let envelope: MovieEnvelope = send(self.client.put(self.url(&format!("/v1/movies/{id}"))).json(movie)).await?;
        Ok(envelope.movie)
    }

    pub async fn delete_movie(&self, id: i64) -> Result<(), ClientError> {
        let _: serde_json::Value = send(self.client.delete(self.url(&format!("/v1/movies/{id}")))).await?;
        Ok(())
    }

    pub async fn register_user(&self, user: &NewUser) -> Result<User, ClientError> {
        let envelope: UserEnvelope = send(self.client.post(self.url("/v1/users")).json(user)).await?;
        Ok(envelope.user)
    }
}

async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ClientError> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }

    let text = response.text().await?;
    let error = match serde_json::from_str::<ErrorEnvelope>(&text) {
        Ok(envelope) => envelope.error,
        Err(_) => serde_json::Value::String(text),
    };
    Err(ClientError::Api { status, error })
}
