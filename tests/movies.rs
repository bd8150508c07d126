//! Movie and user endpoints end to end, through the SDK client.

use std::sync::Arc;
use std::time::Duration;

use greenlight::config::{AdmissionConfig, ApiConfig};
use greenlight::mailer::LogMailer;
use greenlight_sdk::{ClientError, GreenlightClient, ListParams, MoviePatch, NewMovie, NewUser};
use reqwest::StatusCode;
use serde_json::json;

mod common;
use common::RecordingMailer;

fn unlimited() -> ApiConfig {
    ApiConfig {
        admission: AdmissionConfig {
            enabled: false,
            ..AdmissionConfig::default()
        },
        ..ApiConfig::default()
    }
}

fn moana() -> NewMovie {
    NewMovie {
        title: "Moana".into(),
        year: 2016,
        runtime: "107 mins".into(),
        genres: vec!["animation".into(), "adventure".into()],
    }
}

fn status_of<T: std::fmt::Debug>(result: Result<T, ClientError>) -> StatusCode {
    result.unwrap_err().status().expect("error should carry a status")
}

#[tokio::test]
async fn movie_lifecycle_with_optimistic_locking() {
    let server = common::spawn_server(unlimited(), Arc::new(LogMailer)).await;
    let client = GreenlightClient::new(&server.url());

    let created = client.create_movie(&moana()).await.unwrap();
    assert_eq!(created.id, 1);
    assert_eq!(created.version, 1);
    assert_eq!(created.runtime.as_deref(), Some("107 mins"));

    let fetched = client.get_movie(created.id).await.unwrap();
    assert_eq!(fetched, created);

    let patch = MoviePatch {
        year: Some(2017),
        ..MoviePatch::default()
    };
    let updated = client.update_movie(created.id, &patch, Some(1)).await.unwrap();
    assert_eq!(updated.version, 2);
    assert_eq!(updated.year, Some(2017));
    assert_eq!(updated.title, "Moana");

    let stale = client.update_movie(created.id, &patch, Some(1)).await;
    match stale {
        Err(ClientError::Api { status, error }) => {
            assert_eq!(status, StatusCode::CONFLICT);
            assert_eq!(
                error,
                json!("unable to update the record due to an edit conflict, please try again")
            );
        }
        other => panic!("expected conflict, got {other:?}"),
    }

    let unpinned = client
        .update_movie(
            created.id,
            &MoviePatch {
                title: Some("Moana (Sing-Along)".into()),
                ..MoviePatch::default()
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(unpinned.version, 3);

    client.delete_movie(created.id).await.unwrap();
    assert_eq!(status_of(client.get_movie(created.id).await), StatusCode::NOT_FOUND);
    assert_eq!(status_of(client.delete_movie(created.id).await), StatusCode::NOT_FOUND);

    server.shutdown().await;
}

#[tokio::test]
async fn create_sets_location_and_rejects_bad_bodies() {
    let server = common::spawn_server(unlimited(), Arc::new(LogMailer)).await;
    let http = reqwest::Client::new();
    let url = format!("{}/v1/movies", server.url());

    let res = http
        .post(&url)
        .json(&json!({"title": "Heat", "year": 1995, "runtime": "170 mins", "genres": ["crime"]}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(res.headers()["location"], "/v1/movies/1");

    let res = http
        .post(&url)
        .json(&json!({"title": "Heat", "rating": 5}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "body contains unknown key \"rating\"");

    let res = http
        .post(&url)
        .json(&json!({"title": "", "year": 1800, "runtime": "90 mins", "genres": []}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"]["title"], "must be provided");
    assert_eq!(body["error"]["year"], "must be greater than 1888");
    assert_eq!(body["error"]["genres"], "must contain at least 1 genre");

    let res = http
        .post(&url)
        .json(&json!({"title": "Heat", "year": 1995, "runtime": "170 minutes", "genres": ["crime"]}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = http.get(format!("{url}/abc")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    server.shutdown().await;
}

#[tokio::test]
async fn listing_filters_and_pages() {
    let server = common::spawn_server(unlimited(), Arc::new(LogMailer)).await;
    let client = GreenlightClient::new(&server.url());

    for (title, year, genres) in [
        ("The Breakfast Club", 1985, vec!["comedy", "drama"]),
        ("Fight Club", 1999, vec!["drama"]),
        ("Moana", 2016, vec!["animation"]),
    ] {
        client
            .create_movie(&NewMovie {
                title: title.into(),
                year,
                runtime: "100 mins".into(),
                genres: genres.into_iter().map(String::from).collect(),
            })
            .await
            .unwrap();
    }

    let list = client
        .list_movies(&ListParams {
            title: Some("club".into()),
            sort: Some("-year".into()),
            page_size: Some(1),
            ..ListParams::default()
        })
        .await
        .unwrap();
    assert_eq!(list.movies.len(), 1);
    assert_eq!(list.movies[0].title, "Fight Club");
    assert_eq!(list.metadata.total_records, 2);
    assert_eq!(list.metadata.last_page, 2);

    let list = client
        .list_movies(&ListParams {
            genres: Some("comedy,drama".into()),
            ..ListParams::default()
        })
        .await
        .unwrap();
    assert_eq!(list.movies.len(), 1);
    assert_eq!(list.movies[0].title, "The Breakfast Club");

    let bad_sort = client
        .list_movies(&ListParams {
            sort: Some("rating".into()),
            ..ListParams::default()
        })
        .await;
    assert_eq!(status_of(bad_sort), StatusCode::UNPROCESSABLE_ENTITY);

    server.shutdown().await;
}

#[tokio::test]
async fn registration_rejects_duplicate_email_and_mails_before_exit() {
    let mailer = Arc::new(RecordingMailer::with_delay(Duration::from_millis(300)));
    let server = common::spawn_server(unlimited(), mailer.clone()).await;
    let client = GreenlightClient::new(&server.url());

    let user = client
        .register_user(&NewUser {
            name: "Alice Smith".into(),
            email: "alice@example.com".into(),
        })
        .await
        .unwrap();
    assert!(!user.activated);

    let duplicate = client
        .register_user(&NewUser {
            name: "Alice Again".into(),
            email: "ALICE@example.com".into(),
        })
        .await;
    match duplicate {
        Err(ClientError::Api { status, error }) => {
            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
            assert_eq!(error["email"], "a user with this email address already exists");
        }
        other => panic!("expected validation failure, got {other:?}"),
    }

    // The welcome mail is still in flight; shutdown must wait for it.
    let report = server.shutdown().await;
    assert!(!report.drain_timed_out());

    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "alice@example.com");
    assert!(sent[0].body.contains("Alice Smith"));
}
