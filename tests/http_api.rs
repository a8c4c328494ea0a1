mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use cinema_booking::{controllers, AppState};
use common::{app, booked_setup};

const ADMIN: (&str, &str) = ("admin@cinema.test", "admin-pass");
const GUEST: (&str, &str) = ("guest@cinema.test", "guest-pass");

async fn router() -> (Router, Arc<AppState>) {
    let t = app();
    for ((email, password), is_admin) in [(ADMIN, true), (GUEST, false)] {
        let hash = bcrypt::hash(password, 4).unwrap();
        t.store.add_user(email, hash, "Test", is_admin).await.unwrap();
    }
    let router = Router::new().nest("/api", controllers::routes()).with_state(t.state.clone());
    (router, t.state)
}

fn basic((email, password): (&str, &str)) -> String {
    format!("Basic {}", general_purpose::STANDARD.encode(format!("{}:{}", email, password)))
}

async fn send(router: &Router, method: Method, uri: &str, auth: Option<(&str, &str)>, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(credentials) = auth {
        request = request.header(header::AUTHORIZATION, basic(credentials));
    }
    let body = match body {
        Some(json) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = router.clone().oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn room_writes_require_an_admin() {
    let (router, _) = router().await;
    let room = json!({"name": "Blue", "rows": 5, "columns": 6});

    let (status, _) = send(&router, Method::POST, "/api/rooms", None, Some(room.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&router, Method::POST, "/api/rooms", Some(("admin@cinema.test", "wrong")), Some(room.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&router, Method::POST, "/api/rooms", Some(GUEST), Some(room.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, created) = send(&router, Method::POST, "/api/rooms", Some(ADMIN), Some(room.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["name"], "Blue");

    let (status, body) = send(&router, Method::POST, "/api/rooms", Some(ADMIN), Some(room)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("same name"));

    let (status, rooms) = send(&router, Method::GET, "/api/rooms", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rooms.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn booking_over_http() {
    let (router, state) = router().await;
    let screening = booked_setup(&state).await;
    let uri = "/api/reservations";
    let request = json!({
        "screening_id": screening.id,
        "name": "Guest",
        "email": "guest@example.com",
        "phone": "+77005550102",
        "seats": [{"row": 1, "column": 1}, {"row": 1, "column": 2}]
    });

    let (status, _) = send(&router, Method::POST, uri, None, Some(request.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, created) = send(&router, Method::POST, uri, Some(GUEST), Some(request.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["seats"].as_array().unwrap().len(), 2);
    assert_eq!(created["seats"][0]["status"], "Reserved");
    assert_eq!(created["screening"]["id"], screening.id);

    let (status, body) = send(&router, Method::POST, uri, Some(GUEST), Some(request)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("already reserved or sold"));

    let seats_uri = format!("/api/screenings/{}/seats", screening.id);
    let (status, seats) = send(&router, Method::GET, &seats_uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(seats.as_array().unwrap().len(), 2);

    let id = created["id"].as_i64().unwrap();
    let (status, _) = send(&router, Method::GET, &format!("{}/{}", uri, id), Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&router, Method::DELETE, &format!("{}/{}", uri, id), Some(GUEST), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, seats) = send(&router, Method::GET, &seats_uri, None, None).await;
    assert!(seats.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn errors_map_to_status_codes() {
    let (router, state) = router().await;
    let screening = booked_setup(&state).await;

    let (status, body) = send(&router, Method::GET, "/api/screenings/4242", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Screening not found");

    let sell = format!("/api/screenings/{}/seats/sell", screening.id);
    let (status, _) = send(&router, Method::POST, &sell, Some(GUEST), Some(json!({"row": 0, "column": 1}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, seat) = send(&router, Method::POST, &sell, Some(GUEST), Some(json!({"row": 2, "column": 3}))).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(seat["status"], "Sold");

    let overlapping = json!({
        "movie_id": screening.movie_id,
        "room_id": screening.room_id,
        "starts_at": screening.starts_at,
    });
    let (status, _) = send(&router, Method::POST, "/api/screenings", Some(ADMIN), Some(overlapping)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&router, Method::DELETE, &format!("/api/screenings/{}", screening.id), Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn malformed_requests_get_json_errors() {
    let (router, _) = router().await;

    let (status, body) = send(&router, Method::GET, "/api/screenings/on/not-a-date", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = send(&router, Method::GET, "/api/rooms/abc", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = send(&router, Method::GET, "/api/movies?count=many", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) =
        send(&router, Method::POST, "/api/rooms", Some(ADMIN), Some(json!({"name": "Red", "rows": "five"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/rooms")
        .header(header::AUTHORIZATION, basic(ADMIN))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["error"].is_string());
}
