//! End-to-end tests against the router with an in-memory database.

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use bookly::{
    AppState, Config, Database,
    auth::AuthService,
    db::Book,
    library::{NewBook, catalog},
    server::{self, StatusReply},
};
use http_body_util::BodyExt;
use tower::ServiceExt;

const FORM: &str = "application/x-www-form-urlencoded";

struct TestApp {
    app: Router,
    db: Database,
}

impl TestApp {
    fn new() -> Self {
        let db = Database::open_memory().unwrap();
        let state = AppState::from_config(Config::default(), db.clone());
        Self {
            app: server::create_router(state),
            db,
        }
    }

    async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        self.request("GET", uri, cookie).await
    }

    async fn request(&self, method: &str, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    async fn post_form(&self, uri: &str, cookie: Option<&str>, form: &str) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, FORM);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(form.to_string())).unwrap())
            .await
    }

    async fn post_json(&self, uri: &str, cookie: &str, body: &str) -> Response<Body> {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::COOKIE, cookie)
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Register through the form and return the cookies the browser would send back.
    async fn sign_up(&self, name: &str, email: &str) -> String {
        let form = format!(
            "name={}&email={}&password=secret",
            urlencoding::encode(name),
            urlencoding::encode(email)
        );
        let resp = self.post_form("/register/", None, &form).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp), "/dashboard/");
        cookies(&resp)
    }

    fn add_book(&self, title: &str, content_location: &str) -> Book {
        let auth = AuthService::new(self.db.clone(), 14, true);
        if self
            .db
            .get_user_by_email("writer@example.com")
            .unwrap()
            .is_none()
        {
            auth.create_user("writer@example.com", "Lesya Ukrainka", "pw", true)
                .unwrap();
        }

        catalog::add_book(
            &self.db,
            NewBook {
                title: title.to_string(),
                author_email: "writer@example.com".to_string(),
                author_name: None,
                description: "A drama in three acts.".to_string(),
                genre: "Drama".to_string(),
                cover_url: String::new(),
                content_location: content_location.to_string(),
                total_pages: 120,
                daily_price: "0.99".parse().unwrap(),
                monthly_price: "7.50".parse().unwrap(),
            },
        )
        .unwrap()
    }

    fn favorite_count(&self, email: &str) -> usize {
        let user = self.db.get_user_by_email(email).unwrap().unwrap();
        self.db.user_favorite_books(&user.id).unwrap().len()
    }

    async fn rent(&self, cookie: &str, book_id: &str, rental_type: &str) -> String {
        let form = format!("book_id={}&rental_type={}", book_id, rental_type);
        let resp = self.post_form("/rent/", Some(cookie), &form).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);

        let target = location(&resp);
        target
            .strip_prefix("/reader/")
            .and_then(|rest| rest.strip_suffix('/'))
            .unwrap()
            .to_string()
    }
}

fn location(resp: &Response<Body>) -> String {
    resp.headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

/// `name=value` pairs of every non-empty Set-Cookie header, joined for a Cookie header.
fn cookies(resp: &Response<Body>) -> String {
    resp.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .filter(|pair| pair.split_once('=').is_some_and(|(_, value)| !value.is_empty()))
        .collect::<Vec<_>>()
        .join("; ")
}

fn session_only(cookie: &str) -> String {
    cookie
        .split("; ")
        .find(|pair| pair.starts_with(server::SESSION_COOKIE))
        .unwrap()
        .to_string()
}

async fn body_text(resp: Response<Body>) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(resp: Response<Body>) -> StatusReply {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn anonymous_dashboard_redirects_to_login() {
    let app = TestApp::new();

    let resp = app.get("/dashboard/", None).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/login/?next=%2Fdashboard%2F");
}

#[tokio::test]
async fn landing_page_is_public() {
    let app = TestApp::new();

    let resp = app.get("/", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("Bookly"));
}

#[tokio::test]
async fn register_signs_in_and_greets() {
    let app = TestApp::new();
    let cookie = app.sign_up("Olena", "olena@example.com").await;
    assert!(cookie.contains(server::SESSION_COOKIE));
    assert!(cookie.contains(server::FLASH_COOKIE));

    let resp = app.get("/dashboard/", Some(&cookie)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let html = body_text(resp).await;
    assert!(html.contains("Welcome, Olena! Your account is ready."));

    let resp = app.get("/", Some(&session_only(&cookie))).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/dashboard/");
}

#[tokio::test]
async fn register_duplicate_email_goes_back_to_form() {
    let app = TestApp::new();
    app.sign_up("Olena", "olena@example.com").await;

    let resp = app
        .post_form(
            "/register/",
            None,
            "name=Other&email=olena%40example.com&password=pw",
        )
        .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/register/");

    let flash = cookies(&resp);
    assert!(!flash.contains(server::SESSION_COOKIE));

    let html = body_text(app.get("/register/", Some(&flash)).await).await;
    assert!(html.contains("A user with this email already exists"));
}

#[tokio::test]
async fn login_follows_local_next_only() {
    let app = TestApp::new();
    app.sign_up("Olena", "olena@example.com").await;

    let resp = app
        .post_form(
            "/login/",
            None,
            "email=olena%40example.com&password=secret&next=%2Fcatalog%2F",
        )
        .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/catalog/");

    let resp = app
        .post_form(
            "/login/",
            None,
            "email=olena%40example.com&password=secret&next=https%3A%2F%2Fevil.example.com",
        )
        .await;
    assert_eq!(location(&resp), "/dashboard/");
}

#[tokio::test]
async fn login_ignores_next_with_control_characters() {
    let app = TestApp::new();
    app.sign_up("Olena", "olena@example.com").await;

    let resp = app
        .post_form(
            "/login/",
            None,
            "email=olena%40example.com&password=secret&next=%2Fcatalog%2F%0Ax",
        )
        .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/dashboard/");
    assert!(cookies(&resp).contains(server::SESSION_COOKIE));
}

#[tokio::test]
async fn login_with_wrong_password_fails() {
    let app = TestApp::new();
    app.sign_up("Olena", "olena@example.com").await;

    let resp = app
        .post_form("/login/", None, "email=olena%40example.com&password=nope")
        .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/login/");
    assert!(!cookies(&resp).contains(server::SESSION_COOKIE));
}

#[tokio::test]
async fn logout_ends_session() {
    let app = TestApp::new();
    let session = session_only(&app.sign_up("Olena", "olena@example.com").await);

    let resp = app.post_form("/logout/", Some(&session), "").await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/");

    let resp = app.get("/dashboard/", Some(&session)).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert!(location(&resp).starts_with("/login/"));
}

#[tokio::test]
async fn catalog_filters_by_search_and_genre() {
    let app = TestApp::new();
    app.add_book("Forest Song", "https://cdn.example.com/forest.pdf");
    app.add_book("Cassandra", "https://cdn.example.com/cassandra.pdf");
    let session = session_only(&app.sign_up("Olena", "olena@example.com").await);

    let html = body_text(app.get("/catalog/?search=forest&genre=Drama", Some(&session)).await).await;
    assert!(html.contains("Forest Song"));
    assert!(!html.contains("Cassandra"));

    let html = body_text(app.get("/catalog/?genre=Poetry", Some(&session)).await).await;
    assert!(!html.contains("Forest Song"));
}

#[tokio::test]
async fn rent_opens_reader_with_progress() {
    let app = TestApp::new();
    let book = app.add_book("Forest Song", "https://cdn.example.com/forest.pdf");
    let session = session_only(&app.sign_up("Olena", "olena@example.com").await);

    let rental_id = app.rent(&session, &book.id, "daily").await;

    let resp = app.get(&format!("/reader/{}/", rental_id), Some(&session)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let html = body_text(resp).await;
    assert!(html.contains("Forest Song"));
    assert!(html.contains(r#"data-total="120""#));

    let stored = app.db.get_book(&book.id).unwrap().unwrap();
    assert_eq!(stored.rentals_count, 1);
}

#[tokio::test]
async fn non_post_actions_go_back_to_catalog() {
    let app = TestApp::new();
    let session = session_only(&app.sign_up("Olena", "olena@example.com").await);

    for method in ["GET", "PUT", "DELETE", "PATCH"] {
        for uri in ["/rent/", "/favorite/"] {
            let resp = app.request(method, uri, Some(&session)).await;
            assert_eq!(resp.status(), StatusCode::SEE_OTHER, "{} {}", method, uri);
            assert_eq!(location(&resp), "/catalog/");
        }
    }
}

#[tokio::test]
async fn rent_unknown_book_is_not_found() {
    let app = TestApp::new();
    let session = session_only(&app.sign_up("Olena", "olena@example.com").await);

    let resp = app
        .post_form("/rent/", Some(&session), "book_id=missing&rental_type=daily")
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_book_details_are_not_found() {
    let app = TestApp::new();
    let session = session_only(&app.sign_up("Olena", "olena@example.com").await);

    let resp = app.get("/book/missing/", Some(&session)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn rent_keeps_submitted_rental_type() {
    let app = TestApp::new();
    let book = app.add_book("Forest Song", "https://cdn.example.com/forest.pdf");
    let session = session_only(&app.sign_up("Olena", "olena@example.com").await);
    let user = app.db.get_user_by_email("olena@example.com").unwrap().unwrap();

    let rental_id = app.rent(&session, &book.id, "weekly").await;

    let rental = app.db.get_user_rental(&rental_id, &user.id).unwrap().unwrap();
    assert_eq!(rental.rental_type, "weekly");
    assert_eq!(rental.price_paid.to_string(), "7.50");
}

#[tokio::test]
async fn reader_of_another_users_rental_is_not_found() {
    let app = TestApp::new();
    let book = app.add_book("Forest Song", "https://cdn.example.com/forest.pdf");
    let owner = session_only(&app.sign_up("Olena", "olena@example.com").await);
    let other = session_only(&app.sign_up("Petro", "petro@example.com").await);

    let rental_id = app.rent(&owner, &book.id, "monthly").await;

    let resp = app.get(&format!("/reader/{}/", rental_id), Some(&other)).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn progress_update_round_trip() {
    let app = TestApp::new();
    let book = app.add_book("Forest Song", "https://cdn.example.com/forest.pdf");
    let session = session_only(&app.sign_up("Olena", "olena@example.com").await);
    let rental_id = app.rent(&session, &book.id, "daily").await;
    let uri = format!("/progress/update/{}/", rental_id);

    let resp = app.post_json(&uri, &session, r#"{"current_page": 42}"#).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        body_json(resp).await,
        StatusReply {
            status: "success".to_string(),
            message: None,
        }
    );

    let progress = app.db.get_rental_progress(&rental_id).unwrap().unwrap();
    assert_eq!(progress.current_page, 42);
}

#[tokio::test]
async fn progress_update_rejects_bad_body() {
    let app = TestApp::new();
    let book = app.add_book("Forest Song", "https://cdn.example.com/forest.pdf");
    let session = session_only(&app.sign_up("Olena", "olena@example.com").await);
    let rental_id = app.rent(&session, &book.id, "daily").await;
    let uri = format!("/progress/update/{}/", rental_id);

    for body in ["not json", r#"{"page": 3}"#, r#"{"current_page": "three"}"#] {
        let resp = app.post_json(&uri, &session, body).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let reply = body_json(resp).await;
        assert_eq!(reply.status, "error");
        assert!(reply.message.is_some_and(|m| !m.is_empty()));
    }
}

#[tokio::test]
async fn progress_update_accepts_boolean_page() {
    let app = TestApp::new();
    let book = app.add_book("Forest Song", "https://cdn.example.com/forest.pdf");
    let session = session_only(&app.sign_up("Olena", "olena@example.com").await);
    let rental_id = app.rent(&session, &book.id, "daily").await;
    let uri = format!("/progress/update/{}/", rental_id);

    app.post_json(&uri, &session, r#"{"current_page": 30}"#).await;
    let resp = app.post_json(&uri, &session, r#"{"current_page": true}"#).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let progress = app.db.get_rental_progress(&rental_id).unwrap().unwrap();
    assert_eq!(progress.current_page, 1);
}

#[tokio::test]
async fn progress_update_requires_post() {
    let app = TestApp::new();
    let session = session_only(&app.sign_up("Olena", "olena@example.com").await);

    let resp = app.get("/progress/update/whatever/", Some(&session)).await;
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    let reply = body_json(resp).await;
    assert_eq!(reply.status, "error");
    assert_eq!(reply.message.as_deref(), Some("Invalid request method"));
}

#[tokio::test]
async fn progress_update_of_foreign_rental_is_silent() {
    let app = TestApp::new();
    let book = app.add_book("Forest Song", "https://cdn.example.com/forest.pdf");
    let owner = session_only(&app.sign_up("Olena", "olena@example.com").await);
    let other = session_only(&app.sign_up("Petro", "petro@example.com").await);
    let rental_id = app.rent(&owner, &book.id, "daily").await;

    let resp = app
        .post_json(
            &format!("/progress/update/{}/", rental_id),
            &other,
            r#"{"current_page": 99}"#,
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let progress = app.db.get_rental_progress(&rental_id).unwrap().unwrap();
    assert_eq!(progress.current_page, 1);
}

#[tokio::test]
async fn favorite_toggle_returns_to_referer() {
    let app = TestApp::new();
    let book = app.add_book("Forest Song", "https://cdn.example.com/forest.pdf");
    let session = session_only(&app.sign_up("Olena", "olena@example.com").await);
    let form = format!("book_id={}", book.id);

    let request = Request::builder()
        .method("POST")
        .uri("/favorite/")
        .header(header::CONTENT_TYPE, FORM)
        .header(header::COOKIE, &session)
        .header(header::REFERER, "/catalog/?genre=Drama")
        .body(Body::from(form.clone()))
        .unwrap();
    let resp = app.send(request).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/catalog/?genre=Drama");
    assert_eq!(app.favorite_count("olena@example.com"), 1);

    let resp = app.post_form("/favorite/", Some(&session), &form).await;
    assert_eq!(location(&resp), format!("/book/{}/", book.id));
    assert_eq!(app.favorite_count("olena@example.com"), 0);
}

#[tokio::test]
async fn reader_content_streams_local_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("forest.txt");
    std::fs::write(&path, "Act one. The forest wakes.").unwrap();

    let app = TestApp::new();
    let book = app.add_book("Forest Song", path.to_str().unwrap());
    let session = session_only(&app.sign_up("Olena", "olena@example.com").await);
    let rental_id = app.rent(&session, &book.id, "daily").await;

    let resp = app
        .get(&format!("/reader/{}/content", rental_id), Some(&session))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/plain; charset=utf-8"
    );
    assert_eq!(body_text(resp).await, "Act one. The forest wakes.");
}

#[tokio::test]
async fn reader_content_redirects_to_remote_copy() {
    let app = TestApp::new();
    let book = app.add_book("Forest Song", "https://cdn.example.com/forest.pdf");
    let session = session_only(&app.sign_up("Olena", "olena@example.com").await);
    let rental_id = app.rent(&session, &book.id, "daily").await;

    let resp = app
        .get(&format!("/reader/{}/content", rental_id), Some(&session))
        .await;
    assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(location(&resp), "https://cdn.example.com/forest.pdf");
}
