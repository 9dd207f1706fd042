//! HTTP request handlers.

use crate::db::now_timestamp;
use crate::error::{AppError, Result};
use crate::library::{
    CatalogQuery, Toggle, catalog,
    content::{self, ContentFormat, ContentSource},
    favorite, progress, rental,
};
use crate::server::AppState;
use crate::server::pages;
use crate::server::session::{
    self, CurrentUser, DEFAULT_LANDING, FlashLevel, clear_session, session_cookie, set_flash,
    take_flash,
};
use axum::{
    Form, Json,
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

/// Number of books in the dashboard's "new in the catalog" row.
const RECOMMENDED_LIMIT: usize = 10;
/// Number of genre shortcuts on the dashboard.
const DASHBOARD_GENRES: usize = 3;

// ============================================================================
// PAGES
// ============================================================================

/// Landing page; signed-in users go straight to the dashboard.
pub async fn landing(State(state): State<AppState>, jar: CookieJar) -> Result<Response> {
    if session::session_user(&state, &jar)?.is_some() {
        return Ok(Redirect::to(DEFAULT_LANDING).into_response());
    }

    let (jar, flash) = take_flash(jar);
    Ok((jar, Html(pages::landing(state.title(), flash.as_ref()))).into_response())
}

/// Reader dashboard.
pub async fn dashboard(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
) -> Result<(CookieJar, Html<String>)> {
    let reads = state.db.current_reads(&user.id, now_timestamp())?;
    let recommended = state.db.recent_books(RECOMMENDED_LIMIT)?;
    let favorites = state.db.user_favorite_books(&user.id)?;
    let genres = state.db.list_genres(Some(DASHBOARD_GENRES))?;

    let (jar, flash) = take_flash(jar);
    let html = pages::dashboard(
        state.title(),
        &user,
        flash.as_ref(),
        &reads,
        &recommended,
        &favorites,
        &genres,
    );
    Ok((jar, Html(html)))
}

/// Catalog with search and genre filter.
pub async fn catalog_page(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
    Query(query): Query<CatalogQuery>,
) -> Result<(CookieJar, Html<String>)> {
    let books = catalog::search_books(&state.db, &query)?;
    let genres = state.db.list_genres(None)?;

    let (jar, flash) = take_flash(jar);
    let html = pages::catalog(
        state.title(),
        &user,
        flash.as_ref(),
        &books,
        &genres,
        &query,
    );
    Ok((jar, Html(html)))
}

/// Book details.
pub async fn book_details(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
    Path(book_id): Path<String>,
) -> Result<(CookieJar, Html<String>)> {
    let book = state
        .db
        .get_book(&book_id)?
        .ok_or_else(|| AppError::NotFound(format!("Book not found: {}", book_id)))?;
    let is_favorite = favorite::is_favorite(&state.db, &user.id, &book.id)?;

    let (jar, flash) = take_flash(jar);
    let html = pages::book_details(state.title(), &user, flash.as_ref(), &book, is_favorite);
    Ok((jar, Html(html)))
}

/// Reader page for one of the user's rentals.
pub async fn reader(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
    Path(rental_id): Path<String>,
) -> Result<(CookieJar, Html<String>)> {
    let rental = state
        .db
        .get_user_rental(&rental_id, &user.id)?
        .ok_or_else(|| AppError::NotFound(format!("Rental not found: {}", rental_id)))?;
    let progress = state
        .db
        .get_rental_progress(&rental.id)?
        .ok_or_else(|| AppError::NotFound(format!("Progress not found: {}", rental_id)))?;
    let book = state
        .db
        .get_book(&rental.book_id)?
        .ok_or_else(|| AppError::NotFound(format!("Book not found: {}", rental.book_id)))?;

    let (jar, flash) = take_flash(jar);
    let html = pages::reader(
        state.title(),
        &user,
        flash.as_ref(),
        &rental,
        &progress,
        &book,
    );
    Ok((jar, Html(html)))
}

/// Rented content: redirect to a hosted copy or stream the local file.
pub async fn reader_content(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(rental_id): Path<String>,
) -> Result<Response> {
    let (_, book) = content::readable_rental(&state.db, &rental_id, &user.id, now_timestamp())?;

    match ContentSource::resolve(&book.content_location) {
        ContentSource::Remote(url) => Ok(Redirect::temporary(&url).into_response()),
        ContentSource::Local(path) => {
            let file = tokio::fs::File::open(&path).await.map_err(|e| {
                tracing::warn!(book_id = %book.id, path = %path.display(), error = %e, "Content file unavailable");
                AppError::NotFound(format!("Content not available for book: {}", book.id))
            })?;
            let size = file.metadata().await?.len();

            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, ContentFormat::mime_for_path(&path))
                .header(header::CONTENT_LENGTH, size)
                .header(header::CACHE_CONTROL, "private, no-store")
                .body(Body::from_stream(ReaderStream::new(file)))
                .map_err(|e| AppError::Internal(e.to_string()))
        }
    }
}

// ============================================================================
// AUTH
// ============================================================================

/// Registration form fields.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    name: Option<String>,
    email: Option<String>,
    password: Option<String>,
}

/// Login form fields.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    email: Option<String>,
    password: Option<String>,
    next: Option<String>,
}

/// Login page query.
#[derive(Debug, Deserialize)]
pub struct NextParam {
    next: Option<String>,
}

/// Registration page.
pub async fn register_page(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    let (jar, flash) = take_flash(jar);
    (jar, Html(pages::register(state.title(), flash.as_ref())))
}

/// Create an account and sign it in.
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<RegisterForm>,
) -> Result<(CookieJar, Redirect)> {
    let name = form.name.unwrap_or_default();
    let email = form.email.unwrap_or_default();
    let password = form.password.unwrap_or_default();

    let user = match state.auth.register(&name, &email, &password) {
        Ok(user) => user,
        Err(AppError::InvalidFormat(message)) => {
            let jar = set_flash(jar, FlashLevel::Error, message);
            return Ok((jar, Redirect::to("/register/")));
        }
        Err(e) => return Err(e),
    };

    let (_, token) = state.auth.login(&email, &password)?;
    let jar = jar.add(session_cookie(token, state.config.auth.secure_cookies));
    let jar = set_flash(
        jar,
        FlashLevel::Success,
        format!("Welcome, {}! Your account is ready.", user.name),
    );
    Ok((jar, Redirect::to(DEFAULT_LANDING)))
}

/// Login page.
pub async fn login_page(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<NextParam>,
) -> impl IntoResponse {
    let (jar, flash) = take_flash(jar);
    let next = params.next.as_deref().filter(|n| !n.is_empty());
    (jar, Html(pages::login(state.title(), flash.as_ref(), next)))
}

/// Check credentials and open a session.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<(CookieJar, Redirect)> {
    let email = form.email.unwrap_or_default();
    let password = form.password.unwrap_or_default();

    match state.auth.login(&email, &password) {
        Ok((user, token)) => {
            tracing::info!(user_id = %user.id, "User logged in");
            let jar = jar.add(session_cookie(token, state.config.auth.secure_cookies));
            let target = session::safe_next(form.next.as_deref());
            Ok((jar, Redirect::to(target)))
        }
        Err(AppError::InvalidFormat(_)) => {
            let jar = set_flash(jar, FlashLevel::Error, "Invalid email or password.");
            Ok((jar, Redirect::to("/login/")))
        }
        Err(e) => Err(e),
    }
}

/// End the session.
pub async fn logout(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect)> {
    if let Some(token) = session::session_token(&jar) {
        state.auth.logout(&token)?;
    }
    tracing::debug!(user_id = %user.id, "User logged out");

    let jar = set_flash(clear_session(jar), FlashLevel::Info, "You have been logged out.");
    Ok((jar, Redirect::to("/")))
}

// ============================================================================
// ACTIONS
// ============================================================================

/// Rental form fields.
#[derive(Debug, Deserialize)]
pub struct RentForm {
    book_id: Option<String>,
    rental_type: Option<String>,
}

/// Favorite form fields.
#[derive(Debug, Deserialize)]
pub struct FavoriteForm {
    book_id: Option<String>,
}

/// Any method but POST on the action endpoints goes back to the catalog.
pub async fn back_to_catalog(CurrentUser(_): CurrentUser) -> Redirect {
    Redirect::to("/catalog/")
}

/// Rent a book and open it in the reader.
pub async fn create_rental(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
    Form(form): Form<RentForm>,
) -> Result<(CookieJar, Redirect)> {
    let book_id = form.book_id.unwrap_or_default();
    let rental_type = form.rental_type.unwrap_or_default();

    let (rental, _) = rental::rent_book(&state.db, &user.id, &book_id, &rental_type)?;

    let jar = set_flash(jar, FlashLevel::Success, "Book rented successfully!");
    Ok((jar, Redirect::to(&format!("/reader/{}/", rental.id))))
}

/// Add or remove a book from favorites and go back where the user came from.
pub async fn toggle_favorite(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
    headers: HeaderMap,
    Form(form): Form<FavoriteForm>,
) -> Result<(CookieJar, Redirect)> {
    let book_id = form.book_id.unwrap_or_default();

    let jar = match favorite::toggle_favorite(&state.db, &user.id, &book_id)? {
        Toggle::Added => set_flash(jar, FlashLevel::Success, "Added to favorites."),
        Toggle::Removed => set_flash(jar, FlashLevel::Info, "Removed from favorites."),
    };

    let target = headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("/book/{}/", book_id));

    Ok((jar, Redirect::to(&target)))
}

// ============================================================================
// PROGRESS API
// ============================================================================

/// JSON envelope of the progress endpoint.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusReply {
    /// "success" or "error".
    pub status: String,
    /// Error text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusReply {
    fn success() -> Self {
        Self {
            status: "success".to_string(),
            message: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: Some(message.into()),
        }
    }
}

/// Save the reader's current page.
pub async fn update_progress(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(rental_id): Path<String>,
    body: Bytes,
) -> (StatusCode, Json<StatusReply>) {
    let result = progress::parse_current_page(&body).and_then(|page| {
        progress::update_progress(&state.db, &rental_id, &user.id, page)
            .map_err(|e| e.to_string())
    });

    match result {
        Ok(_) => (StatusCode::OK, Json(StatusReply::success())),
        Err(message) => {
            tracing::debug!(rental_id = %rental_id, error = %message, "Progress update rejected");
            (StatusCode::BAD_REQUEST, Json(StatusReply::error(message)))
        }
    }
}

/// Any method but POST on the progress endpoint.
pub async fn progress_method_not_allowed(
    CurrentUser(_): CurrentUser,
) -> (StatusCode, Json<StatusReply>) {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(StatusReply::error("Invalid request method")),
    )
}
