//! HTTP server and routes.

mod handlers;
mod pages;
mod session;
mod state;

pub use handlers::StatusReply;
pub use session::{FLASH_COOKIE, SESSION_COOKIE};
pub use state::AppState;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let page_routes = Router::new()
        .route("/", get(handlers::landing))
        .route("/dashboard/", get(handlers::dashboard))
        .route("/catalog/", get(handlers::catalog_page))
        .route("/book/{id}/", get(handlers::book_details))
        .route("/reader/{rental_id}/", get(handlers::reader))
        .route("/reader/{rental_id}/content", get(handlers::reader_content));

    let auth_routes = Router::new()
        .route(
            "/register/",
            get(handlers::register_page).post(handlers::register),
        )
        .route("/login/", get(handlers::login_page).post(handlers::login))
        .route("/logout/", post(handlers::logout));

    let action_routes = Router::new()
        .route(
            "/rent/",
            post(handlers::create_rental).fallback(handlers::back_to_catalog),
        )
        .route(
            "/favorite/",
            post(handlers::toggle_favorite).fallback(handlers::back_to_catalog),
        )
        .route(
            "/progress/update/{rental_id}/",
            post(handlers::update_progress).fallback(handlers::progress_method_not_allowed),
        );

    Router::new()
        .merge(page_routes)
        .merge(auth_routes)
        .merge(action_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
