//! Cookie-backed sessions, the signed-in user extractor and flash messages.

use crate::db::User;
use crate::server::AppState;
use axum::{
    extract::FromRequestParts,
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

/// Cookie holding the session token.
pub const SESSION_COOKIE: &str = "bookly_session";
/// Cookie holding a one-shot message for the next page.
pub const FLASH_COOKIE: &str = "bookly_flash";

/// Where signed-in users land by default.
pub const DEFAULT_LANDING: &str = "/dashboard/";

/// Session cookie for a freshly issued token.
pub fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

fn removal_cookie(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, "")).path("/").build()
}

/// Drop the session cookie from the browser.
pub fn clear_session(jar: CookieJar) -> CookieJar {
    jar.remove(removal_cookie(SESSION_COOKIE))
}

/// Session token carried by the request, if any.
pub fn session_token(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
}

/// Resolve the signed-in user from the session cookie.
pub fn session_user(state: &AppState, jar: &CookieJar) -> crate::Result<Option<User>> {
    match session_token(jar) {
        Some(token) => state.auth.validate_token(&token),
        None => Ok(None),
    }
}

/// Redirect to the login page, remembering where the user was going.
pub fn login_redirect(next: &str) -> Redirect {
    Redirect::to(&format!("/login/?next={}", urlencoding::encode(next)))
}

/// Accept only local absolute paths as post-login targets.
pub fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(n)
            if n.starts_with('/')
                && !n.starts_with("//")
                && !n.contains('\\')
                && !n.chars().any(char::is_control) =>
        {
            n
        }
        _ => DEFAULT_LANDING,
    }
}

/// The signed-in user. Anonymous requests are redirected to the login page.
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);

        match session_user(state, &jar) {
            Ok(Some(user)) => Ok(CurrentUser(user)),
            Ok(None) => {
                let next = parts
                    .uri
                    .path_and_query()
                    .map(|pq| pq.as_str())
                    .unwrap_or("/");
                Err(login_redirect(next).into_response())
            }
            Err(e) => Err(e.into_response()),
        }
    }
}

/// Severity of a flash message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashLevel {
    /// Something worked.
    Success,
    /// Neutral notice.
    Info,
    /// Something went wrong.
    Error,
}

impl FlashLevel {
    /// CSS class and wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            FlashLevel::Success => "success",
            FlashLevel::Info => "info",
            FlashLevel::Error => "error",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(FlashLevel::Success),
            "info" => Some(FlashLevel::Info),
            "error" => Some(FlashLevel::Error),
            _ => None,
        }
    }
}

/// One-shot message shown on the page after a redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flash {
    /// Severity.
    pub level: FlashLevel,
    /// Text shown to the user.
    pub message: String,
}

impl Flash {
    fn encode(&self) -> String {
        urlencoding::encode(&format!("{}:{}", self.level.as_str(), self.message)).into_owned()
    }

    fn decode(raw: &str) -> Option<Self> {
        let decoded = urlencoding::decode(raw).ok()?;
        let (level, message) = decoded.split_once(':')?;
        Some(Self {
            level: FlashLevel::parse(level)?,
            message: message.to_string(),
        })
    }
}

/// Queue a flash message for the next page view.
pub fn set_flash(jar: CookieJar, level: FlashLevel, message: impl Into<String>) -> CookieJar {
    let flash = Flash {
        level,
        message: message.into(),
    };
    jar.add(
        Cookie::build((FLASH_COOKIE, flash.encode()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .build(),
    )
}

/// Consume the pending flash message, if any.
pub fn take_flash(jar: CookieJar) -> (CookieJar, Option<Flash>) {
    let flash = jar.get(FLASH_COOKIE).and_then(|c| Flash::decode(c.value()));
    match flash {
        Some(flash) => (jar.remove(removal_cookie(FLASH_COOKIE)), Some(flash)),
        None => (jar, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flash_survives_cookie_encoding() {
        let jar = set_flash(
            CookieJar::new(),
            FlashLevel::Success,
            "Вітаємо, Олена: done; 100%",
        );
        let (_, flash) = take_flash(jar);
        let flash = flash.unwrap();
        assert_eq!(flash.level, FlashLevel::Success);
        assert_eq!(flash.message, "Вітаємо, Олена: done; 100%");
    }

    #[test]
    fn flash_is_consumed() {
        let jar = set_flash(CookieJar::new(), FlashLevel::Info, "bye");
        let (jar, first) = take_flash(jar);
        assert!(first.is_some());
        let (_, second) = take_flash(jar);
        assert!(second.is_none());
    }

    #[test]
    fn garbage_flash_is_ignored() {
        let jar = CookieJar::new().add(Cookie::new(FLASH_COOKIE, "nonsense"));
        let (_, flash) = take_flash(jar);
        assert!(flash.is_none());
    }

    #[test]
    fn next_must_be_local() {
        assert_eq!(safe_next(Some("/catalog/?genre=Drama")), "/catalog/?genre=Drama");
        assert_eq!(safe_next(Some("//evil.example.com")), DEFAULT_LANDING);
        assert_eq!(safe_next(Some("https://evil.example.com")), DEFAULT_LANDING);
        assert_eq!(safe_next(Some("/\\evil.example.com")), DEFAULT_LANDING);
        assert_eq!(safe_next(Some("/catalog/\nx")), DEFAULT_LANDING);
        assert_eq!(safe_next(Some("/catalog/\tx")), DEFAULT_LANDING);
        assert_eq!(safe_next(None), DEFAULT_LANDING);
    }
}
