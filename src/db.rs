mod schema;

pub use schema::Database;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Seconds in one day.
pub const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// User account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID.
    pub id: String,
    /// Email address, also the login name.
    pub email: String,
    /// Argon2 password hash.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Display name.
    pub name: String,
    /// Avatar URL.
    pub picture: Option<String>,
    /// Whether the user publishes books.
    pub is_author: bool,
    /// Account creation timestamp.
    pub created_at: i64,
    /// Last login timestamp.
    pub last_login: Option<i64>,
}

/// Authentication session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Session token.
    pub token: String,
    /// User ID.
    pub user_id: String,
    /// Expiration timestamp.
    pub expires_at: i64,
}

/// Amount of money in minor units (cents).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(i64);

impl Price {
    /// Build a price from cents. Negative amounts are rejected.
    pub fn from_cents(cents: i64) -> Option<Self> {
        (cents >= 0).then_some(Self(cents))
    }

    /// Amount in cents.
    pub fn cents(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

impl FromStr for Price {
    type Err = String;

    /// Parse a decimal amount with at most two fractional digits ("4", "4.5", "4.99").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || format!("Invalid price: '{}'", s);

        let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
        if whole.is_empty() || frac.len() > 2 {
            return Err(invalid());
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }

        let whole: i64 = whole.parse().map_err(|_| invalid())?;
        let frac: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>().map_err(|_| invalid())? * 10,
            _ => frac.parse().map_err(|_| invalid())?,
        };

        whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(frac))
            .map(Self)
            .ok_or_else(invalid)
    }
}

impl ToSql for Price {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0))
    }
}

impl FromSql for Price {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        i64::column_result(value).map(Self)
    }
}

/// Catalog entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    /// Book ID.
    pub id: String,
    /// Book title.
    pub title: String,
    /// Author's user ID.
    pub author_id: String,
    /// Author name as shown in the catalog.
    pub author_name: String,
    /// Book description.
    pub description: String,
    /// Genre.
    pub genre: String,
    /// Cover image URL.
    pub cover_url: String,
    /// Content location: an http(s) URL or a local file path.
    pub content_location: String,
    /// Page count.
    pub total_pages: i64,
    /// Price of a one-day rental.
    pub daily_price: Price,
    /// Price of a thirty-day rental.
    pub monthly_price: Price,
    /// Average rating.
    pub rating: f64,
    /// Number of rentals so far.
    pub rentals_count: i64,
    /// Creation timestamp.
    pub created_at: i64,
}

/// Rental period requested by the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RentalKind {
    /// One day.
    Daily,
    /// Thirty days.
    Monthly,
}

impl RentalKind {
    /// Interpret a submitted rental type. Anything but "daily" is a monthly rental.
    pub fn from_form(value: Option<&str>) -> Self {
        match value {
            Some("daily") => RentalKind::Daily,
            _ => RentalKind::Monthly,
        }
    }

    /// Rental length in days.
    pub fn days(self) -> i64 {
        match self {
            RentalKind::Daily => 1,
            RentalKind::Monthly => 30,
        }
    }

    /// Canonical name.
    pub fn as_str(self) -> &'static str {
        match self {
            RentalKind::Daily => "daily",
            RentalKind::Monthly => "monthly",
        }
    }
}

/// Rental lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RentalStatus {
    /// Rental is in effect.
    Active,
    /// Reader finished the book.
    Completed,
    /// Rental period ran out.
    Expired,
}

impl RentalStatus {
    /// Storage name.
    pub fn as_str(self) -> &'static str {
        match self {
            RentalStatus::Active => "active",
            RentalStatus::Completed => "completed",
            RentalStatus::Expired => "expired",
        }
    }
}

impl ToSql for RentalStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for RentalStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "active" => Ok(RentalStatus::Active),
            "completed" => Ok(RentalStatus::Completed),
            "expired" => Ok(RentalStatus::Expired),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

/// Time-boxed access grant to a book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rental {
    /// Rental ID.
    pub id: String,
    /// Renting user ID.
    pub user_id: String,
    /// Rented book ID.
    pub book_id: String,
    /// Rental type as submitted; see [`Rental::kind`].
    pub rental_type: String,
    /// Start timestamp.
    pub start_at: i64,
    /// End timestamp, fixed at creation.
    pub end_at: i64,
    /// Amount charged.
    pub price_paid: Price,
    /// Lifecycle state.
    pub status: RentalStatus,
    /// Creation timestamp.
    pub created_at: i64,
}

impl Rental {
    /// Period the rental was priced and timed for.
    pub fn kind(&self) -> RentalKind {
        RentalKind::from_form(Some(&self.rental_type))
    }

    /// Whether the rental period has run out at `now`.
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.end_at < now
    }
}

/// Reading position within one rental.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingProgress {
    /// Progress ID.
    pub id: String,
    /// User ID.
    pub user_id: String,
    /// Book ID.
    pub book_id: String,
    /// Rental ID.
    pub rental_id: String,
    /// Current page number.
    pub current_page: i64,
    /// Total pages, copied from the book at rental time.
    pub total_pages: i64,
    /// Last update timestamp.
    pub last_read_at: i64,
}

impl ReadingProgress {
    /// Reading percentage (0.0 - 100.0), clamped.
    pub fn percentage(&self) -> f64 {
        if self.total_pages <= 0 {
            return 0.0;
        }
        (self.current_page as f64 / self.total_pages as f64 * 100.0).clamp(0.0, 100.0)
    }
}

/// Favorited book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Favorite {
    /// Favorite ID.
    pub id: String,
    /// User ID.
    pub user_id: String,
    /// Book ID.
    pub book_id: String,
    /// Creation timestamp.
    pub created_at: i64,
}

/// A live rental joined with its book and progress, for the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentRead {
    /// The rental.
    pub rental: Rental,
    /// The rented book.
    pub book: Book,
    /// Progress, if the paired row exists.
    pub progress: Option<ReadingProgress>,
}

/// Timestamp helper.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Convert timestamp to DateTime.
pub fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now)
}

/// New random identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
