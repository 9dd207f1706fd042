use crate::db::{Book, Database, Price, new_id, now_timestamp};
use crate::error::{AppError, Result};
use serde::Deserialize;

/// Catalog filter as submitted by the search form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogQuery {
    /// Free text matched against title and author name.
    pub search: Option<String>,
    /// Exact genre.
    pub genre: Option<String>,
}

impl CatalogQuery {
    /// Search text, if any was given.
    pub fn search_text(&self) -> Option<&str> {
        self.search.as_deref().filter(|s| !s.is_empty())
    }

    /// Genre filter, if any was given.
    pub fn genre_filter(&self) -> Option<&str> {
        self.genre.as_deref().filter(|g| !g.is_empty())
    }
}

/// Books matching the query. Text matches title OR author name case-insensitively,
/// genre must match exactly, and both filters combine with AND.
pub fn search_books(db: &Database, query: &CatalogQuery) -> Result<Vec<Book>> {
    let books = db.list_books(query.genre_filter())?;

    let Some(text) = query.search_text() else {
        return Ok(books);
    };

    let needle = text.to_lowercase();
    Ok(books
        .into_iter()
        .filter(|book| matches_text(book, &needle))
        .collect())
}

/// Whether `needle` (already lowercased) occurs in the book's title or author name.
fn matches_text(book: &Book, needle: &str) -> bool {
    book.title.to_lowercase().contains(needle) || book.author_name.to_lowercase().contains(needle)
}

/// Book to be added to the catalog.
#[derive(Debug, Clone)]
pub struct NewBook {
    /// Title.
    pub title: String,
    /// Email of the author account.
    pub author_email: String,
    /// Displayed author name; the account name when absent.
    pub author_name: Option<String>,
    /// Description.
    pub description: String,
    /// Genre.
    pub genre: String,
    /// Cover image URL.
    pub cover_url: String,
    /// Content path or URL.
    pub content_location: String,
    /// Page count.
    pub total_pages: i64,
    /// One-day price.
    pub daily_price: Price,
    /// Thirty-day price.
    pub monthly_price: Price,
}

/// Validate and insert a book owned by an author account.
pub fn add_book(db: &Database, new: NewBook) -> Result<Book> {
    if new.title.trim().is_empty() {
        return Err(AppError::InvalidFormat("Title must not be empty".to_string()));
    }
    if new.genre.trim().is_empty() {
        return Err(AppError::InvalidFormat("Genre must not be empty".to_string()));
    }
    if new.total_pages <= 0 {
        return Err(AppError::InvalidFormat(
            "Page count must be greater than zero".to_string(),
        ));
    }

    let author = db
        .get_user_by_email(&new.author_email)?
        .ok_or_else(|| AppError::NotFound(format!("User not found: {}", new.author_email)))?;

    if !author.is_author {
        return Err(AppError::InvalidFormat(format!(
            "{} is not an author account",
            author.email
        )));
    }

    let book = Book {
        id: new_id(),
        title: new.title,
        author_id: author.id,
        author_name: new.author_name.unwrap_or(author.name),
        description: new.description,
        genre: new.genre,
        cover_url: new.cover_url,
        content_location: new.content_location,
        total_pages: new.total_pages,
        daily_price: new.daily_price,
        monthly_price: new.monthly_price,
        rating: 0.0,
        rentals_count: 0,
        created_at: now_timestamp(),
    };

    db.create_book(&book)?;
    tracing::info!(book_id = %book.id, title = %book.title, "Book added to catalog");
    Ok(book)
}
