use crate::db::{Database, Favorite, new_id, now_timestamp};
use crate::error::{AppError, Result};

/// Outcome of a favorite toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    /// The book was added to favorites.
    Added,
    /// The book was removed from favorites.
    Removed,
}

/// Add the book to the user's favorites, or remove it if already there.
pub fn toggle_favorite(db: &Database, user_id: &str, book_id: &str) -> Result<Toggle> {
    if db.get_book(book_id)?.is_none() {
        return Err(AppError::NotFound(format!("Book not found: {}", book_id)));
    }

    let outcome = match db.get_favorite(user_id, book_id)? {
        Some(existing) => {
            db.delete_favorite(&existing.id)?;
            Toggle::Removed
        }
        None => {
            db.create_favorite(&Favorite {
                id: new_id(),
                user_id: user_id.to_string(),
                book_id: book_id.to_string(),
                created_at: now_timestamp(),
            })?;
            Toggle::Added
        }
    };

    tracing::debug!(user_id, book_id, ?outcome, "Favorite toggled");
    Ok(outcome)
}

/// Whether the user has favorited the book.
pub fn is_favorite(db: &Database, user_id: &str, book_id: &str) -> Result<bool> {
    Ok(db.get_favorite(user_id, book_id)?.is_some())
}
