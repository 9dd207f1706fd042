use crate::db::{Book, Database, Rental};
use crate::error::{AppError, Result};
use std::path::{Path, PathBuf};

/// Where a book's readable content lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSource {
    /// Hosted elsewhere; the reader is redirected.
    Remote(String),
    /// File on the server's disk; streamed to the reader.
    Local(PathBuf),
}

impl ContentSource {
    /// Classify a stored content location.
    pub fn resolve(location: &str) -> Self {
        let lower = location.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            ContentSource::Remote(location.to_string())
        } else {
            ContentSource::Local(PathBuf::from(location))
        }
    }
}

/// Content formats the reader can display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentFormat {
    /// PDF document.
    Pdf,
    /// EPUB publication.
    Epub,
    /// Plain text.
    Txt,
    /// HTML document.
    Html,
    /// Markdown.
    Md,
}

impl ContentFormat {
    /// Get the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            ContentFormat::Pdf => "application/pdf",
            ContentFormat::Epub => "application/epub+zip",
            ContentFormat::Txt => "text/plain; charset=utf-8",
            ContentFormat::Html => "text/html; charset=utf-8",
            ContentFormat::Md => "text/markdown; charset=utf-8",
        }
    }

    /// Try to detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(ContentFormat::Pdf),
            "epub" => Some(ContentFormat::Epub),
            "txt" => Some(ContentFormat::Txt),
            "html" | "htm" => Some(ContentFormat::Html),
            "md" | "markdown" => Some(ContentFormat::Md),
            _ => None,
        }
    }

    /// MIME type for a file path, `application/octet-stream` when unknown.
    pub fn mime_for_path(path: &Path) -> &'static str {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
            .map(|f| f.mime_type())
            .unwrap_or("application/octet-stream")
    }
}

/// Look up a rental for content access: it must belong to `user_id` and still be running.
pub fn readable_rental(
    db: &Database,
    rental_id: &str,
    user_id: &str,
    now: i64,
) -> Result<(Rental, Book)> {
    let rental = db
        .get_user_rental(rental_id, user_id)?
        .ok_or_else(|| AppError::NotFound(format!("Rental not found: {}", rental_id)))?;

    if rental.is_expired_at(now) {
        return Err(AppError::Forbidden("Rental has expired".to_string()));
    }

    let book = db
        .get_book(&rental.book_id)?
        .ok_or_else(|| AppError::NotFound(format!("Book not found: {}", rental.book_id)))?;

    Ok((rental, book))
}
