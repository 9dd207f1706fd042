use crate::db::{
    Book, Database, Price, ReadingProgress, Rental, RentalKind, RentalStatus, SECONDS_PER_DAY,
    new_id, now_timestamp,
};
use crate::error::{AppError, Result};

/// Expiry and price derived from a book and a rental kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RentalTerms {
    /// Rental period.
    pub kind: RentalKind,
    /// Start timestamp.
    pub start_at: i64,
    /// End timestamp.
    pub end_at: i64,
    /// Amount charged.
    pub price: Price,
}

impl RentalTerms {
    /// Terms for renting `book` for `kind` starting at `start_at`.
    pub fn for_book(book: &Book, kind: RentalKind, start_at: i64) -> Self {
        let price = match kind {
            RentalKind::Daily => book.daily_price,
            RentalKind::Monthly => book.monthly_price,
        };

        Self {
            kind,
            start_at,
            end_at: start_at + kind.days() * SECONDS_PER_DAY,
            price,
        }
    }
}

/// Rent a book now. See [`rent_book_at`].
pub fn rent_book(
    db: &Database,
    user_id: &str,
    book_id: &str,
    rental_type: &str,
) -> Result<(Rental, ReadingProgress)> {
    rent_book_at(db, user_id, book_id, rental_type, now_timestamp())
}

/// Create a rental, its progress row at page 1, and bump the book's rental counter.
///
/// `rental_type` is stored as submitted; anything but `"daily"` is priced and
/// timed as a monthly rental.
///
/// The three writes are separate statements: a failure part way leaves the
/// earlier rows in place.
pub fn rent_book_at(
    db: &Database,
    user_id: &str,
    book_id: &str,
    rental_type: &str,
    now: i64,
) -> Result<(Rental, ReadingProgress)> {
    let book = db
        .get_book(book_id)?
        .ok_or_else(|| AppError::NotFound(format!("Book not found: {}", book_id)))?;

    let terms = RentalTerms::for_book(&book, RentalKind::from_form(Some(rental_type)), now);

    let rental = Rental {
        id: new_id(),
        user_id: user_id.to_string(),
        book_id: book.id.clone(),
        rental_type: rental_type.to_string(),
        start_at: terms.start_at,
        end_at: terms.end_at,
        price_paid: terms.price,
        status: RentalStatus::Active,
        created_at: now,
    };
    db.create_rental(&rental)?;

    let progress = ReadingProgress {
        id: new_id(),
        user_id: user_id.to_string(),
        book_id: book.id.clone(),
        rental_id: rental.id.clone(),
        current_page: 1,
        total_pages: book.total_pages,
        last_read_at: now,
    };
    db.create_progress(&progress)?;

    db.increment_rentals_count(&book.id)?;

    tracing::info!(
        rental_id = %rental.id,
        user_id,
        book_id = %book.id,
        rental_type,
        kind = terms.kind.as_str(),
        price = %rental.price_paid,
        "Book rented"
    );

    Ok((rental, progress))
}
