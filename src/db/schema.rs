use crate::db::*;
use crate::error::{AppError, Result};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::Arc;

const USER_COLUMNS: &str =
    "id, email, password_hash, name, picture, is_author, created_at, last_login";

const BOOK_COLUMNS: &str = "b.id, b.title, b.author_id, b.author_name, b.description, b.genre, \
     b.cover_url, b.content_location, b.total_pages, b.daily_price, b.monthly_price, b.rating, \
     b.rentals_count, b.created_at";

const RENTAL_COLUMNS: &str = "r.id, r.user_id, r.book_id, r.rental_type, r.start_at, r.end_at, \
     r.price_paid, r.status, r.created_at";

const PROGRESS_COLUMNS: &str =
    "p.id, p.user_id, p.book_id, p.rental_id, p.current_page, p.total_pages, p.last_read_at";

/// Database wrapper for thread-safe access.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

fn internal(context: &'static str) -> impl Fn(rusqlite::Error) -> AppError {
    move |e| AppError::Internal(format!("{}: {}", context, e))
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        name: row.get(3)?,
        picture: row.get(4)?,
        is_author: row.get(5)?,
        created_at: row.get(6)?,
        last_login: row.get(7)?,
    })
}

fn book_from_row(row: &Row, at: usize) -> rusqlite::Result<Book> {
    Ok(Book {
        id: row.get(at)?,
        title: row.get(at + 1)?,
        author_id: row.get(at + 2)?,
        author_name: row.get(at + 3)?,
        description: row.get(at + 4)?,
        genre: row.get(at + 5)?,
        cover_url: row.get(at + 6)?,
        content_location: row.get(at + 7)?,
        total_pages: row.get(at + 8)?,
        daily_price: row.get(at + 9)?,
        monthly_price: row.get(at + 10)?,
        rating: row.get(at + 11)?,
        rentals_count: row.get(at + 12)?,
        created_at: row.get(at + 13)?,
    })
}

fn rental_from_row(row: &Row, at: usize) -> rusqlite::Result<Rental> {
    Ok(Rental {
        id: row.get(at)?,
        user_id: row.get(at + 1)?,
        book_id: row.get(at + 2)?,
        rental_type: row.get(at + 3)?,
        start_at: row.get(at + 4)?,
        end_at: row.get(at + 5)?,
        price_paid: row.get(at + 6)?,
        status: row.get(at + 7)?,
        created_at: row.get(at + 8)?,
    })
}

fn progress_from_row(row: &Row, at: usize) -> rusqlite::Result<ReadingProgress> {
    Ok(ReadingProgress {
        id: row.get(at)?,
        user_id: row.get(at + 1)?,
        book_id: row.get(at + 2)?,
        rental_id: row.get(at + 3)?,
        current_page: row.get(at + 4)?,
        total_pages: row.get(at + 5)?,
        last_read_at: row.get(at + 6)?,
    })
}

impl Database {
    /// Open or create database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories if needed
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Open in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Internal(format!("Failed to open database: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_schema()?;
        Ok(db)
    }

    /// Initialize database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            -- Users table
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                name TEXT NOT NULL,
                picture TEXT,
                is_author INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                last_login INTEGER
            );

            -- Sessions table
            CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                expires_at INTEGER NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            -- Books table
            CREATE TABLE IF NOT EXISTS books (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                author_id TEXT NOT NULL,
                author_name TEXT NOT NULL,
                description TEXT NOT NULL,
                genre TEXT NOT NULL,
                cover_url TEXT NOT NULL,
                content_location TEXT NOT NULL,
                total_pages INTEGER NOT NULL CHECK (total_pages > 0),
                daily_price INTEGER NOT NULL CHECK (daily_price >= 0),
                monthly_price INTEGER NOT NULL CHECK (monthly_price >= 0),
                rating REAL NOT NULL DEFAULT 0.0,
                rentals_count INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE CASCADE
            );

            -- Rentals table
            CREATE TABLE IF NOT EXISTS rentals (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                book_id TEXT NOT NULL,
                rental_type TEXT NOT NULL,
                start_at INTEGER NOT NULL,
                end_at INTEGER NOT NULL,
                price_paid INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                created_at INTEGER NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE
            );

            -- Reading progress table (one row per rental)
            CREATE TABLE IF NOT EXISTS reading_progress (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                book_id TEXT NOT NULL,
                rental_id TEXT NOT NULL UNIQUE,
                current_page INTEGER NOT NULL DEFAULT 1,
                total_pages INTEGER NOT NULL,
                last_read_at INTEGER NOT NULL,
                UNIQUE (user_id, book_id, rental_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE,
                FOREIGN KEY (rental_id) REFERENCES rentals(id) ON DELETE CASCADE
            );

            -- Favorites table
            CREATE TABLE IF NOT EXISTS favorites (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                book_id TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                UNIQUE (user_id, book_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (book_id) REFERENCES books(id) ON DELETE CASCADE
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_books_genre ON books(genre);
            CREATE INDEX IF NOT EXISTS idx_books_created ON books(created_at);
            CREATE INDEX IF NOT EXISTS idx_rentals_user ON rentals(user_id, status, end_at);
            CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires ON sessions(expires_at);
            "#,
        )
        .map_err(internal("Failed to initialize schema"))?;

        Ok(())
    }

    // ========== USER OPERATIONS ==========

    /// Create a new user.
    pub fn create_user(&self, user: &User) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO users (id, email, password_hash, name, picture, is_author, created_at, last_login)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                user.id,
                user.email,
                user.password_hash,
                user.name,
                user.picture,
                user.is_author,
                user.created_at,
                user.last_login,
            ],
        )
        .map_err(|e| {
            if e.to_string().contains("UNIQUE constraint") {
                AppError::InvalidFormat(format!("Email '{}' is already registered", user.email))
            } else {
                AppError::Internal(format!("Failed to create user: {}", e))
            }
        })?;
        Ok(())
    }

    /// Get user by email.
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
            params![email],
            user_from_row,
        )
        .optional()
        .map_err(internal("Failed to get user"))
    }

    /// Get user by ID.
    pub fn get_user_by_id(&self, id: &str) -> Result<Option<User>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            params![id],
            user_from_row,
        )
        .optional()
        .map_err(internal("Failed to get user"))
    }

    /// Check whether an email is already registered.
    pub fn email_exists(&self, email: &str) -> Result<bool> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM users WHERE email = ?1)",
            params![email],
            |row| row.get(0),
        )
        .map_err(internal("Failed to check email"))
    }

    /// List all users.
    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!("SELECT {} FROM users ORDER BY email", USER_COLUMNS))
            .map_err(internal("Failed to prepare query"))?;

        let users = stmt
            .query_map([], user_from_row)
            .map_err(internal("Failed to list users"))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(internal("Failed to collect users"))?;

        Ok(users)
    }

    /// Update user password.
    pub fn update_user_password(&self, email: &str, password_hash: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE users SET password_hash = ?1 WHERE email = ?2",
                params![password_hash, email],
            )
            .map_err(internal("Failed to update password"))?;
        Ok(rows > 0)
    }

    /// Update user last login.
    pub fn update_user_last_login(&self, user_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE users SET last_login = ?1 WHERE id = ?2",
            params![now_timestamp(), user_id],
        )
        .map_err(internal("Failed to update last login"))?;
        Ok(())
    }

    /// Delete user.
    pub fn delete_user(&self, email: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute("DELETE FROM users WHERE email = ?1", params![email])
            .map_err(internal("Failed to delete user"))?;
        Ok(rows > 0)
    }

    // ========== SESSION OPERATIONS ==========

    /// Create session.
    pub fn create_session(&self, session: &Session) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sessions (token, user_id, expires_at) VALUES (?1, ?2, ?3)",
            params![session.token, session.user_id, session.expires_at],
        )
        .map_err(internal("Failed to create session"))?;
        Ok(())
    }

    /// Get session by token.
    pub fn get_session(&self, token: &str) -> Result<Option<Session>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT token, user_id, expires_at FROM sessions WHERE token = ?1",
            params![token],
            |row| {
                Ok(Session {
                    token: row.get(0)?,
                    user_id: row.get(1)?,
                    expires_at: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(internal("Failed to get session"))
    }

    /// Delete session.
    pub fn delete_session(&self, token: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])
            .map_err(internal("Failed to delete session"))?;
        Ok(())
    }

    /// Cleanup expired sessions.
    pub fn cleanup_expired_sessions(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "DELETE FROM sessions WHERE expires_at < ?1",
                params![now_timestamp()],
            )
            .map_err(internal("Failed to cleanup sessions"))?;
        Ok(rows)
    }

    // ========== BOOK OPERATIONS ==========

    /// Insert a book.
    pub fn create_book(&self, book: &Book) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO books (
                id, title, author_id, author_name, description, genre, cover_url,
                content_location, total_pages, daily_price, monthly_price, rating,
                rentals_count, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                book.id,
                book.title,
                book.author_id,
                book.author_name,
                book.description,
                book.genre,
                book.cover_url,
                book.content_location,
                book.total_pages,
                book.daily_price,
                book.monthly_price,
                book.rating,
                book.rentals_count,
                book.created_at,
            ],
        )
        .map_err(internal("Failed to create book"))?;
        Ok(())
    }

    /// Get book by ID.
    pub fn get_book(&self, id: &str) -> Result<Option<Book>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!("SELECT {} FROM books b WHERE b.id = ?1", BOOK_COLUMNS),
            params![id],
            |row| book_from_row(row, 0),
        )
        .optional()
        .map_err(internal("Failed to get book"))
    }

    /// List books, optionally restricted to one genre, ordered by title.
    pub fn list_books(&self, genre: Option<&str>) -> Result<Vec<Book>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM books b
                 WHERE ?1 IS NULL OR b.genre = ?1
                 ORDER BY b.title COLLATE NOCASE, b.id",
                BOOK_COLUMNS
            ))
            .map_err(internal("Failed to prepare query"))?;

        let books = stmt
            .query_map(params![genre], |row| book_from_row(row, 0))
            .map_err(internal("Failed to list books"))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(internal("Failed to collect books"))?;

        Ok(books)
    }

    /// Most recently added books.
    pub fn recent_books(&self, limit: usize) -> Result<Vec<Book>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM books b ORDER BY b.created_at DESC, b.rowid DESC LIMIT ?1",
                BOOK_COLUMNS
            ))
            .map_err(internal("Failed to prepare query"))?;

        let books = stmt
            .query_map(params![limit as i64], |row| book_from_row(row, 0))
            .map_err(internal("Failed to get recent books"))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(internal("Failed to collect books"))?;

        Ok(books)
    }

    /// Distinct genres, alphabetically. `limit` caps the count.
    pub fn list_genres(&self, limit: Option<usize>) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let limit = limit.map(|l| l as i64).unwrap_or(-1);
        let mut stmt = conn
            .prepare("SELECT DISTINCT genre FROM books ORDER BY genre LIMIT ?1")
            .map_err(internal("Failed to prepare query"))?;

        let genres: Vec<String> = stmt
            .query_map(params![limit], |row| row.get(0))
            .map_err(internal("Failed to list genres"))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(internal("Failed to collect genres"))?;

        Ok(genres)
    }

    /// Bump a book's rental counter.
    pub fn increment_rentals_count(&self, book_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE books SET rentals_count = rentals_count + 1 WHERE id = ?1",
            params![book_id],
        )
        .map_err(internal("Failed to update rental count"))?;
        Ok(())
    }

    /// Delete book.
    pub fn delete_book(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute("DELETE FROM books WHERE id = ?1", params![id])
            .map_err(internal("Failed to delete book"))?;
        Ok(rows > 0)
    }

    // ========== RENTAL OPERATIONS ==========

    /// Insert a rental.
    pub fn create_rental(&self, rental: &Rental) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO rentals (id, user_id, book_id, rental_type, start_at, end_at, price_paid, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                rental.id,
                rental.user_id,
                rental.book_id,
                rental.rental_type,
                rental.start_at,
                rental.end_at,
                rental.price_paid,
                rental.status,
                rental.created_at,
            ],
        )
        .map_err(internal("Failed to create rental"))?;
        Ok(())
    }

    /// Get a rental only if it belongs to the given user.
    pub fn get_user_rental(&self, rental_id: &str, user_id: &str) -> Result<Option<Rental>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!(
                "SELECT {} FROM rentals r WHERE r.id = ?1 AND r.user_id = ?2",
                RENTAL_COLUMNS
            ),
            params![rental_id, user_id],
            |row| rental_from_row(row, 0),
        )
        .optional()
        .map_err(internal("Failed to get rental"))
    }

    /// Active, unexpired rentals of a user with their book and progress.
    pub fn current_reads(&self, user_id: &str, now: i64) -> Result<Vec<CurrentRead>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {}, {}, {}
                 FROM rentals r
                 JOIN books b ON b.id = r.book_id
                 LEFT JOIN reading_progress p ON p.rental_id = r.id
                 WHERE r.user_id = ?1 AND r.status = ?2 AND r.end_at >= ?3
                 ORDER BY r.start_at DESC",
                RENTAL_COLUMNS, BOOK_COLUMNS, PROGRESS_COLUMNS
            ))
            .map_err(internal("Failed to prepare query"))?;

        let reads = stmt
            .query_map(params![user_id, RentalStatus::Active, now], |row| {
                let progress_id: Option<String> = row.get(23)?;
                Ok(CurrentRead {
                    rental: rental_from_row(row, 0)?,
                    book: book_from_row(row, 9)?,
                    progress: match progress_id {
                        Some(_) => Some(progress_from_row(row, 23)?),
                        None => None,
                    },
                })
            })
            .map_err(internal("Failed to get current reads"))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(internal("Failed to collect current reads"))?;

        Ok(reads)
    }

    // ========== PROGRESS OPERATIONS ==========

    /// Insert a progress row.
    pub fn create_progress(&self, progress: &ReadingProgress) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO reading_progress (id, user_id, book_id, rental_id, current_page, total_pages, last_read_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                progress.id,
                progress.user_id,
                progress.book_id,
                progress.rental_id,
                progress.current_page,
                progress.total_pages,
                progress.last_read_at,
            ],
        )
        .map_err(internal("Failed to create progress"))?;
        Ok(())
    }

    /// Get the progress row of a rental.
    pub fn get_rental_progress(&self, rental_id: &str) -> Result<Option<ReadingProgress>> {
        let conn = self.conn.lock();
        conn.query_row(
            &format!(
                "SELECT {} FROM reading_progress p WHERE p.rental_id = ?1",
                PROGRESS_COLUMNS
            ),
            params![rental_id],
            |row| progress_from_row(row, 0),
        )
        .optional()
        .map_err(internal("Failed to get progress"))
    }

    /// Set the current page of a rental owned by `user_id`. Returns affected rows.
    pub fn update_progress(
        &self,
        rental_id: &str,
        user_id: &str,
        current_page: i64,
        read_at: i64,
    ) -> Result<usize> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE reading_progress SET current_page = ?1, last_read_at = ?2
             WHERE rental_id = ?3 AND user_id = ?4",
            params![current_page, read_at, rental_id, user_id],
        )
        .map_err(internal("Failed to update progress"))
    }

    // ========== FAVORITE OPERATIONS ==========

    /// Get the favorite row for a (user, book) pair.
    pub fn get_favorite(&self, user_id: &str, book_id: &str) -> Result<Option<Favorite>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, user_id, book_id, created_at FROM favorites
             WHERE user_id = ?1 AND book_id = ?2",
            params![user_id, book_id],
            |row| {
                Ok(Favorite {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    book_id: row.get(2)?,
                    created_at: row.get(3)?,
                })
            },
        )
        .optional()
        .map_err(internal("Failed to get favorite"))
    }

    /// Insert a favorite.
    pub fn create_favorite(&self, favorite: &Favorite) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO favorites (id, user_id, book_id, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                favorite.id,
                favorite.user_id,
                favorite.book_id,
                favorite.created_at
            ],
        )
        .map_err(internal("Failed to create favorite"))?;
        Ok(())
    }

    /// Delete a favorite by ID.
    pub fn delete_favorite(&self, id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute("DELETE FROM favorites WHERE id = ?1", params![id])
            .map_err(internal("Failed to delete favorite"))?;
        Ok(rows > 0)
    }

    /// Favorite books of a user, newest first.
    pub fn user_favorite_books(&self, user_id: &str) -> Result<Vec<Book>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM favorites f JOIN books b ON b.id = f.book_id
                 WHERE f.user_id = ?1 ORDER BY f.created_at DESC, f.rowid DESC",
                BOOK_COLUMNS
            ))
            .map_err(internal("Failed to prepare query"))?;

        let books = stmt
            .query_map(params![user_id], |row| book_from_row(row, 0))
            .map_err(internal("Failed to get favorites"))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(internal("Failed to collect favorites"))?;

        Ok(books)
    }
}
