//! bookly server entry point.

use bookly::{
    auth::AuthService,
    config::{BookCommand, Cli, Command, Config, UserCommand},
    db::{Database, Price, timestamp_to_datetime},
    library::{NewBook, catalog},
    server,
};
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Find or load config
    let config_path = cli.config.clone().or_else(Config::find_config_file);

    let config = if let Some(ref path) = config_path {
        Config::load(path)?
    } else {
        Config::default()
    };

    match cli.command {
        Some(Command::Init { force }) => cmd_init(force),
        Some(Command::User { action }) => cmd_user(action, &config),
        Some(Command::Book { action }) => cmd_book(action, &config),
        Some(Command::Serve { bind }) => cmd_serve(config, bind).await,
        None => cmd_serve(config, None).await,
    }
}

/// Initialize config and database.
fn cmd_init(force: bool) -> anyhow::Result<()> {
    let config_path = PathBuf::from("config.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    std::fs::write(&config_path, Config::generate_default())?;
    println!("Created config file: {}", config_path.display());

    let config = Config::default();
    let _db = Database::open(&config.database.path)?;
    println!("Initialized database: {}", config.database.path.display());

    println!("\nEdit config.toml to configure your server.");
    println!("Then run: bookly user add <email> --name <name> --author");
    println!("And: bookly book add --title ... --author <email> ...");

    Ok(())
}

/// User management commands.
fn cmd_user(action: UserCommand, config: &Config) -> anyhow::Result<()> {
    let db = Database::open(&config.database.path)?;
    let auth = AuthService::new(
        db,
        config.auth.session_days,
        config.auth.registration_enabled(),
    );

    match action {
        UserCommand::Add {
            email,
            name,
            password,
            author,
        } => {
            let password = match password {
                Some(p) => p,
                None => prompt_password("Password: ")?,
            };

            let user = auth.create_user(&email, &name, &password, author)?;
            println!(
                "Created user: {} (author: {}, id: {})",
                user.email,
                if user.is_author { "yes" } else { "no" },
                user.id
            );
        }

        UserCommand::Del { email } => {
            if auth.delete_user(&email)? {
                println!("Deleted user: {}", email);
            } else {
                println!("User not found: {}", email);
            }
        }

        UserCommand::List => {
            let users = auth.list_users()?;
            if users.is_empty() {
                println!("No users found.");
            } else {
                println!("{:<32} {:<20} {:<7} LAST LOGIN", "EMAIL", "NAME", "AUTHOR");
                println!("{}", "-".repeat(80));
                for user in users {
                    let last_login = user
                        .last_login
                        .map(|ts| timestamp_to_datetime(ts).format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "never".to_string());
                    println!(
                        "{:<32} {:<20} {:<7} {}",
                        user.email,
                        user.name,
                        if user.is_author { "yes" } else { "no" },
                        last_login
                    );
                }
            }
        }

        UserCommand::Passwd { email, password } => {
            let password = match password {
                Some(p) => p,
                None => prompt_password("New password: ")?,
            };

            if auth.change_password(&email, &password)? {
                println!("Password changed for: {}", email);
            } else {
                println!("User not found: {}", email);
            }
        }
    }

    Ok(())
}

/// Catalog management commands.
fn cmd_book(action: BookCommand, config: &Config) -> anyhow::Result<()> {
    let db = Database::open(&config.database.path)?;

    match action {
        BookCommand::Add {
            title,
            author,
            author_name,
            genre,
            description,
            cover,
            content,
            pages,
            daily_price,
            monthly_price,
        } => {
            let daily_price: Price = daily_price.parse().map_err(anyhow::Error::msg)?;
            let monthly_price: Price = monthly_price.parse().map_err(anyhow::Error::msg)?;

            let book = catalog::add_book(
                &db,
                NewBook {
                    title,
                    author_email: author,
                    author_name,
                    description,
                    genre,
                    cover_url: cover,
                    content_location: content,
                    total_pages: pages,
                    daily_price,
                    monthly_price,
                },
            )?;
            println!("Added book: {} (id: {})", book.title, book.id);
        }

        BookCommand::Del { id } => {
            if db.delete_book(&id)? {
                println!("Deleted book: {}", id);
            } else {
                println!("Book not found: {}", id);
            }
        }

        BookCommand::List => {
            let books = db.list_books(None)?;
            if books.is_empty() {
                println!("No books found.");
            } else {
                println!(
                    "{:<36} {:<30} {:<15} {:>8} {:>8} RENTALS",
                    "ID", "TITLE", "GENRE", "DAILY", "MONTHLY"
                );
                println!("{}", "-".repeat(115));
                for book in books {
                    println!(
                        "{:<36} {:<30} {:<15} {:>8} {:>8} {}",
                        book.id,
                        book.title,
                        book.genre,
                        book.daily_price.to_string(),
                        book.monthly_price.to_string(),
                        book.rentals_count
                    );
                }
            }
        }
    }

    Ok(())
}

/// Start the server.
async fn cmd_serve(mut config: Config, bind: Option<std::net::SocketAddr>) -> anyhow::Result<()> {
    if let Some(addr) = bind {
        config.server.bind = addr;
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bookly=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db = Database::open(&config.database.path)?;

    let removed = db.cleanup_expired_sessions()?;
    if removed > 0 {
        tracing::info!(removed, "Removed expired sessions");
    }

    tracing::info!(
        bind = %config.server.bind,
        database = %config.database.path.display(),
        registration = %config.auth.registration,
        "Starting bookly server"
    );

    let bind_addr = config.server.bind;
    let state = server::AppState::from_config(config, db);
    let app = server::create_router(state);

    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!(address = %bind_addr, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Prompt for password input.
fn prompt_password(prompt: &str) -> anyhow::Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut password = String::new();
    io::stdin().read_line(&mut password)?;

    Ok(password.trim().to_string())
}
