//! Server-rendered HTML pages.

use crate::db::{Book, CurrentRead, ReadingProgress, Rental, User, timestamp_to_datetime};
use crate::library::CatalogQuery;
use crate::server::session::Flash;
use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; max-width: 960px; margin: 0 auto; padding: 0 1rem 2rem; color: #222; }
header { display: flex; align-items: center; justify-content: space-between; padding: 1rem 0; border-bottom: 1px solid #ddd; }
header nav a, header nav button { margin-left: 1rem; }
a { color: #0066cc; }
.flash { padding: 0.75rem 1rem; border-radius: 6px; margin: 1rem 0; }
.flash.success { background: #e6f4ea; }
.flash.info { background: #e8f0fe; }
.flash.error { background: #fce8e6; }
.grid { display: grid; grid-template-columns: repeat(auto-fill, minmax(180px, 1fr)); gap: 1rem; }
.card { background: #f7f7f7; border-radius: 8px; padding: 0.75rem; }
.card img { width: 100%; aspect-ratio: 2 / 3; object-fit: cover; border-radius: 4px; background: #ddd; }
.muted { color: #666; font-size: 0.9rem; }
progress { width: 100%; }
form.inline { display: inline; }
iframe.content { width: 100%; height: 75vh; border: 1px solid #ddd; border-radius: 6px; }
"#;

/// Posts page changes to the progress endpoint; reads its wiring from `#reader` data attributes.
const READER_SCRIPT: &str = r#"
(function () {
  const reader = document.getElementById('reader');
  const rentalId = reader.dataset.rental;
  const total = parseInt(reader.dataset.total, 10);
  const input = document.getElementById('page');
  const status = document.getElementById('save-status');

  function save(page) {
    fetch('/progress/update/' + rentalId + '/', {
      method: 'POST',
      credentials: 'same-origin',
      headers: { 'Content-Type': 'application/json' },
      body: JSON.stringify({ current_page: page })
    })
      .then(function (r) { return r.json(); })
      .then(function (data) {
        status.textContent = data.status === 'success' ? 'Saved' : ('Error: ' + data.message);
      })
      .catch(function () { status.textContent = 'Offline'; });
  }

  function go(delta) {
    let page = parseInt(input.value, 10) + delta;
    if (page < 1) { page = 1; }
    if (page > total) { page = total; }
    input.value = page;
    save(page);
  }

  document.getElementById('prev').addEventListener('click', function () { go(-1); });
  document.getElementById('next').addEventListener('click', function () { go(1); });
  input.addEventListener('change', function () { go(0); });
})();
"#;

fn layout(site: &str, title: &str, user: Option<&User>, flash: Option<&Flash>, body: &str) -> String {
    let nav = match user {
        Some(user) => format!(
            r#"<a href="/dashboard/">Dashboard</a><a href="/catalog/">Catalog</a>
        <span class="muted">{name}</span>
        <form class="inline" method="post" action="/logout/"><button type="submit">Log out</button></form>"#,
            name = text(&user.name),
        ),
        None => r#"<a href="/login/">Log in</a><a href="/register/">Sign up</a>"#.to_string(),
    };

    let flash = flash
        .map(|f| {
            format!(
                r#"<div class="flash {level}">{message}</div>"#,
                level = f.level.as_str(),
                message = text(&f.message),
            )
        })
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{title} · {site}</title>
    <style>{style}</style>
</head>
<body>
    <header>
        <a href="/"><strong>{site}</strong></a>
        <nav>{nav}</nav>
    </header>
    {flash}
    {body}
</body>
</html>"#,
        title = text(title),
        site = text(site),
        style = STYLE,
        nav = nav,
        flash = flash,
        body = body,
    )
}

fn book_card(book: &Book) -> String {
    format!(
        r#"<div class="card">
    <a href="/book/{id}/"><img src="{cover}" alt="{title_attr}"></a>
    <div><a href="/book/{id}/">{title}</a></div>
    <div class="muted">{author} · {genre}</div>
</div>"#,
        id = attr(&book.id),
        cover = attr(&book.cover_url),
        title_attr = attr(&book.title),
        title = text(&book.title),
        author = text(&book.author_name),
        genre = text(&book.genre),
    )
}

fn book_grid(books: &[Book], empty: &str) -> String {
    if books.is_empty() {
        return format!(r#"<p class="muted">{}</p>"#, text(empty));
    }
    let cards: String = books.iter().map(book_card).collect();
    format!(r#"<div class="grid">{}</div>"#, cards)
}

fn format_date(ts: i64) -> String {
    timestamp_to_datetime(ts).format("%Y-%m-%d %H:%M UTC").to_string()
}

/// Landing page for anonymous visitors.
pub fn landing(site: &str, flash: Option<&Flash>) -> String {
    let body = format!(
        r#"<h1>Rent books, read them anywhere</h1>
<p>{site} lets you rent a book for a day or a month and read it right in your browser.
Your place is saved as you read.</p>
<p><a href="/register/">Create an account</a> or <a href="/login/">log in</a>.</p>"#,
        site = text(site),
    );
    layout(site, "Welcome", None, flash, &body)
}

/// Login form.
pub fn login(site: &str, flash: Option<&Flash>, next: Option<&str>) -> String {
    let next = next
        .map(|n| format!(r#"<input type="hidden" name="next" value="{}">"#, attr(n)))
        .unwrap_or_default();
    let body = format!(
        r#"<h1>Log in</h1>
<form method="post" action="/login/">
    {next}
    <p><label>Email <input type="email" name="email" required></label></p>
    <p><label>Password <input type="password" name="password" required></label></p>
    <p><button type="submit">Log in</button></p>
</form>
<p class="muted">No account yet? <a href="/register/">Sign up</a>.</p>"#,
    );
    layout(site, "Log in", None, flash, &body)
}

/// Registration form.
pub fn register(site: &str, flash: Option<&Flash>) -> String {
    let body = r#"<h1>Sign up</h1>
<form method="post" action="/register/">
    <p><label>Name <input type="text" name="name" required></label></p>
    <p><label>Email <input type="email" name="email" required></label></p>
    <p><label>Password <input type="password" name="password" required></label></p>
    <p><button type="submit">Create account</button></p>
</form>
<p class="muted">Already registered? <a href="/login/">Log in</a>.</p>"#;
    layout(site, "Sign up", None, flash, body)
}

/// Dashboard of a signed-in reader.
pub fn dashboard(
    site: &str,
    user: &User,
    flash: Option<&Flash>,
    reads: &[CurrentRead],
    recommended: &[Book],
    favorites: &[Book],
    genres: &[String],
) -> String {
    let reading = if reads.is_empty() {
        r#"<p class="muted">Nothing rented right now. Browse the <a href="/catalog/">catalog</a>.</p>"#
            .to_string()
    } else {
        let items: String = reads
            .iter()
            .map(|read| {
                let (page, total, pct) = match &read.progress {
                    Some(p) => (p.current_page, p.total_pages, p.percentage()),
                    None => (1, read.book.total_pages, 0.0),
                };
                format!(
                    r#"<div class="card">
    <a href="/reader/{rental}/">{title}</a>
    <div class="muted">{author}</div>
    <progress max="100" value="{pct:.0}"></progress>
    <div class="muted">Page {page} of {total} · until {until}</div>
</div>"#,
                    rental = attr(&read.rental.id),
                    title = text(&read.book.title),
                    author = text(&read.book.author_name),
                    pct = pct,
                    page = page,
                    total = total,
                    until = format_date(read.rental.end_at),
                )
            })
            .collect();
        format!(r#"<div class="grid">{}</div>"#, items)
    };

    let genre_links: String = genres
        .iter()
        .map(|g| {
            format!(
                r#"<a href="/catalog/?genre={q}">{name}</a> "#,
                q = attr(&urlencoding::encode(g)),
                name = text(g),
            )
        })
        .collect();

    let body = format!(
        r#"<h1>Hello, {name}</h1>
<h2>Currently reading</h2>
{reading}
<h2>New in the catalog</h2>
{recommended}
<h2>Your favorites</h2>
{favorites}
<h2>Genres</h2>
<p>{genres}</p>"#,
        name = text(&user.name),
        reading = reading,
        recommended = book_grid(recommended, "The catalog is empty."),
        favorites = book_grid(favorites, "No favorites yet."),
        genres = genre_links,
    );
    layout(site, "Dashboard", Some(user), flash, &body)
}

/// Catalog with search and genre filter.
pub fn catalog(
    site: &str,
    user: &User,
    flash: Option<&Flash>,
    books: &[Book],
    genres: &[String],
    query: &CatalogQuery,
) -> String {
    let selected = query.genre_filter().unwrap_or("");
    let options: String = genres
        .iter()
        .map(|g| {
            format!(
                r#"<option value="{value}"{sel}>{name}</option>"#,
                value = attr(g),
                sel = if g == selected { " selected" } else { "" },
                name = text(g),
            )
        })
        .collect();

    let body = format!(
        r#"<h1>Catalog</h1>
<form method="get" action="/catalog/">
    <input type="search" name="search" placeholder="Title or author" value="{search}">
    <select name="genre"><option value="">All genres</option>{options}</select>
    <button type="submit">Search</button>
</form>
<p class="muted">{count} book(s)</p>
{grid}"#,
        search = attr(query.search_text().unwrap_or("")),
        options = options,
        count = books.len(),
        grid = book_grid(books, "No books match your search."),
    );
    layout(site, "Catalog", Some(user), flash, &body)
}

/// Book details with rent and favorite forms.
pub fn book_details(
    site: &str,
    user: &User,
    flash: Option<&Flash>,
    book: &Book,
    is_favorite: bool,
) -> String {
    let body = format!(
        r#"<h1>{title}</h1>
<div class="grid">
    <div><img src="{cover}" alt="{title_attr}" style="width:100%"></div>
    <div style="grid-column: span 3">
        <p class="muted">{author} · {genre} · {pages} pages · rented {rentals} time(s) · rating {rating:.1}</p>
        <p>{description}</p>
        <form method="post" action="/rent/">
            <input type="hidden" name="book_id" value="{id}">
            <label><input type="radio" name="rental_type" value="daily" checked> One day: {daily}</label>
            <label><input type="radio" name="rental_type" value="monthly"> Thirty days: {monthly}</label>
            <button type="submit">Rent</button>
        </form>
        <form method="post" action="/favorite/">
            <input type="hidden" name="book_id" value="{id}">
            <button type="submit">{favorite}</button>
        </form>
    </div>
</div>"#,
        title = text(&book.title),
        title_attr = attr(&book.title),
        cover = attr(&book.cover_url),
        author = text(&book.author_name),
        genre = text(&book.genre),
        pages = book.total_pages,
        rentals = book.rentals_count,
        rating = book.rating,
        description = text(&book.description),
        id = attr(&book.id),
        daily = book.daily_price,
        monthly = book.monthly_price,
        favorite = if is_favorite {
            "Remove from favorites"
        } else {
            "Add to favorites"
        },
    );
    layout(site, &book.title, Some(user), flash, &body)
}

/// In-browser reader for one rental.
pub fn reader(
    site: &str,
    user: &User,
    flash: Option<&Flash>,
    rental: &Rental,
    progress: &ReadingProgress,
    book: &Book,
) -> String {
    let body = format!(
        r#"<h1>{title}</h1>
<p class="muted">{author} · rented until {until}</p>
<main id="reader" data-rental="{rental}" data-total="{total}">
    <iframe class="content" src="/reader/{rental}/content" title="{title_attr}"></iframe>
    <p>
        <button id="prev" type="button">Previous</button>
        Page <input id="page" type="number" min="1" max="{total}" value="{page}"> of {total}
        <button id="next" type="button">Next</button>
        <span id="save-status" class="muted"></span>
    </p>
</main>
<script>{script}</script>"#,
        title = text(&book.title),
        title_attr = attr(&book.title),
        author = text(&book.author_name),
        until = format_date(rental.end_at),
        rental = attr(&rental.id),
        total = progress.total_pages,
        page = progress.current_page,
        script = READER_SCRIPT,
    );
    layout(site, &book.title, Some(user), flash, &body)
}
