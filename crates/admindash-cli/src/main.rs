//! Admindash CLI - command-line front end for the admin dashboard.
//!
//! Drives the core library directly: sign in, look at dashboard metrics and
//! browse the user directory. Session and theme persist between runs in the
//! platform data directory (or `ADMINDASH_STORAGE_DIR`).

use std::io;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use admindash_core::models::{
    ActivityLog, DashboardStats, LoginCredentials, PaginatedResponse, SortOrder, UserFilters, UserListItem,
    UserRole, UserStatus,
};
use admindash_core::routes::{self, MemoryNavigator};
use admindash_core::storage::{FileStorage, StorageBackend};
use admindash_core::utils::{format_currency, format_number, format_percentage, truncate};
use admindash_core::{App, Config, Theme};

// ============================================================================
// Constants
// ============================================================================

const USAGE: &str = "\
Usage: admindash <command> [args]

Commands:
  login <email> [password]   Sign in (prompts for the password if omitted)
  logout                     Sign out and forget the stored session
  whoami                     Show the signed-in user
  stats                      Dashboard statistics
  activity                   Recent activity
  users [options]            List users
      --search <text>  --role <ADMIN|USER|MANAGER>  --status <active|inactive|suspended>
      --page <n>  --page-size <n>  --sort <column>  --desc
  user <id>                  Show one user
  theme [light|dark|toggle]  Show or change the theme
  status                     Configuration, session and cache summary

Options:
  --json                     Print results as JSON

Environment:
  ADMINDASH_API_BASE_URL, ADMINDASH_ENABLE_MOCK_API, ADMINDASH_APP_NAME,
  ADMINDASH_STORAGE_DIR, RUST_LOG";

/// Column width for names in tables.
const NAME_WIDTH: usize = 24;

/// Column width for emails in tables.
const EMAIL_WIDTH: usize = 28;

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let json = take_flag(&mut args, "--json");
    let Some((command, rest)) = args.split_first() else {
        println!("{}", USAGE);
        return Ok(());
    };
    if command == "-h" || command == "--help" || command == "help" {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = Config::from_env();
    let app = open_app(&config)?;
    info!(command = %command, "admindash starting");

    match command.as_str() {
        "login" => login(&app, rest).await,
        "logout" => {
            app.logout().await;
            println!("Signed out.");
            Ok(())
        }
        "whoami" => whoami(&app, json).await,
        "stats" => {
            require_session(&app, routes::DASHBOARD)?;
            let stats = app.dashboard_stats().await?;
            output(json, &*stats, print_stats)
        }
        "activity" => {
            require_session(&app, routes::DASHBOARD)?;
            let logs = app.activity_logs().await?;
            output(json, &*logs, |logs| print_activity(logs))
        }
        "users" => {
            require_session(&app, routes::USERS)?;
            let filters = parse_filters(rest)?;
            let page = app.users(&filters).await?;
            output(json, &*page, print_users)
        }
        "user" => {
            require_session(&app, routes::USERS)?;
            let id = rest.first().ok_or_else(|| anyhow!("Usage: admindash user <id>"))?;
            let user = app.user(id).await?;
            output(json, &*user, print_user)
        }
        "theme" => theme(&app, rest),
        "status" => status(&app).await,
        other => bail!("Unknown command '{}'\n\n{}", other, USAGE),
    }
}

fn open_app(config: &Config) -> Result<App> {
    let dir = config.storage_dir()?;
    let storage = FileStorage::open(&dir)
        .with_context(|| format!("Failed to open storage in {}", dir.display()))?;
    debug!(path = %storage.path().display(), "Storage opened");

    let storage: Arc<dyn StorageBackend> = Arc::new(storage);
    let app = App::new(config.clone(), storage, Arc::new(MemoryNavigator::default()))?;
    Ok(app)
}

/// Remove every occurrence of `flag`, reporting whether it was present.
fn take_flag(args: &mut Vec<String>, flag: &str) -> bool {
    let before = args.len();
    args.retain(|arg| arg != flag);
    args.len() != before
}

/// Print `value` as pretty JSON or through `render`.
fn output<T: Serialize + ?Sized>(json: bool, value: &T, render: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        render(value);
    }
    Ok(())
}

fn require_session(app: &App, route: &str) -> Result<()> {
    match app.open(route) {
        routes::RouteDecision::Allow => Ok(()),
        _ => bail!("Not signed in. Run `admindash login <email>` first."),
    }
}

// ============================================================================
// Commands
// ============================================================================

async fn login(app: &App, args: &[String]) -> Result<()> {
    let email = args
        .first()
        .ok_or_else(|| anyhow!("Usage: admindash login <email> [password]"))?;
    let password = match args.get(1) {
        Some(password) => password.clone(),
        None => rpassword::prompt_password("Password: ")?,
    };

    app.open(routes::LOGIN);
    let user = app
        .login(&LoginCredentials::new(email.clone(), password))
        .await?;
    println!("Signed in as {} <{}> ({})", user.full_name(), user.email, user.role.as_str());
    Ok(())
}

async fn whoami(app: &App, json: bool) -> Result<()> {
    match app.current_user().await? {
        Some(user) if json => println!("{}", serde_json::to_string_pretty(&*user)?),
        Some(user) => {
            println!("{}", user.full_name());
            println!("  id:      {}", user.id);
            println!("  email:   {}", user.email);
            println!("  role:    {}", user.role.as_str());
            println!("  since:   {}", user.created_at);
        }
        None => println!("Not signed in."),
    }
    Ok(())
}

fn theme(app: &App, args: &[String]) -> Result<()> {
    let store = app.theme();
    match args.first().map(String::as_str) {
        None => {}
        Some("toggle") => {
            store.toggle();
        }
        Some(value) => {
            let theme = Theme::parse(value).ok_or_else(|| anyhow!("Unknown theme '{}'", value))?;
            store.set_theme(theme);
        }
    }
    println!("Theme: {}", store.theme());
    Ok(())
}

async fn status(app: &App) -> Result<()> {
    let config = app.config();
    println!("{}", config.app_name);
    println!("  backend:  {} ({})", app.api().kind(), config.api_base_url);
    println!("  storage:  {}", config.storage_dir()?.display());
    println!("  theme:    {}", app.theme().theme());

    match app.session().current_user() {
        Some(user) => {
            println!("  session:  {} <{}>", user.full_name(), user.email);
            // Warm the cache so the summary has something to show
            let _ = app.current_user().await;
            let _ = app.dashboard_stats().await;
        }
        None => println!("  session:  anonymous"),
    }

    let entries = app.queries().summary();
    if !entries.is_empty() {
        println!("  cache:");
        for entry in entries {
            let state = if entry.has_error { "error" } else { "ok" };
            println!("    {:<24} {:<10} {}", entry.key.operation(), entry.age_display(), state);
        }
    }
    Ok(())
}

// ============================================================================
// Argument parsing
// ============================================================================

fn parse_filters(args: &[String]) -> Result<UserFilters> {
    let mut filters = UserFilters::default();
    let mut iter = args.iter();
    while let Some(flag) = iter.next() {
        let mut value = || {
            iter.next()
                .ok_or_else(|| anyhow!("Missing value for {}", flag))
        };
        match flag.as_str() {
            "--search" => filters = filters.search(value()?.clone()),
            "--role" => {
                let raw = value()?;
                let role = UserRole::parse(raw).ok_or_else(|| anyhow!("Unknown role '{}'", raw))?;
                filters = filters.role(role);
            }
            "--status" => {
                let raw = value()?;
                let status = UserStatus::parse(raw).ok_or_else(|| anyhow!("Unknown status '{}'", raw))?;
                filters = filters.status(status);
            }
            "--page" => filters = filters.page(value()?.parse().context("--page expects a number")?),
            "--page-size" => {
                filters = filters.page_size(value()?.parse().context("--page-size expects a number")?)
            }
            "--sort" => {
                let order = filters.sort_order.unwrap_or_default();
                filters = filters.sort(value()?.clone(), order);
            }
            "--desc" => filters.sort_order = Some(SortOrder::Desc),
            other => bail!("Unknown option '{}'", other),
        }
    }
    Ok(filters)
}

// ============================================================================
// Output
// ============================================================================

fn print_stats(stats: &DashboardStats) {
    println!("Total users:   {}", format_number(stats.total_users));
    println!("Active users:  {}", format_number(stats.active_users));
    println!("Revenue:       {}", format_currency(stats.total_revenue));
    println!("Growth:        {}", format_percentage(stats.growth_rate, 1));
}

fn print_activity(logs: &[ActivityLog]) {
    if logs.is_empty() {
        println!("No recent activity.");
        return;
    }
    for log in logs {
        println!(
            "{:<26} {:<width$} {:<18} {}",
            log.timestamp,
            truncate(&log.user_name, NAME_WIDTH),
            log.action,
            log.status,
            width = NAME_WIDTH
        );
    }
}

fn print_users(page: &PaginatedResponse<UserListItem>) {
    for user in &page.data {
        print_user_row(user);
    }
    let p = &page.pagination;
    println!(
        "Page {} of {} ({} users)",
        p.page,
        p.total_pages.max(1),
        format_number(p.total)
    );
}

fn print_user_row(user: &UserListItem) {
    println!(
        "{:<10} {:<name$} {:<email$} {:<8} {}",
        user.id,
        truncate(&user.full_name(), NAME_WIDTH),
        truncate(&user.email, EMAIL_WIDTH),
        user.role.as_str(),
        user.status.as_str(),
        name = NAME_WIDTH,
        email = EMAIL_WIDTH
    );
}

fn print_user(user: &UserListItem) {
    println!("{}", user.full_name());
    println!("  id:          {}", user.id);
    println!("  email:       {}", user.email);
    println!("  role:        {}", user.role.as_str());
    println!("  status:      {}", user.status.as_str());
    println!("  last login:  {}", user.last_login.as_deref().unwrap_or("never"));
    println!("  created:     {}", user.created_at);
}

#[cfg(test)]
mod tests {
    use super::*;
    use admindash_core::backend::{Api, MockBackend};
    use admindash_core::storage::PersistedStore;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_filters() {
        let filters = parse_filters(&args(&[
            "--search", "ada", "--role", "admin", "--page", "3", "--sort", "email", "--desc",
        ]))
        .unwrap();
        assert_eq!(filters.search.as_deref(), Some("ada"));
        assert_eq!(filters.role, Some(UserRole::Admin));
        assert_eq!(filters.page, Some(3));
        assert_eq!(filters.sort_by.as_deref(), Some("email"));
        assert_eq!(filters.sort_order, Some(SortOrder::Desc));
    }

    #[test]
    fn test_take_flag() {
        let mut list = args(&["users", "--json", "--page", "2"]);
        assert!(take_flag(&mut list, "--json"));
        assert_eq!(list, args(&["users", "--page", "2"]));
        assert!(!take_flag(&mut list, "--json"));
    }

    #[test]
    fn test_parse_filters_rejects_bad_input() {
        assert!(parse_filters(&args(&["--page"])).is_err());
        assert!(parse_filters(&args(&["--page", "two"])).is_err());
        assert!(parse_filters(&args(&["--role", "owner"])).is_err());
        assert!(parse_filters(&args(&["--color"])).is_err());
    }

    #[tokio::test]
    async fn test_login_uses_password_argument() {
        let app = App::with_api(
            Config::default(),
            Api::mock(MockBackend::instant()),
            PersistedStore::in_memory(),
            Arc::new(MemoryNavigator::default()),
        );

        assert!(login(&app, &args(&[])).await.is_err());
        assert!(login(&app, &args(&["not-an-email", "secret"])).await.is_err());
        assert!(!app.is_authenticated());

        login(&app, &args(&["admin@example.com", "secret"])).await.unwrap();
        assert!(app.is_authenticated());
    }
}
