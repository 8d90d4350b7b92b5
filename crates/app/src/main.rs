use anyhow::bail;
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::OffsetTime;
use turfbook_config::Config;
use turfbook_models::{AppRole, TurfStatus};

mod auth;
mod error;
mod handlers;
mod server;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const GIT_HASH: &str = env!("TURFBOOK_GIT_HASH");

pub(crate) fn version_string() -> String {
    format!("{VERSION} ({GIT_HASH})")
}

// --- CLI definition ---

#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Parser)]
#[command(name = "turfbook")]
#[command(about = "Sports turf booking marketplace")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("TURFBOOK_GIT_HASH"), ")"))]
struct Cli {
    /// Log level (default: from config, else info)
    #[arg(short, long, global = true)]
    log_level: Option<LogLevel>,

    /// Display log timestamps in UTC (default: local time)
    #[arg(long, global = true)]
    utc: bool,

    /// Database URL (default: from config, else sqlite:turfbook.db)
    #[arg(long, global = true)]
    db_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Create an admin account (admins cannot sign up over HTTP)
    CreateAdmin {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "Administrator")]
        full_name: String,
    },
    /// Change an existing account's role
    GrantRole {
        #[arg(long)]
        email: String,
        /// admin, owner or player
        #[arg(long)]
        role: AppRole,
    },
    /// List turf listings
    ListTurfs {
        /// Only listings in this status (pending, approved, rejected, deactivated)
        #[arg(long)]
        status: Option<TurfStatus>,
    },
    /// Mark confirmed bookings dated before today as completed
    CompleteBookings,
}

impl Cli {
    /// CLI args sit on top of defaults, config file and env.
    fn apply(&self, config: &mut Config) {
        if let Some(level) = &self.log_level {
            config.log_level = level.to_string();
        }
        if self.utc {
            config.utc = true;
        }
        if let Some(url) = &self.db_url {
            config.db_url = url.clone();
        }
        if let Commands::Serve { port: Some(port) } = &self.command {
            config.port = *port;
        }
    }
}

// --- Logging ---

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.utc {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_timer(OffsetTime::new(
                time::UtcOffset::UTC,
                time::macros::format_description!(
                    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
                ),
            ))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_timer(LocalTimer)
            .init();
    }
}

struct LocalTimer;

impl tracing_subscriber::fmt::time::FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

// --- Commands ---

async fn create_admin(pool: &sqlx::SqlitePool, email: &str, password: &str, full_name: &str) -> anyhow::Result<()> {
    let email = email.trim().to_lowercase();
    if password.chars().count() < handlers::account::MIN_PASSWORD_LEN {
        bail!(
            "password must be at least {} characters",
            handlers::account::MIN_PASSWORD_LEN
        );
    }
    let hash = auth::hash_password(password)?;
    match turfbook_db::create_account(pool, &email, &hash, full_name.trim(), AppRole::Admin).await {
        Ok(account) => {
            println!("Created admin {} (id={})", account.email, account.id);
            Ok(())
        }
        Err(e) if turfbook_db::is_unique_violation(&e) => {
            bail!("{email} already has an account; use `turfbook grant-role` instead")
        }
        Err(e) => Err(e),
    }
}

async fn list_turfs(pool: &sqlx::SqlitePool, status: Option<TurfStatus>) -> anyhow::Result<()> {
    let turfs = turfbook_db::list_turfs(pool, status).await?;
    if turfs.is_empty() {
        println!("No turfs found.");
        return Ok(());
    }
    println!(
        "{:<6} {:<12} {:<11} {:<14} {:<16} {:>10}  {}",
        "ID", "Status", "Sport", "City", "Area", "Price/hr", "Name"
    );
    println!("{}", "-".repeat(100));
    for t in &turfs {
        println!(
            "{:<6} {:<12} {:<11} {:<14} {:<16} {:>10}  {}",
            t.id,
            t.status.to_string(),
            t.sport_type.label(),
            t.city,
            t.area,
            t.hourly_price.to_string(),
            t.name,
        );
    }
    println!("\n{} turf(s) total", turfs.len());
    Ok(())
}

// --- Main ---

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load();
    cli.apply(&mut config);
    init_logging(&config);

    let pool = turfbook_db::connect(&config.db_url).await?;
    turfbook_db::migrate(&pool).await?;

    match cli.command {
        Commands::Serve { .. } => {
            server::run_server(&config, pool).await?;
        }
        Commands::CreateAdmin { email, password, full_name } => {
            create_admin(&pool, &email, &password, &full_name).await?;
        }
        Commands::GrantRole { email, role } => {
            let email = email.trim().to_lowercase();
            if !turfbook_db::set_role(&pool, &email, role).await? {
                bail!("no account for {email}");
            }
            println!("{email} is now {role}");
        }
        Commands::ListTurfs { status } => {
            list_turfs(&pool, status).await?;
        }
        Commands::CompleteBookings => {
            let tz = server::parse_timezone(&config.timezone)?;
            let today = server::today_in(tz);
            let completed = turfbook_db::complete_past_bookings(&pool, today).await?;
            info!("{completed} booking(s) dated before {today} marked completed");
            println!("{completed} booking(s) completed");
        }
    }

    Ok(())
}
