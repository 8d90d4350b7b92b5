use std::path::PathBuf;
use serde::Deserialize;

/// All configuration for the turfbook service.
///
/// Precedence (lowest to highest): defaults → config file → env var → CLI arg.
/// CLI arg merging is done by the caller after `Config::load()`.
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub db_url: String,

    // Server
    pub port: u16,

    // Logging
    pub log_level: String,
    pub utc: bool,

    // Auth
    pub jwt_secret: String,
    pub token_ttl_hours: u32,

    // Uploaded turf photos
    pub storage_dir: PathBuf,

    // IANA zone that decides what "today" is for bookings
    pub timezone: String,
}

/// Config file layout (~/.turfbook/config.toml). All fields optional; they
/// layer on top of compiled-in defaults.
#[derive(Debug, Deserialize, Default)]
struct FileConfig {
    db_url: Option<String>,
    port: Option<u16>,
    log_level: Option<String>,
    utc: Option<bool>,
    jwt_secret: Option<String>,
    token_ttl_hours: Option<u32>,
    storage_dir: Option<PathBuf>,
    timezone: Option<String>,
}

impl Config {
    /// Config directory: ~/.turfbook/
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".turfbook")
    }

    /// Config file path: ~/.turfbook/config.toml
    pub fn file_path() -> PathBuf {
        Self::dir().join("config.toml")
    }

    /// Load config: defaults → config file → env vars.
    /// CLI args should be merged by the caller afterward.
    pub fn load() -> Self {
        let mut config = Self::defaults();

        // Layer 2: config file. Logging is not up yet, so a bad file is
        // reported on stderr and skipped.
        let path = Self::file_path();
        if let Ok(contents) = std::fs::read_to_string(&path) {
            match toml::from_str::<FileConfig>(&contents) {
                Ok(file) => config.apply_file(file),
                Err(e) => eprintln!("ignoring {}: {e}", path.display()),
            }
        }

        // Layer 3: environment variables
        config.apply_env(|key| std::env::var(key).ok());

        config
    }

    // --- Private helpers ---

    fn defaults() -> Self {
        Self {
            db_url: "sqlite:turfbook.db".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            utc: false,
            jwt_secret: "change-me".to_string(),
            token_ttl_hours: 24,
            storage_dir: PathBuf::from("storage"),
            timezone: "Asia/Kolkata".to_string(),
        }
    }

    fn apply_file(&mut self, file: FileConfig) {
        if let Some(v) = file.db_url { self.db_url = v; }
        if let Some(v) = file.port { self.port = v; }
        if let Some(v) = file.log_level { self.log_level = v; }
        if let Some(v) = file.utc { self.utc = v; }
        if let Some(v) = file.jwt_secret { self.jwt_secret = v; }
        if let Some(v) = file.token_ttl_hours { self.token_ttl_hours = v; }
        if let Some(v) = file.storage_dir { self.storage_dir = v; }
        if let Some(v) = file.timezone { self.timezone = v; }
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("TURFBOOK_DB_URL") { self.db_url = v; }
        if let Some(v) = var("TURFBOOK_PORT") {
            if let Ok(p) = v.parse() { self.port = p; }
        }
        if let Some(v) = var("TURFBOOK_LOG_LEVEL") { self.log_level = v; }
        if let Some(v) = var("TURFBOOK_UTC") {
            self.utc = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Some(v) = var("TURFBOOK_JWT_SECRET") { self.jwt_secret = v; }
        if let Some(v) = var("TURFBOOK_TOKEN_TTL_HOURS") {
            if let Ok(h) = v.parse() { self.token_ttl_hours = h; }
        }
        if let Some(v) = var("TURFBOOK_STORAGE_DIR") { self.storage_dir = PathBuf::from(v); }
        if let Some(v) = var("TURFBOOK_TIMEZONE") { self.timezone = v; }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::defaults()
    }
}
