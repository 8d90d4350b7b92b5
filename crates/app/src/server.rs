use std::sync::Arc;

use anyhow::anyhow;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, patch, post};
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use turfbook_config::Config;
use turfbook_storage::ImageStore;

use crate::auth::TokenKeys;
use crate::handlers::{account, admin, bookings, catalog, owner};

/// URL prefix uploaded photos are served under.
pub const STORAGE_PREFIX: &str = "/storage";

/// Cap on one photo upload request.
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

const DEFAULT_JWT_SECRET: &str = "change-me";

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub store: ImageStore,
    pub tokens: Arc<TokenKeys>,
    pub timezone: Tz,
}

pub fn parse_timezone(name: &str) -> anyhow::Result<Tz> {
    name.parse().map_err(|e| anyhow!("unknown timezone {name:?}: {e}"))
}

/// Today's calendar date in `tz`.
pub fn today_in(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}

impl AppState {
    pub fn new(pool: SqlitePool, config: &Config) -> anyhow::Result<Self> {
        let timezone = parse_timezone(&config.timezone)?;
        if config.jwt_secret == DEFAULT_JWT_SECRET {
            warn!("Using the default JWT secret; set TURFBOOK_JWT_SECRET before going live");
        }
        Ok(Self {
            pool,
            store: ImageStore::new(&config.storage_dir, STORAGE_PREFIX),
            tokens: Arc::new(TokenKeys::new(&config.jwt_secret, config.token_ttl_hours)),
            timezone,
        })
    }

    /// The calendar date bookings are judged against.
    pub fn today(&self) -> NaiveDate {
        today_in(self.timezone)
    }
}

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(catalog::health))
        // Accounts
        .route("/auth/signup", post(account::signup))
        .route("/auth/signin", post(account::signin))
        .route("/auth/me", get(account::me))
        .route("/profile", get(account::get_profile).patch(account::update_profile))
        // Public catalog
        .route("/turfs", get(catalog::list_turfs))
        .route("/turfs/cities", get(catalog::list_cities))
        .route("/turfs/{id}", get(catalog::get_turf))
        .route("/turfs/{id}/availability", get(catalog::availability))
        .route("/sports", get(catalog::list_sports))
        .route("/amenities", get(catalog::list_amenities))
        // Players
        .route("/bookings", post(bookings::create_booking))
        .route("/bookings/mine", get(bookings::my_bookings))
        .route("/bookings/{id}", get(bookings::get_booking))
        .route("/bookings/{id}/cancel", post(bookings::cancel_booking))
        // Owners
        .route("/owner/turfs", get(owner::list_turfs).post(owner::create_turf))
        .route("/owner/turfs/{id}", patch(owner::update_turf))
        .route("/owner/turfs/{id}/toggle", post(owner::toggle_turf))
        .route("/owner/turfs/{id}/slots", get(owner::list_slots).post(owner::add_slot))
        .route("/owner/slots/{id}", patch(owner::switch_slot).delete(owner::delete_slot))
        .route(
            "/owner/turfs/{id}/images",
            get(owner::list_images)
                .post(owner::upload_images)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/owner/images/{id}", delete(owner::delete_image))
        .route("/owner/bookings", get(owner::list_bookings))
        .route("/owner/earnings", get(owner::earnings))
        // Admins
        .route("/admin/turfs/pending", get(admin::pending_turfs))
        .route("/admin/turfs/{id}/status", patch(admin::review_turf))
        .route("/admin/bookings", get(admin::recent_bookings))
        .route("/admin/stats", get(admin::stats))
        .route("/admin/settings", get(admin::list_settings))
        .route("/admin/settings/{key}", get(admin::get_setting).put(admin::put_setting));

    Router::new()
        .nest("/api", api_routes)
        .nest_service(STORAGE_PREFIX, ServeDir::new(state.store.root()))
        .fallback_service(
            ServeDir::new("frontend/dist").fallback(ServeFile::new("frontend/dist/index.html")),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server(config: &Config, pool: SqlitePool) -> anyhow::Result<()> {
    info!("turfbook v{}", crate::version_string());

    let state = AppState::new(pool, config)?;
    info!(
        "Photos stored in {}, bookings dated in {}",
        state.store.root().display(),
        state.timezone
    );
    let app = router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    info!("Listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
