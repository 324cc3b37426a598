use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::auth::password::PasswordHasher;
use crate::auth::session::SessionStore;
use crate::config::Config;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub sessions: SessionStore,
    pub hasher: PasswordHasher,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(db: DbPool, config: Config) -> Self {
        let sessions = SessionStore::new(
            config.auth.session_secret.expose(),
            config.auth.cookie_name.clone(),
            config.secure_cookies(),
        );
        let hasher = PasswordHasher::new(config.auth.bcrypt_cost);
        let health_timeout_ms = config.server.health_timeout_ms;

        Self {
            db,
            config,
            sessions,
            hasher,
            http: reqwest::Client::builder()
                .timeout(Duration::from_millis(health_timeout_ms))
                .build()
                .unwrap_or_default(),
        }
    }
}
