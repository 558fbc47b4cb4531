use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::{env, fs};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub project_name: String,
    pub log_level: String,
    pub log_file: String,
    pub database_url: String,
    /// Matcher distance at or below which a face comparison counts as a match.
    pub face_match_threshold: f64,
    /// Upper bound on a single matcher invocation, in milliseconds.
    pub face_match_timeout_ms: u64,
    /// Whether check-in attempts are written to the verification log.
    pub log_verifications: bool,
}

static CONFIG: OnceCell<Config> = OnceCell::new();

impl Config {
    pub fn init(env_path: &str) -> &'static Self {
        dotenvy::from_filename(env_path).ok();

        CONFIG.get_or_init(|| {
            let project_name =
                env::var("PROJECT_NAME").unwrap_or_else(|_| "attendance-core".into());
            let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "debug".into());
            let log_file = env::var("LOG_FILE").unwrap_or_else(|_| "logs/attendance.log".into());
            let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

            if let Some(parent) = std::path::Path::new(&log_file).parent() {
                fs::create_dir_all(parent).expect("Failed to create log directory");
            }

            let face_match_threshold = env::var("FACE_MATCH_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.4);
            let face_match_timeout_ms = env::var("FACE_MATCH_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5000);
            let log_verifications = env::var("LOG_VERIFICATIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true);

            Config {
                project_name,
                log_level,
                log_file,
                database_url,
                face_match_threshold,
                face_match_timeout_ms,
                log_verifications,
            }
        })
    }

    pub fn get() -> &'static Self {
        CONFIG.get().expect("Config not initialized")
    }
}
