use std::{collections::HashMap, fs};

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server_url: String,
    pub preferences_db_url: String,
    pub artificial_delay_ms: u64,
    pub random_id_max: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8443".into(),
            preferences_db_url: default_preferences_db_url(),
            artificial_delay_ms: 0,
            random_id_max: 672,
        }
    }
}

fn default_preferences_db_url() -> String {
    dirs::data_dir()
        .map(|dir| dir.join("lookup").join("preferences.db"))
        .map(|path| format!("sqlite://{}", path.to_string_lossy().replace('\\', "/")))
        .unwrap_or_else(|| "sqlite://./data/preferences.db".into())
}

pub fn load_settings() -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string("lookup.toml") {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            if let Some(v) = file_cfg.get("server_url") {
                settings.server_url = v.clone();
            }
            if let Some(v) = file_cfg.get("preferences_db_url") {
                settings.preferences_db_url = normalize_database_url(v);
            }
            if let Some(v) = file_cfg.get("artificial_delay_ms") {
                if let Ok(parsed) = v.parse::<u64>() {
                    settings.artificial_delay_ms = parsed;
                }
            }
            if let Some(v) = file_cfg.get("random_id_max") {
                if let Ok(parsed) = v.parse::<i64>() {
                    settings.random_id_max = parsed;
                }
            }
        }
    }

    if let Ok(v) = std::env::var("LOOKUP_SERVER_URL") {
        settings.server_url = v;
    }
    if let Ok(v) = std::env::var("APP__SERVER_URL") {
        settings.server_url = v;
    }

    if let Ok(v) = std::env::var("LOOKUP_PREFERENCES_DB_URL") {
        settings.preferences_db_url = normalize_database_url(&v);
    }
    if let Ok(v) = std::env::var("APP__PREFERENCES_DB_URL") {
        settings.preferences_db_url = normalize_database_url(&v);
    }

    if let Ok(v) = std::env::var("APP__ARTIFICIAL_DELAY_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.artificial_delay_ms = parsed;
        }
    }

    if let Ok(v) = std::env::var("APP__RANDOM_ID_MAX") {
        if let Ok(parsed) = v.parse::<i64>() {
            settings.random_id_max = parsed;
        }
    }

    settings
}

pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().preferences_db_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}
