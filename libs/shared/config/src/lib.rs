use std::env;
use std::str::FromStr;

use chrono::Weekday;
use tracing::warn;

pub const DEFAULT_IN_CLINIC_RATE: i64 = 500;
pub const DEFAULT_ONLINE_RATE: i64 = 300;
pub const OPEN_DAY_COUNT: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Sqlite,
    Supabase,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(StorageBackend::Sqlite),
            "supabase" | "postgres" => Ok(StorageBackend::Supabase),
            other => Err(format!("unknown storage backend: {}", other)),
        }
    }
}

/// Business knobs of the clinic. Percentages and the free-return window
/// are fixed rules and live with the services that apply them.
#[derive(Debug, Clone)]
pub struct ClinicPolicyConfig {
    pub in_clinic_rate: i64,
    pub online_rate: i64,
    pub open_days: Vec<Weekday>,
}

impl Default for ClinicPolicyConfig {
    fn default() -> Self {
        Self {
            in_clinic_rate: DEFAULT_IN_CLINIC_RATE,
            online_rate: DEFAULT_ONLINE_RATE,
            open_days: default_open_days(),
        }
    }
}

pub fn default_open_days() -> Vec<Weekday> {
    vec![Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu]
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub storage_backend: StorageBackend,
    pub sqlite_path: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub server_port: u16,
    pub clinic: ClinicPolicyConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage_backend: StorageBackend::Sqlite,
            sqlite_path: "clinic.db".to_string(),
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_service_role_key: String::new(),
            server_port: 3000,
            clinic: ClinicPolicyConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            storage_backend: env::var("STORAGE_BACKEND")
                .ok()
                .and_then(|value| value.parse().map_err(|e: String| warn!("{}, using sqlite", e)).ok())
                .unwrap_or(defaults.storage_backend),
            sqlite_path: env::var("SQLITE_PATH")
                .unwrap_or_else(|_| {
                    warn!("SQLITE_PATH not set, using {}", defaults.sqlite_path);
                    defaults.sqlite_path.clone()
                }),
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_SERVICE_ROLE_KEY not set, using empty value");
                    String::new()
                }),
            server_port: parse_env_or("SERVER_PORT", defaults.server_port),
            clinic: ClinicPolicyConfig {
                in_clinic_rate: parse_env_or("CLINIC_IN_CLINIC_RATE", DEFAULT_IN_CLINIC_RATE),
                online_rate: parse_env_or("CLINIC_ONLINE_RATE", DEFAULT_ONLINE_RATE),
                open_days: env::var("CLINIC_OPEN_DAYS")
                    .ok()
                    .and_then(|raw| match parse_open_days(&raw) {
                        Ok(days) => Some(days),
                        Err(e) => {
                            warn!("Ignoring CLINIC_OPEN_DAYS: {}", e);
                            None
                        }
                    })
                    .unwrap_or_else(default_open_days),
            },
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        match self.storage_backend {
            StorageBackend::Sqlite => !self.sqlite_path.is_empty(),
            StorageBackend::Supabase => self.is_supabase_configured(),
        }
    }

    pub fn is_supabase_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_service_role_key.is_empty()
    }
}

/// Parse a comma-separated list of weekday names ("mon,tue,wed,thu").
/// Exactly four distinct days are required.
pub fn parse_open_days(raw: &str) -> Result<Vec<Weekday>, String> {
    let mut days = Vec::with_capacity(OPEN_DAY_COUNT);
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let day = part
            .parse::<Weekday>()
            .map_err(|_| format!("invalid weekday '{}'", part))?;
        if days.contains(&day) {
            return Err(format!("weekday '{}' listed twice", part));
        }
        days.push(day);
    }

    if days.len() != OPEN_DAY_COUNT {
        return Err(format!(
            "expected {} open days, got {}",
            OPEN_DAY_COUNT,
            days.len()
        ));
    }

    Ok(days)
}

fn parse_env_or<T: FromStr + std::fmt::Display>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
