use std::path::Path;
use std::sync::Arc;

use tracing::info;

use shared_config::{AppConfig, StorageBackend};
use shared_database::DatabaseError;
use shared_utils::clock::{Clock, SystemClock};

use crate::services::booking::AppointmentBookingService;
use crate::store::{AppointmentStore, SqliteAppointmentStore, SupabaseAppointmentStore};

/// Router state shared by every appointment handler.
#[derive(Clone)]
pub struct AppointmentCellState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn AppointmentStore>,
    pub clock: Arc<dyn Clock>,
}

impl AppointmentCellState {
    pub fn new(config: Arc<AppConfig>, store: Arc<dyn AppointmentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { config, store, clock }
    }

    /// Open the configured storage backend with the system clock.
    pub fn from_config(config: Arc<AppConfig>) -> Result<Self, DatabaseError> {
        let store = open_store(&config)?;
        Ok(Self::new(config, store, Arc::new(SystemClock)))
    }

    pub fn booking_service(&self) -> AppointmentBookingService {
        AppointmentBookingService::new(Arc::clone(&self.store), Arc::clone(&self.clock), &self.config.clinic)
    }
}

pub fn open_store(config: &AppConfig) -> Result<Arc<dyn AppointmentStore>, DatabaseError> {
    match config.storage_backend {
        StorageBackend::Sqlite => {
            let store = SqliteAppointmentStore::open(Path::new(&config.sqlite_path))?;
            Ok(Arc::new(store))
        }
        StorageBackend::Supabase => {
            if !config.is_supabase_configured() {
                return Err(DatabaseError::ConnectionUnavailable(
                    "STORAGE_BACKEND=supabase but SUPABASE_URL or keys are missing".into(),
                ));
            }
            info!("Using Supabase appointment store at {}", config.supabase_url);
            Ok(Arc::new(SupabaseAppointmentStore::new(config)))
        }
    }
}
