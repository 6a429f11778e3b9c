use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;
use tokio::sync::broadcast;

use crate::config::AppConfig;
use crate::errors::AppError;
use crate::services::events::BookingEvent;
use crate::services::sms::SmsProvider;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub sms: Box<dyn SmsProvider>,
    pub events_tx: broadcast::Sender<BookingEvent>,
}

impl AppState {
    pub fn new(conn: Connection, config: AppConfig, sms: Box<dyn SmsProvider>) -> Self {
        let (events_tx, _) = broadcast::channel(256);
        Self {
            db: Arc::new(Mutex::new(conn)),
            config,
            sms,
            events_tx,
        }
    }

    /// Locks the shared connection. Never hold the guard across an `.await`.
    pub fn conn(&self) -> Result<MutexGuard<'_, Connection>, AppError> {
        self.db
            .lock()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("database lock poisoned")))
    }
}
