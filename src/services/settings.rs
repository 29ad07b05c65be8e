//! Settings service

use std::sync::Arc;

use crate::{
    clock::Clock,
    error::{AppError, AppResult},
    models::settings::CirculationSettings,
    repository::Repository,
};

const CIRCULATION_KEY: &str = "circulation";

#[derive(Clone)]
pub struct SettingsService {
    repository: Repository,
    clock: Arc<dyn Clock>,
}

impl SettingsService {
    pub fn new(repository: Repository, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// Current circulation rules, defaults until an admin saves some
    pub async fn get_settings(&self) -> AppResult<CirculationSettings> {
        Ok(self
            .repository
            .settings
            .get::<CirculationSettings>(CIRCULATION_KEY)
            .await?
            .unwrap_or_default())
    }

    /// Replace circulation rules
    pub async fn update_settings(&self, settings: CirculationSettings) -> AppResult<CirculationSettings> {
        settings.validate().map_err(AppError::Validation)?;

        self.repository
            .settings
            .put(CIRCULATION_KEY, &settings, self.clock.now())
            .await?;

        tracing::info!(
            fine_per_day = %settings.fine_per_day,
            grace_days = settings.overdue_grace_days,
            "Circulation settings updated"
        );

        Ok(settings)
    }
}
