//! Business logic services

pub mod catalog;
pub mod circulation;
pub mod notifications;
pub mod settings;
pub mod stats;
pub mod users;

use std::sync::Arc;

use crate::{clock::Clock, config::AuthConfig, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub users: users::UsersService,
    pub catalog: catalog::CatalogService,
    pub circulation: circulation::CirculationService,
    pub notifications: notifications::NotificationsService,
    pub stats: stats::StatsService,
    pub settings: settings::SettingsService,
    pub repository: Repository,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, auth_config: AuthConfig, clock: Arc<dyn Clock>) -> Self {
        let settings = settings::SettingsService::new(repository.clone(), clock.clone());

        Self {
            users: users::UsersService::new(repository.clone(), auth_config, clock.clone()),
            catalog: catalog::CatalogService::new(repository.clone(), clock.clone()),
            circulation: circulation::CirculationService::new(
                repository.clone(),
                settings.clone(),
                clock.clone(),
            ),
            notifications: notifications::NotificationsService::new(repository.clone(), clock.clone()),
            stats: stats::StatsService::new(repository.clone(), settings.clone(), clock),
            settings,
            repository,
        }
    }
}
