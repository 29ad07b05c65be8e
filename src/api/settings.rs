//! Settings endpoints

use axum::{extract::State, Json};

use crate::{error::AppResult, models::settings::CirculationSettings};

use super::AuthenticatedUser;

/// Get circulation settings
#[utoipa::path(
    get,
    path = "/settings",
    tag = "settings",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current circulation settings", body = CirculationSettings)
    )
)]
pub async fn get_settings(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<CirculationSettings>> {
    claims.require_staff()?;

    let settings = state.services.settings.get_settings().await?;
    Ok(Json(settings))
}

/// Replace circulation settings
#[utoipa::path(
    put,
    path = "/settings",
    tag = "settings",
    security(("bearer_auth" = [])),
    request_body = CirculationSettings,
    responses(
        (status = 200, description = "Settings updated", body = CirculationSettings),
        (status = 400, description = "Invalid settings", body = crate::error::ErrorResponse),
        (status = 403, description = "Administrator privileges required", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_settings(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(settings): Json<CirculationSettings>,
) -> AppResult<Json<CirculationSettings>> {
    claims.require_admin()?;

    let settings = state.services.settings.update_settings(settings).await?;
    Ok(Json(settings))
}
