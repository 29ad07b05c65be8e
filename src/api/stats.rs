//! Statistics endpoints

use axum::{extract::State, Json};

use crate::{error::AppResult, services::stats::CirculationReport};

use super::AuthenticatedUser;

/// Circulation report
#[utoipa::path(
    get,
    path = "/stats",
    tag = "stats",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Circulation statistics", body = CirculationReport),
        (status = 403, description = "Librarian privileges required", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_stats(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<CirculationReport>> {
    claims.require_staff()?;

    let report = state.services.stats.get_report().await?;
    Ok(Json(report))
}
