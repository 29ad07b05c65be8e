//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, books, circulation, health, notifications, settings, stats, users};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Shelfmark API",
        version = "0.1.0",
        description = "Library circulation server REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::register,
        auth::login,
        auth::me,
        // Books
        books::list_books,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        books::list_categories,
        // Circulation
        circulation::borrow,
        circulation::return_book,
        circulation::renew,
        circulation::reserve,
        circulation::book_queue,
        circulation::process_queue,
        circulation::cancel_reservation,
        circulation::send_reminders,
        circulation::user_borrowings,
        circulation::user_reservations,
        // Users
        users::list_users,
        users::get_user,
        users::create_user,
        users::update_user,
        // Notifications
        notifications::list_notifications,
        notifications::send_notification,
        notifications::mark_read,
        // Stats
        stats::get_stats,
        // Settings
        settings::get_settings,
        settings::update_settings,
    ),
    components(
        schemas(
            // Auth
            auth::LoginRequest,
            auth::LoginResponse,
            auth::RegisterResponse,
            // Books
            crate::models::book::Book,
            crate::models::book::BookStatus,
            crate::models::book::CreateBook,
            crate::models::book::UpdateBook,
            crate::models::book::CategoryCount,
            books::BookResponse,
            // Circulation
            crate::models::borrowing::Borrowing,
            crate::models::borrowing::BorrowingDetails,
            crate::models::reservation::Reservation,
            crate::models::reservation::ReservationDetails,
            circulation::CirculationRequest,
            circulation::BorrowingResponse,
            circulation::ReturnResponse,
            circulation::ReservationResponse,
            circulation::RemindersResponse,
            // Users
            crate::models::user::User,
            crate::models::user::Role,
            crate::models::user::AccountType,
            crate::models::user::RegisterUser,
            crate::models::user::CreateUser,
            crate::models::user::UpdateUser,
            // Notifications
            crate::models::notification::Notification,
            crate::models::notification::CreateNotification,
            // Stats
            crate::services::stats::CirculationReport,
            crate::services::stats::BorrowCount,
            // Settings
            crate::models::settings::CirculationSettings,
            // Health
            health::HealthResponse,
            // Common
            crate::api::StatusResponse,
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Registration and login"),
        (name = "books", description = "Catalog management"),
        (name = "circulation", description = "Borrowing, returns, renewals and reservations"),
        (name = "users", description = "User management"),
        (name = "notifications", description = "In-app notifications"),
        (name = "stats", description = "Statistics"),
        (name = "settings", description = "Circulation settings")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
