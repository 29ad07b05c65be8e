//! Circulation endpoints: borrow, return, renew, reserve

use axum::{
    async_trait,
    body::{Body, Bytes},
    extract::{FromRequest, Path, Query, Request, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::{AppError, AppResult},
    models::{
        borrowing::{Borrowing, BorrowingDetails},
        reservation::{Reservation, ReservationDetails},
    },
};

use super::AuthenticatedUser;

/// Optional body of circulation requests. Staff may act for another user;
/// everyone else acts for themselves.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CirculationRequest {
    pub user_id: Option<i64>,
}

#[derive(Serialize, ToSchema)]
pub struct BorrowingResponse {
    pub status: String,
    pub message: String,
    pub borrowing: Borrowing,
}

#[derive(Serialize, ToSchema)]
pub struct ReturnResponse {
    pub status: String,
    pub message: String,
    pub borrowing: Borrowing,
    #[schema(value_type = String)]
    pub fine: Decimal,
    pub fulfilled_reservation: Option<Reservation>,
}

#[derive(Serialize, ToSchema)]
pub struct ReservationResponse {
    pub status: String,
    pub message: String,
    pub reservation: Option<Reservation>,
}

#[derive(Serialize, ToSchema)]
pub struct RemindersResponse {
    pub status: String,
    pub message: String,
    pub sent: usize,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct BorrowingsQuery {
    /// Only loans not yet returned
    pub active: Option<bool>,
}

/// Circulation request body. An empty body means the caller acts for
/// themselves; anything else must be a valid JSON `CirculationRequest`.
pub struct CirculationBody(pub CirculationRequest);

#[async_trait]
impl FromRequest<crate::AppState> for CirculationBody {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &crate::AppState) -> Result<Self, Self::Rejection> {
        let (parts, body) = req.into_parts();
        let bytes = Bytes::from_request(Request::from_parts(parts.clone(), body), state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;

        if bytes.is_empty() {
            return Ok(Self(CirculationRequest::default()));
        }

        let Json(request) =
            Json::<CirculationRequest>::from_request(Request::from_parts(parts, Body::from(bytes)), state)
                .await
                .map_err(|e| AppError::BadRequest(e.body_text()))?;
        Ok(Self(request))
    }
}

fn acting_for(
    claims: &crate::models::user::UserClaims,
    CirculationBody(body): CirculationBody,
) -> AppResult<i64> {
    claims.acting_for(body.user_id)
}

/// Borrow a book
#[utoipa::path(
    post,
    path = "/books/{id}/borrow",
    tag = "circulation",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Book ID")
    ),
    request_body(content = CirculationRequest, description = "Borrower, staff only"),
    responses(
        (status = 201, description = "Book issued", body = BorrowingResponse),
        (status = 404, description = "User or book not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Limit reached or book not available", body = crate::error::ErrorResponse)
    )
)]
pub async fn borrow(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<i64>,
    body: CirculationBody,
) -> AppResult<(StatusCode, Json<BorrowingResponse>)> {
    let user_id = acting_for(&claims, body)?;

    let borrowing = state.services.circulation.borrow(book_id, user_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(BorrowingResponse {
            status: "success".to_string(),
            message: "Borrowed".to_string(),
            borrowing,
        }),
    ))
}

/// Return a borrowed book
#[utoipa::path(
    post,
    path = "/books/{id}/return",
    tag = "circulation",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Book ID")
    ),
    request_body(content = CirculationRequest, description = "Borrower, staff only"),
    responses(
        (status = 200, description = "Book returned", body = ReturnResponse),
        (status = 409, description = "No active borrowing", body = crate::error::ErrorResponse)
    )
)]
pub async fn return_book(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<i64>,
    body: CirculationBody,
) -> AppResult<Json<ReturnResponse>> {
    let user_id = acting_for(&claims, body)?;

    let receipt = state.services.circulation.return_book(book_id, user_id).await?;

    Ok(Json(ReturnResponse {
        status: "success".to_string(),
        message: "Returned".to_string(),
        borrowing: receipt.borrowing,
        fine: receipt.fine,
        fulfilled_reservation: receipt.fulfilled_reservation,
    }))
}

/// Renew a loan
#[utoipa::path(
    post,
    path = "/books/{id}/renew",
    tag = "circulation",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Book ID")
    ),
    request_body(content = CirculationRequest, description = "Borrower, staff only"),
    responses(
        (status = 200, description = "Loan renewed", body = BorrowingResponse),
        (status = 409, description = "No active borrowing or reservations pending", body = crate::error::ErrorResponse)
    )
)]
pub async fn renew(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<i64>,
    body: CirculationBody,
) -> AppResult<Json<BorrowingResponse>> {
    let user_id = acting_for(&claims, body)?;

    let borrowing = state.services.circulation.renew(book_id, user_id).await?;

    Ok(Json(BorrowingResponse {
        status: "success".to_string(),
        message: "Renewed".to_string(),
        borrowing,
    }))
}

/// Join a book's reservation queue
#[utoipa::path(
    post,
    path = "/books/{id}/reserve",
    tag = "circulation",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Book ID")
    ),
    request_body(content = CirculationRequest, description = "Reserving user, staff only"),
    responses(
        (status = 201, description = "Reservation created", body = ReservationResponse),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Already reserved", body = crate::error::ErrorResponse)
    )
)]
pub async fn reserve(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<i64>,
    body: CirculationBody,
) -> AppResult<(StatusCode, Json<ReservationResponse>)> {
    let user_id = acting_for(&claims, body)?;

    let reservation = state.services.circulation.reserve(book_id, user_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(ReservationResponse {
            status: "success".to_string(),
            message: "Reserved".to_string(),
            reservation: Some(reservation),
        }),
    ))
}

/// Pending reservations of a book, in the order they will be served
#[utoipa::path(
    get,
    path = "/books/{id}/reservations",
    tag = "circulation",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Reservation queue", body = Vec<Reservation>),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn book_queue(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<i64>,
) -> AppResult<Json<Vec<Reservation>>> {
    claims.require_staff()?;

    let queue = state.services.circulation.book_queue(book_id).await?;
    Ok(Json(queue))
}

/// Fulfil the head of a book's reservation queue
#[utoipa::path(
    post,
    path = "/books/{id}/queue/process",
    tag = "circulation",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Queue processed", body = ReservationResponse)
    )
)]
pub async fn process_queue(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(book_id): Path<i64>,
) -> AppResult<Json<ReservationResponse>> {
    claims.require_staff()?;

    let reservation = state
        .services
        .circulation
        .process_reservation_queue(book_id)
        .await?;

    let message = match reservation {
        Some(_) => "Reservation fulfilled",
        None => "No pending reservations",
    };

    Ok(Json(ReservationResponse {
        status: "success".to_string(),
        message: message.to_string(),
        reservation,
    }))
}

/// Cancel a pending reservation
#[utoipa::path(
    delete,
    path = "/reservations/{id}",
    tag = "circulation",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "Reservation ID")
    ),
    responses(
        (status = 200, description = "Reservation cancelled", body = ReservationResponse),
        (status = 404, description = "Reservation not found", body = crate::error::ErrorResponse),
        (status = 422, description = "Reservation no longer pending", body = crate::error::ErrorResponse)
    )
)]
pub async fn cancel_reservation(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(reservation_id): Path<i64>,
) -> AppResult<Json<ReservationResponse>> {
    let requester = if claims.is_staff() {
        None
    } else {
        Some(claims.user_id)
    };

    let reservation = state
        .services
        .circulation
        .cancel_reservation(reservation_id, requester)
        .await?;

    Ok(Json(ReservationResponse {
        status: "success".to_string(),
        message: "Cancelled".to_string(),
        reservation: Some(reservation),
    }))
}

/// Send overdue reminders to every borrower past the grace period
#[utoipa::path(
    post,
    path = "/circulation/reminders",
    tag = "circulation",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Reminders sent", body = RemindersResponse)
    )
)]
pub async fn send_reminders(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<RemindersResponse>> {
    claims.require_staff()?;

    let sent = state.services.circulation.send_overdue_reminders(None).await?;

    Ok(Json(RemindersResponse {
        status: "success".to_string(),
        message: format!("{} reminder(s) sent", sent),
        sent,
    }))
}

/// Loans of a user with running fines
#[utoipa::path(
    get,
    path = "/users/{id}/borrowings",
    tag = "circulation",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "User ID"),
        BorrowingsQuery
    ),
    responses(
        (status = 200, description = "User's borrowings", body = Vec<BorrowingDetails>),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn user_borrowings(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i64>,
    Query(query): Query<BorrowingsQuery>,
) -> AppResult<Json<Vec<BorrowingDetails>>> {
    claims.require_self_or_staff(user_id)?;

    let borrowings = state
        .services
        .circulation
        .user_borrowings(user_id, query.active.unwrap_or(false))
        .await?;
    Ok(Json(borrowings))
}

/// Reservations of a user with queue positions
#[utoipa::path(
    get,
    path = "/users/{id}/reservations",
    tag = "circulation",
    security(("bearer_auth" = [])),
    params(
        ("id" = i64, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User's reservations", body = Vec<ReservationDetails>),
        (status = 404, description = "User not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn user_reservations(
    State(state): State<crate::AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<i64>,
) -> AppResult<Json<Vec<ReservationDetails>>> {
    claims.require_self_or_staff(user_id)?;

    let reservations = state.services.circulation.user_reservations(user_id).await?;
    Ok(Json(reservations))
}
