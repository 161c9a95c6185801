use std::str::FromStr;

use chrono::Utc;
use log::info;
use mongodb::bson::{doc, DateTime, Document};
use mongodb::options::FindOptions;
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use serde_json::json;
use validator::Validate;

use crate::db::{self, DbConn, BOOKINGS};
use crate::guards::{AdminGuard, AuthGuard};
use crate::models::{
    check_cancellable, Booking, BookingListQuery, BookingStatus, CancelBookingDto,
    CreateBookingDto, MyBookingsQuery, PaymentMethod, PaymentStatus, UpdatePaymentDto,
    UpdateStatusDto,
};
use crate::services::availability::DateRange;
use crate::services::booking::{NewBooking, UserDetail};
use crate::services::BookingService;
use crate::utils::{parse_object_id, require_date, ApiError, ApiResponse, Page};

async fn find_booking(db: &DbConn, id: &str) -> Result<Booking, ApiError> {
    BookingService::find(db, parse_object_id(id, "booking")?).await
}

/// Newest-first page of bookings matching `filter`, populated per `detail`.
async fn list_page(
    db: &DbConn,
    filter: Document,
    page: Page,
    detail: UserDetail,
) -> Result<serde_json::Value, ApiError> {
    let collection = db.collection::<Booking>(BOOKINGS);

    let total = collection
        .count_documents(filter.clone(), None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?;

    let options = FindOptions::builder()
        .sort(doc! { "createdAt": -1 })
        .skip(page.skip())
        .limit(page.limit)
        .build();
    let cursor = collection
        .find(filter, options)
        .await
        .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?;

    let bookings = BookingService::populate(db, db::collect(cursor).await?, detail).await?;

    Ok(json!({
        "count": bookings.len(),
        "total": total,
        "totalPages": page.total_pages(total),
        "currentPage": page.page,
        "bookings": bookings,
    }))
}

#[openapi(tag = "Bookings")]
#[post("/bookings", data = "<dto>")]
pub async fn create_booking(
    db: &State<DbConn>,
    auth: AuthGuard,
    dto: Json<CreateBookingDto>,
) -> Result<status::Custom<Json<ApiResponse<serde_json::Value>>>, ApiError> {
    dto.validate()?;
    let dto = dto.into_inner();

    let input = NewBooking {
        user_id: auth.user_id,
        car_id: parse_object_id(&dto.car_id, "car")?,
        range: DateRange {
            pickup: require_date(&dto.pickup_date, "pickupDate")?,
            return_date: require_date(&dto.return_date, "returnDate")?,
        },
        pickup_location: dto.pickup_location,
        return_location: dto.return_location,
        notes: dto.notes,
    };

    let booking = BookingService::create(db, input).await?;
    let booking = BookingService::populate_one(db, booking, UserDetail::Contact).await?;

    Ok(status::Custom(
        Status::Created,
        Json(ApiResponse::success_with_message(
            "Booking created successfully",
            json!({ "booking": booking }),
        )),
    ))
}

#[openapi(tag = "Bookings")]
#[get("/bookings/my-bookings?<query..>")]
pub async fn my_bookings(
    db: &State<DbConn>,
    auth: AuthGuard,
    query: MyBookingsQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let mut filter = doc! { "user": auth.user_id };
    if let Some(status) = query.status {
        filter.insert("status", status.as_str());
    }

    let page = Page::new(query.page, query.limit);
    let data = list_page(db, filter, page, UserDetail::None).await?;
    Ok(Json(ApiResponse::success(data)))
}

#[openapi(tag = "Bookings")]
#[get("/bookings/<id>")]
pub async fn get_booking(
    db: &State<DbConn>,
    auth: AuthGuard,
    id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let booking = find_booking(db, &id).await?;
    if !booking.is_owned_by(&auth.user_id) && !auth.is_admin() {
        return Err(ApiError::forbidden("Not authorized to view this booking"));
    }

    let booking = BookingService::populate_one(db, booking, UserDetail::Full).await?;
    Ok(Json(ApiResponse::success(json!({ "booking": booking }))))
}

/// The body is optional; without one the booking is cancelled with no reason.
#[openapi(tag = "Bookings")]
#[patch("/bookings/<id>/cancel", data = "<dto>")]
pub async fn cancel_booking(
    db: &State<DbConn>,
    auth: AuthGuard,
    id: String,
    dto: Option<Json<CancelBookingDto>>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let dto = dto.map(Json::into_inner).unwrap_or_default();
    dto.validate()?;
    let booking = find_booking(db, &id).await?;
    if !booking.is_owned_by(&auth.user_id) && !auth.is_admin() {
        return Err(ApiError::forbidden("Not authorized to cancel this booking"));
    }

    check_cancellable(
        booking.status,
        booking.pickup_date.to_chrono(),
        Utc::now(),
        auth.is_admin(),
    )?;

    let booking =
        BookingService::write_status(db, &booking, BookingStatus::Cancelled, dto.reason).await?;
    info!("booking {} cancelled by {}", id, auth.user_id);

    let booking = BookingService::populate_one(db, booking, UserDetail::Contact).await?;
    Ok(Json(ApiResponse::success_with_message(
        "Booking cancelled successfully",
        json!({ "booking": booking }),
    )))
}

// ==================== ADMIN ====================

#[openapi(tag = "Bookings - Admin")]
#[get("/bookings?<query..>")]
pub async fn all_bookings(
    db: &State<DbConn>,
    _admin: AdminGuard,
    query: BookingListQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let mut filter = Document::new();
    if let Some(status) = query.status {
        filter.insert("status", status.as_str());
    }
    if let Some(ref user_id) = query.user_id {
        filter.insert("user", parse_object_id(user_id, "user")?);
    }
    if let Some(ref car_id) = query.car_id {
        filter.insert("car", parse_object_id(car_id, "car")?);
    }

    let page = Page::new(query.page, query.limit);
    let data = list_page(db, filter, page, UserDetail::Contact).await?;
    Ok(Json(ApiResponse::success(data)))
}

#[openapi(tag = "Bookings - Admin")]
#[get("/bookings/stats")]
pub async fn booking_stats(
    db: &State<DbConn>,
    _admin: AdminGuard,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let stats = BookingService::stats(db).await?;
    Ok(Json(ApiResponse::success(json!({ "stats": stats }))))
}

#[openapi(tag = "Bookings - Admin")]
#[patch("/bookings/<id>/status", data = "<dto>")]
pub async fn update_status(
    db: &State<DbConn>,
    admin: AdminGuard,
    id: String,
    dto: Json<UpdateStatusDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let next = BookingStatus::from_str(dto.status.trim())
        .map_err(|_| ApiError::bad_request("Invalid status"))?;

    let booking = find_booking(db, &id).await?;
    let booking = BookingService::change_status(db, &booking, next).await?;
    info!("booking {} set to {} by admin {}", id, next, admin.auth.user_id);

    let booking = BookingService::populate_one(db, booking, UserDetail::Contact).await?;
    Ok(Json(ApiResponse::success_with_message(
        format!("Booking {} successfully", next),
        json!({ "booking": booking }),
    )))
}

#[openapi(tag = "Bookings - Admin")]
#[patch("/bookings/<id>/payment", data = "<dto>")]
pub async fn update_payment(
    db: &State<DbConn>,
    _admin: AdminGuard,
    id: String,
    dto: Json<UpdatePaymentDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let booking_id = parse_object_id(&id, "booking")?;
    let payment_status = PaymentStatus::from_str(dto.payment_status.trim())
        .map_err(|_| ApiError::bad_request("Invalid payment status"))?;

    let mut set = doc! { "paymentStatus": payment_status.as_str(), "updatedAt": DateTime::now() };
    if let Some(ref method) = dto.payment_method {
        let method = PaymentMethod::from_str(method.trim())
            .map_err(|_| ApiError::bad_request("Invalid payment method"))?;
        set.insert("paymentMethod", method.as_str());
    }

    let result = db
        .collection::<Booking>(BOOKINGS)
        .update_one(doc! { "_id": booking_id }, doc! { "$set": set }, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to update booking: {}", e)))?;
    if result.matched_count == 0 {
        return Err(ApiError::not_found("Booking not found"));
    }

    let booking = BookingService::find(db, booking_id).await?;
    let booking = BookingService::populate_one(db, booking, UserDetail::Contact).await?;
    Ok(Json(ApiResponse::success_with_message(
        "Payment status updated successfully",
        json!({ "booking": booking }),
    )))
}
