use std::collections::HashMap;

use chrono::{Datelike, TimeZone, Utc};
use log::info;
use mongodb::bson::{doc, oid::ObjectId, DateTime, Document};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;

use crate::db::{self, DbConn, BOOKINGS, CARS, USERS};
use crate::models::{
    check_booking_window, quote, Booking, BookingResponse, BookingRuleError, BookingStatus, Car,
    CarSummary, PaymentMethod, PaymentStatus, User, UserSummary,
};
use crate::services::availability::{AvailabilityService, DateRange};
use crate::services::CarLock;
use crate::utils::ApiError;

/// Validated input for a new booking.
pub struct NewBooking {
    pub user_id: ObjectId,
    pub car_id: ObjectId,
    pub range: DateRange,
    pub pickup_location: String,
    pub return_location: String,
    pub notes: Option<String>,
}

/// How much of the referenced user to embed in a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserDetail {
    None,
    Contact,
    Full,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusStat {
    #[serde(rename = "_id")]
    pub status: String,
    pub count: i64,
    pub total_revenue: f64,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MonthlyStat {
    #[serde(rename = "_id")]
    pub month: i32,
    pub count: i64,
    pub revenue: f64,
}

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RevenueStat {
    pub total_revenue: f64,
    pub average_booking_value: f64,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookingStats {
    pub status_stats: Vec<StatusStat>,
    pub monthly_stats: Vec<MonthlyStat>,
    pub revenue: RevenueStat,
}

pub struct BookingService;

impl BookingService {
    pub async fn find(db: &DbConn, id: ObjectId) -> Result<Booking, ApiError> {
        db.collection::<Booking>(BOOKINGS)
            .find_one(doc! { "_id": id }, None)
            .await
            .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?
            .ok_or_else(|| ApiError::not_found("Booking not found"))
    }

    /// Validates and stores a pending booking. All checks run before the
    /// single insert, under the car's lock.
    pub async fn create(db: &DbConn, input: NewBooking) -> Result<Booking, ApiError> {
        let car = db
            .collection::<Car>(CARS)
            .find_one(doc! { "_id": input.car_id }, None)
            .await
            .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?
            .ok_or_else(|| ApiError::not_found("Car not found"))?;

        if !car.is_available || !car.is_active {
            return Err(BookingRuleError::CarUnavailable.into());
        }

        check_booking_window(input.range.pickup, input.range.return_date, Utc::now())?;

        let lock = CarLock::acquire(db, input.car_id).await?;
        let result = Self::insert_if_free(db, &lock, &input, &car).await;
        lock.release(db).await;
        result
    }

    async fn insert_if_free(
        db: &DbConn,
        lock: &CarLock,
        input: &NewBooking,
        car: &Car,
    ) -> Result<Booking, ApiError> {
        if AvailabilityService::find_conflict(db, input.car_id, &input.range, None)
            .await?
            .is_some()
        {
            return Err(BookingRuleError::DatesUnavailable.into());
        }

        let price = quote(input.range.pickup, input.range.return_date, car.price_per_day);
        let now = DateTime::now();
        let mut booking = Booking {
            id: None,
            user_id: input.user_id,
            car_id: input.car_id,
            pickup_date: DateTime::from_chrono(input.range.pickup),
            return_date: DateTime::from_chrono(input.range.return_date),
            pickup_location: input.pickup_location.trim().to_string(),
            return_location: input.return_location.trim().to_string(),
            total_days: price.total_days,
            price_per_day: price.price_per_day,
            total_amount: price.total_amount,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_method: PaymentMethod::Card,
            notes: input.notes.as_ref().map(|n| n.trim().to_string()),
            cancellation_reason: None,
            confirmed_at: None,
            completed_at: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        };

        lock.refresh(db).await?;
        let result = db
            .collection::<Booking>(BOOKINGS)
            .insert_one(&booking, None)
            .await
            .map_err(|e| ApiError::internal_error(format!("Failed to create booking: {}", e)))?;

        booking.id = result.inserted_id.as_object_id();
        info!(
            "booking {:?} created for car {} ({} days, {:.2})",
            booking.id, booking.car_id, booking.total_days, booking.total_amount
        );
        Ok(booking)
    }

    /// Moves `booking` to `next`, stamping the matching timestamp. The write
    /// is conditional on the status that was read, so a concurrent change
    /// surfaces as a conflict instead of being overwritten.
    pub async fn write_status(
        db: &DbConn,
        booking: &Booking,
        next: BookingStatus,
        cancellation_reason: Option<String>,
    ) -> Result<Booking, ApiError> {
        let id = booking
            .id
            .ok_or_else(|| ApiError::internal_error("Booking without id"))?;
        let now = DateTime::now();

        let mut set = doc! { "status": next.as_str(), "updatedAt": now };
        if let Some(field) = next.timestamp_field() {
            set.insert(field, now);
        }
        if next == BookingStatus::Cancelled {
            if let Some(reason) = cancellation_reason {
                set.insert("cancellationReason", reason.trim());
            }
        }

        let result = db
            .collection::<Booking>(BOOKINGS)
            .update_one(
                doc! { "_id": id, "status": booking.status.as_str() },
                doc! { "$set": set },
                None,
            )
            .await
            .map_err(|e| ApiError::internal_error(format!("Failed to update booking: {}", e)))?;

        if result.matched_count == 0 {
            return Err(ApiError::conflict(
                "Booking was modified by another request. Please reload and retry.",
            ));
        }

        info!("booking {} moved {} -> {}", id, booking.status, next);
        Self::find(db, id).await
    }

    /// Admin status change. Any status may be set from any other; entering a
    /// status that holds the car re-checks the calendar under the car's lock.
    pub async fn change_status(
        db: &DbConn,
        booking: &Booking,
        next: BookingStatus,
    ) -> Result<Booking, ApiError> {
        if next.claims_car_from(booking.status) {
            let range = DateRange {
                pickup: booking.pickup_date.to_chrono(),
                return_date: booking.return_date.to_chrono(),
            };
            let lock = CarLock::acquire(db, booking.car_id).await?;
            let result = Self::confirm_if_free(db, &lock, booking, next, &range).await;
            lock.release(db).await;
            return result;
        }

        Self::write_status(db, booking, next, None).await
    }

    async fn confirm_if_free(
        db: &DbConn,
        lock: &CarLock,
        booking: &Booking,
        next: BookingStatus,
        range: &DateRange,
    ) -> Result<Booking, ApiError> {
        if AvailabilityService::find_conflict(db, booking.car_id, range, booking.id)
            .await?
            .is_some()
        {
            return Err(BookingRuleError::DatesUnavailable.into());
        }
        lock.refresh(db).await?;
        Self::write_status(db, booking, next, None).await
    }

    /// Replaces car and user references with summaries.
    pub async fn populate(
        db: &DbConn,
        bookings: Vec<Booking>,
        user_detail: UserDetail,
    ) -> Result<Vec<BookingResponse>, ApiError> {
        let mut car_ids: Vec<ObjectId> = bookings.iter().map(|b| b.car_id).collect();
        car_ids.sort();
        car_ids.dedup();

        let cars: HashMap<ObjectId, Car> = Self::load_by_ids::<Car>(db, CARS, car_ids)
            .await?
            .into_iter()
            .filter_map(|car| car.id.map(|id| (id, car)))
            .collect();

        let users: HashMap<ObjectId, User> = if user_detail == UserDetail::None {
            HashMap::new()
        } else {
            let mut user_ids: Vec<ObjectId> = bookings.iter().map(|b| b.user_id).collect();
            user_ids.sort();
            user_ids.dedup();
            Self::load_by_ids::<User>(db, USERS, user_ids)
                .await?
                .into_iter()
                .filter_map(|user| user.id.map(|id| (id, user)))
                .collect()
        };

        Ok(bookings
            .into_iter()
            .map(|booking| {
                let car = cars.get(&booking.car_id).map(CarSummary::from);
                let user = users.get(&booking.user_id).map(|u| match user_detail {
                    UserDetail::Full => UserSummary::detailed(u),
                    _ => UserSummary::contact(u),
                });
                let mut response = BookingResponse::from(booking);
                response.car = car;
                response.user = user;
                response
            })
            .collect())
    }

    pub async fn populate_one(
        db: &DbConn,
        booking: Booking,
        user_detail: UserDetail,
    ) -> Result<BookingResponse, ApiError> {
        Self::populate(db, vec![booking], user_detail)
            .await?
            .pop()
            .ok_or_else(|| ApiError::internal_error("Failed to populate booking"))
    }

    async fn load_by_ids<T>(db: &DbConn, collection: &str, ids: Vec<ObjectId>) -> Result<Vec<T>, ApiError>
    where
        T: serde::de::DeserializeOwned + Unpin + Send + Sync,
    {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let cursor = db
            .collection::<T>(collection)
            .find(doc! { "_id": { "$in": ids } }, None)
            .await
            .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?;
        db::collect(cursor).await
    }

    async fn aggregate<T>(db: &DbConn, pipeline: Vec<Document>) -> Result<Vec<T>, ApiError>
    where
        T: serde::de::DeserializeOwned,
    {
        let cursor = db
            .collection::<Document>(BOOKINGS)
            .aggregate(pipeline, None)
            .await
            .map_err(|e| ApiError::internal_error(format!("Aggregation error: {}", e)))?;

        db::collect(cursor)
            .await?
            .into_iter()
            .map(|row| {
                mongodb::bson::from_document(row)
                    .map_err(|e| ApiError::internal_error(format!("Deserialization error: {}", e)))
            })
            .collect()
    }

    pub async fn stats(db: &DbConn) -> Result<BookingStats, ApiError> {
        let status_stats = Self::aggregate::<StatusStat>(
            db,
            vec![doc! {
                "$group": {
                    "_id": "$status",
                    "count": { "$sum": 1 },
                    "totalRevenue": { "$sum": "$totalAmount" }
                }
            }],
        )
        .await?;

        let year = Utc::now().year();
        let year_start = Utc
            .with_ymd_and_hms(year, 1, 1, 0, 0, 0)
            .single()
            .ok_or_else(|| ApiError::internal_error("Invalid year boundary"))?;
        let next_year_start = Utc
            .with_ymd_and_hms(year + 1, 1, 1, 0, 0, 0)
            .single()
            .ok_or_else(|| ApiError::internal_error("Invalid year boundary"))?;

        let monthly_stats = Self::aggregate::<MonthlyStat>(
            db,
            vec![
                doc! {
                    "$match": {
                        "createdAt": {
                            "$gte": DateTime::from_chrono(year_start),
                            "$lt": DateTime::from_chrono(next_year_start)
                        }
                    }
                },
                doc! {
                    "$group": {
                        "_id": { "$month": "$createdAt" },
                        "count": { "$sum": 1 },
                        "revenue": { "$sum": "$totalAmount" }
                    }
                },
                doc! { "$sort": { "_id": 1 } },
            ],
        )
        .await?;

        let revenue = Self::aggregate::<RevenueStat>(
            db,
            vec![
                doc! { "$match": { "paymentStatus": PaymentStatus::Paid.as_str() } },
                doc! {
                    "$group": {
                        "_id": null,
                        "totalRevenue": { "$sum": "$totalAmount" },
                        "averageBookingValue": { "$avg": "$totalAmount" }
                    }
                },
            ],
        )
        .await?
        .pop()
        .unwrap_or_default();

        Ok(BookingStats {
            status_stats,
            monthly_stats,
            revenue,
        })
    }
}
