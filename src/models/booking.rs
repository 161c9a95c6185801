use std::fmt;
use std::str::FromStr;

use chrono::{DateTime as ChronoDateTime, Utc};
use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;
use thiserror::Error;
use validator::Validate;

use crate::models::{CarSummary, UserSummary};
use crate::utils::validation::{validate_iso_date, validate_object_id};
use crate::utils::ApiError;

pub const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Non-admin callers cannot cancel once pickup is closer than this.
pub const CANCELLATION_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, JsonSchema, FromFormField)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Active,
    Completed,
    Cancelled,
}

impl BookingStatus {
    /// Statuses that hold the car for their date range.
    pub const BLOCKING: [BookingStatus; 2] = [BookingStatus::Confirmed, BookingStatus::Active];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Active => "active",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    pub fn blocks_car(&self) -> bool {
        Self::BLOCKING.contains(self)
    }

    /// Entering this status from `current` claims the car, so the calendar
    /// must be checked again.
    pub fn claims_car_from(&self, current: BookingStatus) -> bool {
        self.blocks_car() && !current.blocks_car()
    }

    /// Document field stamped when a booking enters this status.
    pub fn timestamp_field(&self) -> Option<&'static str> {
        match self {
            BookingStatus::Confirmed => Some("confirmedAt"),
            BookingStatus::Completed => Some("completedAt"),
            BookingStatus::Cancelled => Some("cancelledAt"),
            BookingStatus::Pending | BookingStatus::Active => None,
        }
    }

    pub fn blocking_names() -> Vec<&'static str> {
        Self::BLOCKING.iter().map(|s| s.as_str()).collect()
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "active" => Ok(BookingStatus::Active),
            "completed" => Ok(BookingStatus::Completed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "refunded" => Ok(PaymentStatus::Refunded),
            "failed" => Ok(PaymentStatus::Failed),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    Cash,
    Online,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Cash => "cash",
            PaymentMethod::Online => "online",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "card" => Ok(PaymentMethod::Card),
            "cash" => Ok(PaymentMethod::Cash),
            "online" => Ok(PaymentMethod::Online),
            _ => Err(()),
        }
    }
}

/// Business-rule violations, reported to clients as 400s.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BookingRuleError {
    #[error("Car is not available for booking")]
    CarUnavailable,
    #[error("Return date must be after pickup date")]
    ReturnNotAfterPickup,
    #[error("Pickup date cannot be in the past")]
    PickupInPast,
    #[error("Car is not available for the selected dates")]
    DatesUnavailable,
    #[error("Booking cannot be cancelled")]
    NotCancellable,
    #[error("Cannot cancel booking within 24 hours of pickup")]
    TooLateToCancel,
}

impl From<BookingRuleError> for ApiError {
    fn from(err: BookingRuleError) -> Self {
        ApiError::bad_request(err.to_string())
    }
}

/// Closed-interval overlap: `[a_start, a_end]` and `[b_start, b_end]` share
/// at least one instant, touching endpoints included.
pub fn intervals_overlap<T: PartialOrd>(a_start: T, a_end: T, b_start: T, b_end: T) -> bool {
    a_start <= b_end && a_end >= b_start
}

/// Whole rental days, rounding any partial day up.
pub fn rental_days(pickup: ChronoDateTime<Utc>, return_date: ChronoDateTime<Utc>) -> i64 {
    let ms = (return_date - pickup).num_milliseconds();
    if ms <= 0 {
        return 0;
    }
    (ms + DAY_MS - 1) / DAY_MS
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceQuote {
    pub total_days: i64,
    pub price_per_day: f64,
    pub total_amount: f64,
}

pub fn quote(
    pickup: ChronoDateTime<Utc>,
    return_date: ChronoDateTime<Utc>,
    price_per_day: f64,
) -> PriceQuote {
    let total_days = rental_days(pickup, return_date);
    PriceQuote {
        total_days,
        price_per_day,
        total_amount: total_days as f64 * price_per_day,
    }
}

/// Return must follow pickup.
pub fn check_date_order(
    pickup: ChronoDateTime<Utc>,
    return_date: ChronoDateTime<Utc>,
) -> Result<(), BookingRuleError> {
    if return_date <= pickup {
        return Err(BookingRuleError::ReturnNotAfterPickup);
    }
    Ok(())
}

/// Date checks for a new booking, in the order they are reported.
pub fn check_booking_window(
    pickup: ChronoDateTime<Utc>,
    return_date: ChronoDateTime<Utc>,
    now: ChronoDateTime<Utc>,
) -> Result<(), BookingRuleError> {
    check_date_order(pickup, return_date)?;
    if pickup < now {
        return Err(BookingRuleError::PickupInPast);
    }
    Ok(())
}

pub fn check_cancellable(
    status: BookingStatus,
    pickup: ChronoDateTime<Utc>,
    now: ChronoDateTime<Utc>,
    is_admin: bool,
) -> Result<(), BookingRuleError> {
    if status.is_terminal() {
        return Err(BookingRuleError::NotCancellable);
    }
    let ms_until_pickup = (pickup - now).num_milliseconds();
    if !is_admin && ms_until_pickup < CANCELLATION_WINDOW_HOURS * 60 * 60 * 1000 {
        return Err(BookingRuleError::TooLateToCancel);
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    #[serde(rename = "user")]
    pub user_id: ObjectId,
    #[serde(rename = "car")]
    pub car_id: ObjectId,
    pub pickup_date: DateTime,
    pub return_date: DateTime,
    pub pickup_location: String,
    pub return_location: String,
    pub total_days: i64,
    pub price_per_day: f64,
    pub total_amount: f64,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub confirmed_at: Option<DateTime>,
    pub completed_at: Option<DateTime>,
    pub cancelled_at: Option<DateTime>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Booking {
    pub fn is_owned_by(&self, user_id: &ObjectId) -> bool {
        &self.user_id == user_id
    }
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingDto {
    #[validate(custom = "validate_object_id")]
    pub car_id: String,
    #[validate(custom = "validate_iso_date")]
    pub pickup_date: String,
    #[validate(custom = "validate_iso_date")]
    pub return_date: String,
    #[validate(length(min = 2, max = 100, message = "Pickup location must be between 2 and 100 characters"))]
    pub pickup_location: String,
    #[validate(length(min = 2, max = 100, message = "Return location must be between 2 and 100 characters"))]
    pub return_location: String,
    #[validate(length(max = 500, message = "Notes must be less than 500 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateStatusDto {
    pub status: String,
}

#[derive(Debug, Default, Deserialize, Validate, JsonSchema)]
pub struct CancelBookingDto {
    #[validate(length(max = 200, message = "Cancellation reason must be less than 200 characters"))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePaymentDto {
    pub payment_status: String,
    pub payment_method: Option<String>,
}

#[derive(Debug, FromForm, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookingListQuery {
    pub status: Option<BookingStatus>,
    #[field(name = "userId")]
    pub user_id: Option<String>,
    #[field(name = "carId")]
    pub car_id: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, FromForm, Deserialize, JsonSchema)]
pub struct MyBookingsQuery {
    pub status: Option<BookingStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookingResponse {
    pub id: String,
    pub user_id: String,
    pub car_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub car: Option<CarSummary>,
    pub pickup_date: ChronoDateTime<Utc>,
    pub return_date: ChronoDateTime<Utc>,
    pub pickup_location: String,
    pub return_location: String,
    pub total_days: i64,
    pub price_per_day: f64,
    pub total_amount: f64,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub confirmed_at: Option<ChronoDateTime<Utc>>,
    pub completed_at: Option<ChronoDateTime<Utc>>,
    pub cancelled_at: Option<ChronoDateTime<Utc>>,
    pub created_at: ChronoDateTime<Utc>,
    pub updated_at: ChronoDateTime<Utc>,
}

impl From<Booking> for BookingResponse {
    fn from(booking: Booking) -> Self {
        BookingResponse {
            id: booking.id.map(|id| id.to_hex()).unwrap_or_default(),
            user_id: booking.user_id.to_hex(),
            car_id: booking.car_id.to_hex(),
            user: None,
            car: None,
            pickup_date: booking.pickup_date.to_chrono(),
            return_date: booking.return_date.to_chrono(),
            pickup_location: booking.pickup_location,
            return_location: booking.return_location,
            total_days: booking.total_days,
            price_per_day: booking.price_per_day,
            total_amount: booking.total_amount,
            status: booking.status,
            payment_status: booking.payment_status,
            payment_method: booking.payment_method,
            notes: booking.notes,
            cancellation_reason: booking.cancellation_reason,
            confirmed_at: booking.confirmed_at.map(|d| d.to_chrono()),
            completed_at: booking.completed_at.map(|d| d.to_chrono()),
            cancelled_at: booking.cancelled_at.map(|d| d.to_chrono()),
            created_at: booking.created_at.to_chrono(),
            updated_at: booking.updated_at.to_chrono(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(y: i32, m: u32, d: u32, h: u32) -> ChronoDateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn two_day_rental_at_fifty_costs_one_hundred() {
        let q = quote(at(2024, 1, 1, 10), at(2024, 1, 3, 10), 50.0);
        assert_eq!(q.total_days, 2);
        assert_eq!(q.total_amount, 100.0);
        assert_eq!(q.price_per_day, 50.0);
    }

    #[test]
    fn partial_days_round_up() {
        let pickup = at(2024, 1, 1, 10);
        assert_eq!(rental_days(pickup, pickup + Duration::milliseconds(1)), 1);
        assert_eq!(rental_days(pickup, pickup + Duration::hours(24)), 1);
        assert_eq!(rental_days(pickup, pickup + Duration::hours(25)), 2);
        assert_eq!(quote(pickup, pickup + Duration::hours(49), 30.0).total_amount, 90.0);
    }

    #[test]
    fn overlapping_range_on_confirmed_booking_is_detected() {
        // Existing confirmed booking Jan 5..Jan 10, request Jan 8..Jan 12.
        assert!(intervals_overlap(at(2024, 1, 5, 0), at(2024, 1, 10, 0), at(2024, 1, 8, 0), at(2024, 1, 12, 0)));
    }

    #[test]
    fn overlap_is_closed_at_both_ends() {
        let (a, b) = (at(2024, 1, 5, 0), at(2024, 1, 10, 0));
        // Request starting exactly when the existing booking ends.
        assert!(intervals_overlap(a, b, b, at(2024, 1, 12, 0)));
        // Request ending exactly when the existing booking starts.
        assert!(intervals_overlap(a, b, at(2024, 1, 1, 0), a));
        // Request contained inside and request enclosing.
        assert!(intervals_overlap(a, b, at(2024, 1, 6, 0), at(2024, 1, 7, 0)));
        assert!(intervals_overlap(a, b, at(2024, 1, 1, 0), at(2024, 1, 20, 0)));
    }

    #[test]
    fn disjoint_ranges_do_not_overlap() {
        let (a, b) = (at(2024, 1, 5, 0), at(2024, 1, 10, 0));
        assert!(!intervals_overlap(a, b, at(2024, 1, 10, 1), at(2024, 1, 12, 0)));
        assert!(!intervals_overlap(a, b, at(2024, 1, 1, 0), at(2024, 1, 4, 23)));
    }

    #[test]
    fn return_not_after_pickup_is_rejected() {
        let now = at(2024, 1, 1, 0);
        let pickup = at(2024, 2, 1, 10);
        assert_eq!(
            check_booking_window(pickup, pickup, now),
            Err(BookingRuleError::ReturnNotAfterPickup)
        );
        assert_eq!(
            check_booking_window(pickup, pickup - Duration::hours(1), now),
            Err(BookingRuleError::ReturnNotAfterPickup)
        );
        assert!(check_booking_window(pickup, pickup + Duration::hours(1), now).is_ok());
    }

    #[test]
    fn past_pickup_is_rejected_after_date_order() {
        let now = at(2024, 3, 1, 0);
        assert_eq!(
            check_booking_window(at(2024, 2, 1, 0), at(2024, 2, 3, 0), now),
            Err(BookingRuleError::PickupInPast)
        );
        // Inverted dates in the past report the ordering problem first.
        assert_eq!(
            check_booking_window(at(2024, 2, 3, 0), at(2024, 2, 1, 0), now),
            Err(BookingRuleError::ReturnNotAfterPickup)
        );
    }

    #[test]
    fn only_entering_a_blocking_status_from_a_free_one_rechecks() {
        use BookingStatus::*;
        let all = [Pending, Confirmed, Active, Completed, Cancelled];
        for from in all {
            for to in all {
                let expected = matches!(to, Confirmed | Active)
                    && matches!(from, Pending | Completed | Cancelled);
                assert_eq!(to.claims_car_from(from), expected, "{} -> {}", from, to);
            }
        }
        // Reopening a finished booking claims the car again.
        assert!(Active.claims_car_from(Completed));
        assert!(!Pending.claims_car_from(Completed));
    }

    #[test]
    fn only_confirmed_and_active_block_the_car() {
        assert!(BookingStatus::Confirmed.blocks_car());
        assert!(BookingStatus::Active.blocks_car());
        assert!(!BookingStatus::Pending.blocks_car());
        assert!(!BookingStatus::Completed.blocks_car());
        assert_eq!(BookingStatus::blocking_names(), vec!["confirmed", "active"]);
    }

    #[test]
    fn terminal_bookings_cannot_be_cancelled_even_by_admin() {
        let now = at(2024, 1, 1, 0);
        let pickup = at(2024, 2, 1, 0);
        for status in [BookingStatus::Completed, BookingStatus::Cancelled] {
            assert_eq!(check_cancellable(status, pickup, now, false), Err(BookingRuleError::NotCancellable));
            assert_eq!(check_cancellable(status, pickup, now, true), Err(BookingRuleError::NotCancellable));
        }
    }

    #[test]
    fn late_cancellation_is_admin_only() {
        let pickup = at(2024, 1, 2, 10);
        let now = pickup - Duration::hours(23);
        assert_eq!(
            check_cancellable(BookingStatus::Confirmed, pickup, now, false),
            Err(BookingRuleError::TooLateToCancel)
        );
        assert!(check_cancellable(BookingStatus::Confirmed, pickup, now, true).is_ok());
    }

    #[test]
    fn cancellation_boundary_is_exactly_24_hours() {
        let pickup = at(2024, 1, 2, 10);
        assert!(check_cancellable(BookingStatus::Pending, pickup, pickup - Duration::hours(24), false).is_ok());
        assert!(
            check_cancellable(
                BookingStatus::Pending,
                pickup,
                pickup - Duration::hours(24) + Duration::milliseconds(1),
                false
            )
            .is_err()
        );
    }

    #[test]
    fn status_strings_parse_strictly() {
        assert_eq!("active".parse::<BookingStatus>(), Ok(BookingStatus::Active));
        assert!("Active".parse::<BookingStatus>().is_err());
        assert!("archived".parse::<BookingStatus>().is_err());
        assert_eq!("refunded".parse::<PaymentStatus>(), Ok(PaymentStatus::Refunded));
        assert!("cheque".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn booking_payload_requires_object_id_and_iso_dates() {
        let dto: CreateBookingDto = serde_json::from_value(serde_json::json!({
            "carId": "123",
            "pickupDate": "tomorrow",
            "returnDate": "2024-01-03T10:00:00Z",
            "pickupLocation": "Airport",
            "returnLocation": "A"
        }))
        .unwrap();
        let errors = dto.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("car_id"));
        assert!(fields.contains_key("pickup_date"));
        assert!(fields.contains_key("return_location"));
        assert!(!fields.contains_key("return_date"));
    }
}
