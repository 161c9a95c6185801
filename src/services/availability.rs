use chrono::{DateTime as ChronoDateTime, Utc};
use mongodb::bson::{doc, oid::ObjectId, Bson, DateTime, Document};

use crate::db::{DbConn, BOOKINGS};
use crate::models::{Booking, BookingStatus, CarListQuery};
use crate::utils::ApiError;

pub const DEFAULT_SORT: &str = "createdAt";

const SORTABLE_FIELDS: [&str; 6] = ["createdAt", "pricePerDay", "year", "make", "mileage", "seats"];

/// Requested rental window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DateRange {
    pub pickup: ChronoDateTime<Utc>,
    pub return_date: ChronoDateTime<Utc>,
}

pub struct AvailabilityService;

impl AvailabilityService {
    /// Bookings that hold a car and share at least one instant with `range`.
    pub fn blocking_overlap_filter(range: &DateRange) -> Document {
        doc! {
            "status": { "$in": BookingStatus::blocking_names() },
            "pickupDate": { "$lte": DateTime::from_chrono(range.return_date) },
            "returnDate": { "$gte": DateTime::from_chrono(range.pickup) },
        }
    }

    pub async fn find_conflict(
        db: &DbConn,
        car_id: ObjectId,
        range: &DateRange,
        exclude_booking: Option<ObjectId>,
    ) -> Result<Option<Booking>, ApiError> {
        let mut filter = Self::blocking_overlap_filter(range);
        filter.insert("car", car_id);
        if let Some(id) = exclude_booking {
            filter.insert("_id", doc! { "$ne": id });
        }

        db.collection::<Booking>(BOOKINGS)
            .find_one(filter, None)
            .await
            .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))
    }

    /// Ids of every car held by a blocking booking during `range`.
    pub async fn booked_car_ids(db: &DbConn, range: &DateRange) -> Result<Vec<Bson>, ApiError> {
        db.collection::<Booking>(BOOKINGS)
            .distinct("car", Self::blocking_overlap_filter(range), None)
            .await
            .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))
    }

    /// Case-insensitive substring match; user input is escaped.
    pub fn location_match(location: &str) -> Document {
        doc! { "$regex": regex::escape(location.trim()), "$options": "i" }
    }

    /// Inventory filter for the car listing. `booked` is `Some` when a date
    /// range was requested, in which case availability comes from the
    /// bookings rather than the `isAvailable` flag.
    pub fn car_filter(query: &CarListQuery, booked: Option<Vec<Bson>>) -> Document {
        let mut filter = doc! { "isActive": true };

        if let Some(ref location) = query.location {
            if !location.trim().is_empty() {
                filter.insert("location", Self::location_match(location));
            }
        }
        if let Some(car_type) = query.car_type {
            filter.insert("type", car_type.as_str());
        }
        if let Some(transmission) = query.transmission {
            filter.insert("transmission", transmission.as_str());
        }
        if let Some(fuel) = query.fuel {
            filter.insert("fuel", fuel.as_str());
        }
        if let Some(seats) = query.seats {
            filter.insert("seats", seats);
        }

        if query.min_price.is_some() || query.max_price.is_some() {
            let mut price = Document::new();
            if let Some(min) = query.min_price {
                price.insert("$gte", min);
            }
            if let Some(max) = query.max_price {
                price.insert("$lte", max);
            }
            filter.insert("pricePerDay", price);
        }

        match booked {
            Some(ids) => {
                filter.insert("_id", doc! { "$nin": ids });
            }
            None => {
                filter.insert("isAvailable", true);
            }
        }

        filter
    }

    /// `sort` names one whitelisted field, `-` prefixed for descending.
    /// Anything else sorts by creation time.
    pub fn sort_document(sort: Option<&str>) -> Document {
        let sort = sort.map(str::trim).unwrap_or(DEFAULT_SORT);
        let (field, direction) = match sort.strip_prefix('-') {
            Some(field) => (field, -1),
            None => (sort, 1),
        };

        if SORTABLE_FIELDS.contains(&field) {
            doc! { field: direction }
        } else {
            doc! { DEFAULT_SORT: 1 }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CarType, Fuel};
    use chrono::TimeZone;

    fn empty_query() -> CarListQuery {
        CarListQuery {
            location: None,
            car_type: None,
            transmission: None,
            fuel: None,
            seats: None,
            min_price: None,
            max_price: None,
            pickup_date: None,
            return_date: None,
            page: None,
            limit: None,
            sort: None,
        }
    }

    #[test]
    fn overlap_filter_uses_closed_interval_on_blocking_statuses() {
        let range = DateRange {
            pickup: Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap(),
            return_date: Utc.with_ymd_and_hms(2024, 1, 12, 0, 0, 0).unwrap(),
        };
        let filter = AvailabilityService::blocking_overlap_filter(&range);

        let statuses = filter.get_document("status").unwrap().get_array("$in").unwrap();
        assert_eq!(statuses, &vec![Bson::from("confirmed"), Bson::from("active")]);

        let pickup_bound = filter.get_document("pickupDate").unwrap().get_datetime("$lte").unwrap();
        assert_eq!(pickup_bound.to_chrono(), range.return_date);
        let return_bound = filter.get_document("returnDate").unwrap().get_datetime("$gte").unwrap();
        assert_eq!(return_bound.to_chrono(), range.pickup);
    }

    #[test]
    fn without_dates_only_available_active_cars_match() {
        let filter = AvailabilityService::car_filter(&empty_query(), None);
        assert_eq!(filter, doc! { "isActive": true, "isAvailable": true });
    }

    #[test]
    fn with_dates_booked_cars_are_excluded_instead_of_flag() {
        let booked = vec![Bson::ObjectId(ObjectId::new())];
        let filter = AvailabilityService::car_filter(&empty_query(), Some(booked.clone()));
        assert!(filter.get_bool("isActive").unwrap());
        assert!(!filter.contains_key("isAvailable"));
        assert_eq!(filter.get_document("_id").unwrap().get_array("$nin").unwrap(), &booked);
    }

    #[test]
    fn attribute_and_price_filters_are_applied() {
        let query = CarListQuery {
            location: Some("new york (jfk)".into()),
            car_type: Some(CarType::Suv),
            fuel: Some(Fuel::Electric),
            seats: Some(7),
            min_price: Some(20.0),
            max_price: Some(90.0),
            ..empty_query()
        };
        let filter = AvailabilityService::car_filter(&query, None);

        assert_eq!(filter.get_str("type").unwrap(), "suv");
        assert_eq!(filter.get_str("fuel").unwrap(), "electric");
        assert_eq!(filter.get_i32("seats").unwrap(), 7);
        assert_eq!(
            filter.get_document("pricePerDay").unwrap(),
            &doc! { "$gte": 20.0, "$lte": 90.0 }
        );
        let location = filter.get_document("location").unwrap();
        assert_eq!(location.get_str("$regex").unwrap(), r"new york \(jfk\)");
        assert_eq!(location.get_str("$options").unwrap(), "i");
    }

    #[test]
    fn sort_accepts_whitelisted_fields_with_direction() {
        assert_eq!(AvailabilityService::sort_document(None), doc! { "createdAt": 1 });
        assert_eq!(AvailabilityService::sort_document(Some("-pricePerDay")), doc! { "pricePerDay": -1 });
        assert_eq!(AvailabilityService::sort_document(Some("year")), doc! { "year": 1 });
        assert_eq!(AvailabilityService::sort_document(Some("$where")), doc! { "createdAt": 1 });
    }
}
