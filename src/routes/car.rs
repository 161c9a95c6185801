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

use crate::db::{self, is_duplicate_key, DbConn, BOOKINGS, CARS};
use crate::guards::AdminGuard;
use crate::models::{
    check_date_order, Booking, BookingStatus, Car, CarListQuery, CarResponse, CarSummary,
    CheckAvailabilityDto, CreateCarDto, DateRangeQuery, UpdateCarDto,
};
use crate::services::availability::DateRange;
use crate::services::AvailabilityService;
use crate::utils::validation::check_car_year;
use crate::utils::{parse_object_id, require_date, ApiError, ApiResponse, Page};

const DUPLICATE_PLATE: &str = "Car with this license plate already exists";

/// A date window is only applied when both ends are given.
fn requested_range(
    pickup: Option<&str>,
    return_date: Option<&str>,
) -> Result<Option<DateRange>, ApiError> {
    match (pickup, return_date) {
        (Some(pickup), Some(return_date)) => {
            let range = DateRange {
                pickup: require_date(pickup, "pickupDate")?,
                return_date: require_date(return_date, "returnDate")?,
            };
            check_date_order(range.pickup, range.return_date)?;
            Ok(Some(range))
        }
        _ => Ok(None),
    }
}

async fn find_car(db: &DbConn, id: &str) -> Result<Car, ApiError> {
    let car_id = parse_object_id(id, "car")?;
    db.collection::<Car>(CARS)
        .find_one(doc! { "_id": car_id }, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?
        .ok_or_else(|| ApiError::not_found("Car not found"))
}

async fn find_cars(
    db: &DbConn,
    filter: Document,
    options: FindOptions,
) -> Result<Vec<CarResponse>, ApiError> {
    let cursor = db
        .collection::<Car>(CARS)
        .find(filter, options)
        .await
        .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?;

    Ok(db::collect(cursor)
        .await?
        .into_iter()
        .map(CarResponse::from)
        .collect())
}

fn write_error(e: mongodb::error::Error, action: &str) -> ApiError {
    if is_duplicate_key(&e) {
        ApiError::bad_request(DUPLICATE_PLATE)
    } else {
        ApiError::internal_error(format!("Failed to {} car: {}", action, e))
    }
}

// ==================== PUBLIC ====================

#[openapi(tag = "Cars")]
#[get("/cars?<query..>")]
pub async fn list_cars(
    db: &State<DbConn>,
    query: CarListQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let range = requested_range(query.pickup_date.as_deref(), query.return_date.as_deref())?;
    let booked = match range {
        Some(ref range) => Some(AvailabilityService::booked_car_ids(db, range).await?),
        None => None,
    };

    let filter = AvailabilityService::car_filter(&query, booked);
    let page = Page::new(query.page, query.limit);

    let total = db
        .collection::<Car>(CARS)
        .count_documents(filter.clone(), None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?;

    let options = FindOptions::builder()
        .sort(AvailabilityService::sort_document(query.sort.as_deref()))
        .skip(page.skip())
        .limit(page.limit)
        .build();
    let cars = find_cars(db, filter, options).await?;

    Ok(Json(ApiResponse::success(json!({
        "count": cars.len(),
        "total": total,
        "totalPages": page.total_pages(total),
        "currentPage": page.page,
        "cars": cars,
    }))))
}

#[openapi(tag = "Cars")]
#[get("/cars/<id>")]
pub async fn get_car(
    db: &State<DbConn>,
    id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let car = find_car(db, &id).await?;
    Ok(Json(ApiResponse::success(json!({ "car": CarResponse::from(car) }))))
}

#[openapi(tag = "Cars")]
#[post("/cars/<id>/check-availability", data = "<dto>")]
pub async fn check_availability(
    db: &State<DbConn>,
    id: String,
    dto: Json<CheckAvailabilityDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    dto.validate()?;
    let range = requested_range(dto.pickup_date.as_deref(), dto.return_date.as_deref())?
        .ok_or_else(|| ApiError::bad_request("Pickup and return dates are required"))?;

    let car = find_car(db, &id).await?;
    let car_id = car
        .id
        .ok_or_else(|| ApiError::internal_error("Car without id"))?;
    let conflict = AvailabilityService::find_conflict(db, car_id, &range, None).await?;

    let available = conflict.is_none() && car.is_available && car.is_active;
    let data = json!({ "available": available, "car": CarSummary::from(&car) });

    Ok(Json(match conflict {
        Some(_) => ApiResponse::success_with_message("Car is not available for the selected dates", data),
        None => ApiResponse::success(data),
    }))
}

#[openapi(tag = "Cars")]
#[get("/cars/locations/<location>?<range..>")]
pub async fn cars_by_location(
    db: &State<DbConn>,
    location: String,
    range: DateRangeQuery,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let mut filter = doc! {
        "isActive": true,
        "isAvailable": true,
        "location": AvailabilityService::location_match(&location),
    };

    if let Some(range) = requested_range(range.pickup_date.as_deref(), range.return_date.as_deref())? {
        let booked = AvailabilityService::booked_car_ids(db, &range).await?;
        filter.insert("_id", doc! { "$nin": booked });
    }

    let options = FindOptions::builder().sort(doc! { "pricePerDay": 1 }).build();
    let cars = find_cars(db, filter, options).await?;

    Ok(Json(ApiResponse::success(json!({
        "count": cars.len(),
        "cars": cars,
    }))))
}

// ==================== ADMIN ====================

#[openapi(tag = "Cars - Admin")]
#[post("/cars", data = "<dto>")]
pub async fn create_car(
    db: &State<DbConn>,
    _admin: AdminGuard,
    dto: Json<CreateCarDto>,
) -> Result<status::Custom<Json<ApiResponse<serde_json::Value>>>, ApiError> {
    dto.validate()?;
    check_car_year(dto.year)?;

    let mut car = dto.into_inner().into_car(DateTime::now());
    let result = db
        .collection::<Car>(CARS)
        .insert_one(&car, None)
        .await
        .map_err(|e| write_error(e, "create"))?;
    car.id = result.inserted_id.as_object_id();

    info!("car {} ({} {}) created", car.license_plate, car.make, car.model);
    Ok(status::Custom(
        Status::Created,
        Json(ApiResponse::success_with_message(
            "Car created successfully",
            json!({ "car": CarResponse::from(car) }),
        )),
    ))
}

#[openapi(tag = "Cars - Admin")]
#[put("/cars/<id>", data = "<dto>")]
pub async fn update_car(
    db: &State<DbConn>,
    _admin: AdminGuard,
    id: String,
    dto: Json<UpdateCarDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let car_id = parse_object_id(&id, "car")?;
    dto.validate()?;
    if let Some(year) = dto.year {
        check_car_year(year)?;
    }

    let result = db
        .collection::<Car>(CARS)
        .update_one(
            doc! { "_id": car_id },
            doc! { "$set": dto.to_update_doc(DateTime::now()) },
            None,
        )
        .await
        .map_err(|e| write_error(e, "update"))?;
    if result.matched_count == 0 {
        return Err(ApiError::not_found("Car not found"));
    }

    let car = find_car(db, &id).await?;
    Ok(Json(ApiResponse::success_with_message(
        "Car updated successfully",
        json!({ "car": CarResponse::from(car) }),
    )))
}

#[openapi(tag = "Cars - Admin")]
#[delete("/cars/<id>")]
pub async fn delete_car(
    db: &State<DbConn>,
    _admin: AdminGuard,
    id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let car = find_car(db, &id).await?;

    let active = db
        .collection::<Booking>(BOOKINGS)
        .count_documents(
            doc! { "car": car.id, "status": { "$in": BookingStatus::blocking_names() } },
            None,
        )
        .await
        .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?;
    if active > 0 {
        return Err(ApiError::bad_request("Cannot delete car with active bookings"));
    }

    db.collection::<Car>(CARS)
        .delete_one(doc! { "_id": car.id }, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to delete car: {}", e)))?;

    info!("car {} deleted", car.license_plate);
    Ok(Json(ApiResponse::message("Car deleted successfully")))
}

#[openapi(tag = "Cars - Admin")]
#[patch("/cars/<id>/availability")]
pub async fn toggle_availability(
    db: &State<DbConn>,
    _admin: AdminGuard,
    id: String,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let mut car = find_car(db, &id).await?;
    car.is_available = !car.is_available;
    car.updated_at = DateTime::now();

    db.collection::<Car>(CARS)
        .update_one(
            doc! { "_id": car.id },
            doc! { "$set": { "isAvailable": car.is_available, "updatedAt": car.updated_at } },
            None,
        )
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to update car: {}", e)))?;

    let message = if car.is_available {
        "Car made available"
    } else {
        "Car made unavailable"
    };
    Ok(Json(ApiResponse::success_with_message(
        message,
        json!({ "car": CarResponse::from(car) }),
    )))
}
