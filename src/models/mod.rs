pub mod user;
pub mod car;
pub mod booking;

pub use user::*;
pub use car::*;
pub use booking::*;

/// JSON name of a request DTO field, for reporting validation errors.
/// Single-word fields are spelled the same on both sides.
pub fn wire_field_name(field: &str) -> &str {
    match field {
        "driving_license" => "drivingLicense",
        "current_password" => "currentPassword",
        "new_password" => "newPassword",
        "car_type" => "type",
        "license_plate" => "licensePlate",
        "price_per_day" => "pricePerDay",
        "is_available" => "isAvailable",
        "is_active" => "isActive",
        "pickup_date" => "pickupDate",
        "return_date" => "returnDate",
        "car_id" => "carId",
        "pickup_location" => "pickupLocation",
        "return_location" => "returnLocation",
        "payment_status" => "paymentStatus",
        "payment_method" => "paymentMethod",
        other => other,
    }
}
