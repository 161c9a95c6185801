use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;
use validator::Validate;

use crate::utils::validation::validate_iso_date;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema, FromFormField)]
#[serde(rename_all = "lowercase")]
pub enum CarType {
    Sedan,
    Suv,
    Hatchback,
    Coupe,
    Convertible,
    Truck,
    Van,
}

impl CarType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CarType::Sedan => "sedan",
            CarType::Suv => "suv",
            CarType::Hatchback => "hatchback",
            CarType::Coupe => "coupe",
            CarType::Convertible => "convertible",
            CarType::Truck => "truck",
            CarType::Van => "van",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema, FromFormField)]
#[serde(rename_all = "lowercase")]
pub enum Transmission {
    Manual,
    Automatic,
}

impl Transmission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transmission::Manual => "manual",
            Transmission::Automatic => "automatic",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema, FromFormField)]
#[serde(rename_all = "lowercase")]
pub enum Fuel {
    Petrol,
    Diesel,
    Electric,
    Hybrid,
}

impl Fuel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Fuel::Petrol => "petrol",
            Fuel::Diesel => "diesel",
            Fuel::Electric => "electric",
            Fuel::Hybrid => "hybrid",
        }
    }
}

/// Car stored in MongoDB
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Car {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub make: String,
    pub model: String,
    pub year: i32,
    #[serde(rename = "type")]
    pub car_type: CarType,
    pub transmission: Transmission,
    pub fuel: Fuel,
    pub seats: i32,
    pub color: String,
    /// Trimmed and upper-cased; unique.
    pub license_plate: String,
    pub price_per_day: f64,
    pub location: String,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
    pub is_available: bool,
    pub is_active: bool,
    pub mileage: i32,
    pub description: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

pub fn normalize_plate(plate: &str) -> String {
    plate.trim().to_uppercase()
}

fn trim_all(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateCarDto {
    #[validate(length(min = 2, max = 30, message = "Make must be between 2 and 30 characters"))]
    pub make: String,
    #[validate(length(min = 2, max = 50, message = "Model must be between 2 and 50 characters"))]
    pub model: String,
    pub year: i32,
    #[serde(rename = "type")]
    pub car_type: CarType,
    pub transmission: Transmission,
    pub fuel: Fuel,
    #[validate(range(min = 2, max = 8, message = "Seats must be between 2 and 8"))]
    pub seats: i32,
    #[validate(length(min = 3, max = 20, message = "Color must be between 3 and 20 characters"))]
    pub color: String,
    #[validate(length(min = 3, max = 15, message = "License plate must be between 3 and 15 characters"))]
    pub license_plate: String,
    #[validate(range(min = 0.0, message = "Price per day must be a positive number"))]
    pub price_per_day: f64,
    #[validate(length(min = 2, max = 100, message = "Location must be between 2 and 100 characters"))]
    pub location: String,
    #[validate(range(min = 0, message = "Mileage must be a positive number"))]
    pub mileage: i32,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[validate(length(max = 500, message = "Description must be less than 500 characters"))]
    pub description: Option<String>,
    pub is_available: Option<bool>,
}

impl CreateCarDto {
    pub fn into_car(self, now: DateTime) -> Car {
        Car {
            id: None,
            make: self.make.trim().to_string(),
            model: self.model.trim().to_string(),
            year: self.year,
            car_type: self.car_type,
            transmission: self.transmission,
            fuel: self.fuel,
            seats: self.seats,
            color: self.color.trim().to_string(),
            license_plate: normalize_plate(&self.license_plate),
            price_per_day: self.price_per_day,
            location: self.location.trim().to_string(),
            features: trim_all(&self.features),
            images: trim_all(&self.images),
            is_available: self.is_available.unwrap_or(true),
            is_active: true,
            mileage: self.mileage,
            description: self.description.map(|d| d.trim().to_string()),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCarDto {
    #[validate(length(min = 2, max = 30, message = "Make must be between 2 and 30 characters"))]
    pub make: Option<String>,
    #[validate(length(min = 2, max = 50, message = "Model must be between 2 and 50 characters"))]
    pub model: Option<String>,
    pub year: Option<i32>,
    #[serde(rename = "type")]
    pub car_type: Option<CarType>,
    pub transmission: Option<Transmission>,
    pub fuel: Option<Fuel>,
    #[validate(range(min = 2, max = 8, message = "Seats must be between 2 and 8"))]
    pub seats: Option<i32>,
    #[validate(length(min = 3, max = 20, message = "Color must be between 3 and 20 characters"))]
    pub color: Option<String>,
    #[validate(length(min = 3, max = 15, message = "License plate must be between 3 and 15 characters"))]
    pub license_plate: Option<String>,
    #[validate(range(min = 0.0, message = "Price per day must be a positive number"))]
    pub price_per_day: Option<f64>,
    #[validate(length(min = 2, max = 100, message = "Location must be between 2 and 100 characters"))]
    pub location: Option<String>,
    #[validate(range(min = 0, message = "Mileage must be a positive number"))]
    pub mileage: Option<i32>,
    pub features: Option<Vec<String>>,
    pub images: Option<Vec<String>>,
    #[validate(length(max = 500, message = "Description must be less than 500 characters"))]
    pub description: Option<String>,
    pub is_available: Option<bool>,
    pub is_active: Option<bool>,
}

impl UpdateCarDto {
    /// `$set` document for the supplied fields, always stamping `updatedAt`.
    pub fn to_update_doc(&self, now: DateTime) -> mongodb::bson::Document {
        let mut update_doc = mongodb::bson::doc! { "updatedAt": now };

        if let Some(ref make) = self.make {
            update_doc.insert("make", make.trim());
        }
        if let Some(ref model) = self.model {
            update_doc.insert("model", model.trim());
        }
        if let Some(year) = self.year {
            update_doc.insert("year", year);
        }
        if let Some(car_type) = self.car_type {
            update_doc.insert("type", car_type.as_str());
        }
        if let Some(transmission) = self.transmission {
            update_doc.insert("transmission", transmission.as_str());
        }
        if let Some(fuel) = self.fuel {
            update_doc.insert("fuel", fuel.as_str());
        }
        if let Some(seats) = self.seats {
            update_doc.insert("seats", seats);
        }
        if let Some(ref color) = self.color {
            update_doc.insert("color", color.trim());
        }
        if let Some(ref plate) = self.license_plate {
            update_doc.insert("licensePlate", normalize_plate(plate));
        }
        if let Some(price) = self.price_per_day {
            update_doc.insert("pricePerDay", price);
        }
        if let Some(ref location) = self.location {
            update_doc.insert("location", location.trim());
        }
        if let Some(mileage) = self.mileage {
            update_doc.insert("mileage", mileage);
        }
        if let Some(ref features) = self.features {
            update_doc.insert("features", trim_all(features));
        }
        if let Some(ref images) = self.images {
            update_doc.insert("images", trim_all(images));
        }
        if let Some(ref description) = self.description {
            update_doc.insert("description", description.trim());
        }
        if let Some(available) = self.is_available {
            update_doc.insert("isAvailable", available);
        }
        if let Some(active) = self.is_active {
            update_doc.insert("isActive", active);
        }

        update_doc
    }
}

#[derive(Debug, FromForm, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CarListQuery {
    pub location: Option<String>,
    #[field(name = "type")]
    #[serde(rename = "type")]
    pub car_type: Option<CarType>,
    pub transmission: Option<Transmission>,
    pub fuel: Option<Fuel>,
    pub seats: Option<i32>,
    #[field(name = "minPrice")]
    pub min_price: Option<f64>,
    #[field(name = "maxPrice")]
    pub max_price: Option<f64>,
    #[field(name = "pickupDate")]
    pub pickup_date: Option<String>,
    #[field(name = "returnDate")]
    pub return_date: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort: Option<String>,
}

#[derive(Debug, FromForm, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DateRangeQuery {
    #[field(name = "pickupDate")]
    pub pickup_date: Option<String>,
    #[field(name = "returnDate")]
    pub return_date: Option<String>,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckAvailabilityDto {
    #[validate(custom = "validate_iso_date")]
    pub pickup_date: Option<String>,
    #[validate(custom = "validate_iso_date")]
    pub return_date: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CarResponse {
    pub id: String,
    pub make: String,
    pub model: String,
    pub year: i32,
    #[serde(rename = "type")]
    pub car_type: CarType,
    pub transmission: Transmission,
    pub fuel: Fuel,
    pub seats: i32,
    pub color: String,
    pub license_plate: String,
    pub price_per_day: f64,
    pub location: String,
    pub features: Vec<String>,
    pub images: Vec<String>,
    pub is_available: bool,
    pub is_active: bool,
    pub mileage: i32,
    pub description: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<Car> for CarResponse {
    fn from(car: Car) -> Self {
        CarResponse {
            id: car.id.map(|id| id.to_hex()).unwrap_or_default(),
            make: car.make,
            model: car.model,
            year: car.year,
            car_type: car.car_type,
            transmission: car.transmission,
            fuel: car.fuel,
            seats: car.seats,
            color: car.color,
            license_plate: car.license_plate,
            price_per_day: car.price_per_day,
            location: car.location,
            features: car.features,
            images: car.images,
            is_available: car.is_available,
            is_active: car.is_active,
            mileage: car.mileage,
            description: car.description,
            created_at: car.created_at.to_chrono(),
            updated_at: car.updated_at.to_chrono(),
        }
    }
}

/// Car fields embedded in booking responses.
#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CarSummary {
    pub id: String,
    pub make: String,
    pub model: String,
    pub year: i32,
    #[serde(rename = "type")]
    pub car_type: CarType,
    pub license_plate: String,
    pub images: Vec<String>,
    pub location: String,
    pub price_per_day: f64,
}

impl From<&Car> for CarSummary {
    fn from(car: &Car) -> Self {
        CarSummary {
            id: car.id.map(|id| id.to_hex()).unwrap_or_default(),
            make: car.make.clone(),
            model: car.model.clone(),
            year: car.year,
            car_type: car.car_type,
            license_plate: car.license_plate.clone(),
            images: car.images.clone(),
            location: car.location.clone(),
            price_per_day: car.price_per_day,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_dto() -> CreateCarDto {
        serde_json::from_value(serde_json::json!({
            "make": "Toyota",
            "model": "Corolla",
            "year": 2022,
            "type": "sedan",
            "transmission": "automatic",
            "fuel": "hybrid",
            "seats": 5,
            "color": "Silver",
            "licensePlate": " ab-123-cd ",
            "pricePerDay": 50.0,
            "location": "Downtown Lisbon",
            "mileage": 12000,
            "features": ["GPS", "  ", " Bluetooth "]
        }))
        .unwrap()
    }

    #[test]
    fn create_payload_uses_camel_case_and_lowercase_enums() {
        let dto = create_dto();
        assert_eq!(dto.car_type, CarType::Sedan);
        assert_eq!(dto.fuel, Fuel::Hybrid);
        assert!(dto.validate().is_ok());
    }

    #[test]
    fn seats_out_of_range_fail_validation() {
        let mut dto = create_dto();
        dto.seats = 9;
        let errors = dto.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("seats"));
    }

    #[test]
    fn negative_price_fails_validation() {
        let mut dto = create_dto();
        dto.price_per_day = -1.0;
        assert!(dto.validate().unwrap_err().field_errors().contains_key("price_per_day"));
    }

    #[test]
    fn new_car_is_normalized_and_enabled() {
        let car = create_dto().into_car(DateTime::now());
        assert_eq!(car.license_plate, "AB-123-CD");
        assert_eq!(car.features, vec!["GPS".to_string(), "Bluetooth".to_string()]);
        assert!(car.is_available);
        assert!(car.is_active);
    }

    #[test]
    fn stored_document_uses_original_field_names() {
        let car = create_dto().into_car(DateTime::now());
        let doc = mongodb::bson::to_document(&car).unwrap();
        assert_eq!(doc.get_str("type").unwrap(), "sedan");
        assert_eq!(doc.get_str("licensePlate").unwrap(), "AB-123-CD");
        assert!(doc.get_bool("isActive").unwrap());
        assert!(!doc.contains_key("_id"));
    }

    #[test]
    fn partial_update_only_sets_given_fields() {
        let dto = UpdateCarDto {
            license_plate: Some("xy 99".into()),
            price_per_day: Some(75.5),
            ..Default::default()
        };
        let doc = dto.to_update_doc(DateTime::now());
        assert_eq!(doc.get_str("licensePlate").unwrap(), "XY 99");
        assert_eq!(doc.get_f64("pricePerDay").unwrap(), 75.5);
        assert!(doc.contains_key("updatedAt"));
        assert!(!doc.contains_key("make"));
        assert_eq!(doc.len(), 3);
    }
}
