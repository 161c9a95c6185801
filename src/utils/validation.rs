use std::borrow::Cow;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use mongodb::bson::oid::ObjectId;
use validator::{ValidationError, ValidationErrors};

use crate::models::wire_field_name;
use crate::utils::{ApiError, FieldError};

pub const MIN_CAR_YEAR: i32 = 1980;

/// Parses the date formats accepted by the API: RFC 3339 timestamps, naive
/// timestamps (read as UTC) and plain `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub fn validate_iso_date(value: &str) -> Result<(), ValidationError> {
    match parse_date(value) {
        Some(_) => Ok(()),
        None => {
            let mut err = ValidationError::new("iso_date");
            err.message = Some(Cow::from("Must be a valid ISO-8601 date"));
            Err(err)
        }
    }
}

pub fn validate_object_id(value: &str) -> Result<(), ValidationError> {
    match ObjectId::parse_str(value) {
        Ok(_) => Ok(()),
        Err(_) => {
            let mut err = ValidationError::new("object_id");
            err.message = Some(Cow::from("Must be a valid ObjectId"));
            Err(err)
        }
    }
}

/// Manufacturing years run from 1980 up to next calendar year.
pub fn check_car_year(year: i32) -> Result<(), ApiError> {
    let max = Utc::now().year() + 1;
    if (MIN_CAR_YEAR..=max).contains(&year) {
        Ok(())
    } else {
        Err(ApiError::validation(vec![FieldError {
            field: "year".to_string(),
            message: "Year must be a valid year".to_string(),
        }]))
    }
}

pub fn parse_object_id(id: &str, label: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(id).map_err(|_| ApiError::bad_request(format!("Invalid {} ID", label)))
}

/// Parses a date that already passed `validate_iso_date`, or reports the field.
pub fn require_date(value: &str, field: &str) -> Result<DateTime<Utc>, ApiError> {
    parse_date(value).ok_or_else(|| {
        ApiError::validation(vec![FieldError {
            field: field.to_string(),
            message: "Must be a valid ISO-8601 date".to_string(),
        }])
    })
}

/// Flattens validator output into `{field, message}` pairs under their JSON
/// names, ordered by field name.
pub fn field_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut out: Vec<FieldError> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            let field = wire_field_name(field).to_string();
            errs.iter().map(move |e| FieldError {
                field: field.clone(),
                message: e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{} is invalid", field)),
            })
        })
        .collect();
    out.sort_by(|a, b| a.field.cmp(&b.field));
    out
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::validation(field_errors(&errors))
    }
}
