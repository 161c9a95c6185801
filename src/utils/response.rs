use log::error;
use rocket_okapi::okapi::Map;
use serde::Serialize;
use rocket::http::Status;
use rocket::response::{self, Responder, Response};
use rocket::Request;
use std::io::Cursor;
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::response::OpenApiResponderInner;
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::{MediaType, Response as OpenApiResponse, Responses};

/// -----------------------------
/// Generic API response
/// -----------------------------
///
/// The payload is flattened into the envelope, so handlers pass an object
/// such as `{"booking": ...}` and clients receive
/// `{"success": true, "booking": ...}`.
#[derive(Debug, Serialize, JsonSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        ApiResponse {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn success_with_message(message: impl Into<String>, data: T) -> Self {
        ApiResponse {
            success: true,
            message: Some(message.into()),
            data: Some(data),
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        ApiResponse {
            success: true,
            message: Some(message.into()),
            data: None,
        }
    }
}

/// Field-level validation failure.
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Body rendered for every failed request.
#[derive(Debug, Serialize, JsonSchema)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
}

/// -----------------------------
/// API Error
/// -----------------------------
#[derive(Debug)]
pub struct ApiError {
    pub status: Status,
    pub message: String,
    pub errors: Option<Vec<FieldError>>,
}

impl ApiError {
    fn new(status: Status, message: impl Into<String>) -> Self {
        ApiError {
            status,
            message: message.into(),
            errors: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(Status::BadRequest, message)
    }

    pub fn validation(errors: Vec<FieldError>) -> Self {
        ApiError {
            status: Status::BadRequest,
            message: "Validation failed".to_string(),
            errors: Some(errors),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(Status::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(Status::Forbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Status::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(Status::Conflict, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        let message = message.into();
        error!("{}", message);
        Self::new(Status::InternalServerError, message)
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            success: false,
            message: self.message.clone(),
            errors: self.errors.clone(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.status.code, self.message)
    }
}

/// -----------------------------
/// Rocket Responder
/// -----------------------------
impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let body = serde_json::to_string(&self.body())
            .unwrap_or_else(|_| r#"{"success":false,"message":"Internal error"}"#.to_string());

        Response::build()
            .status(self.status)
            .header(rocket::http::ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

/// -----------------------------
/// OpenAPI integration
/// -----------------------------
impl OpenApiResponderInner for ApiError {
    fn responses(generator: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        let schema = generator.json_schema::<ErrorBody>();

        let mut content = Map::new();
        content.insert(
            "application/json".to_owned(),
            MediaType {
                schema: Some(schema),
                ..Default::default()
            },
        );

        let mut responses = Responses::default();

        for (code, description) in [
            ("400", "Validation failed or business rule violated"),
            ("401", "Unauthorized"),
            ("403", "Forbidden"),
            ("404", "Not found"),
            ("409", "Conflicting concurrent request"),
            ("500", "Internal server error"),
        ] {
            responses.responses.insert(
                code.to_string(),
                rocket_okapi::okapi::openapi3::RefOr::Object(OpenApiResponse {
                    description: description.to_string(),
                    content: content.clone(),
                    ..Default::default()
                }),
            );
        }

        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_is_flattened_into_envelope() {
        let response = ApiResponse::success_with_message(
            "Booking created successfully",
            json!({ "booking": { "id": "abc" } }),
        );

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(
            value,
            json!({
                "success": true,
                "message": "Booking created successfully",
                "booking": { "id": "abc" }
            })
        );
    }

    #[test]
    fn message_only_response_has_no_payload_keys() {
        let response = ApiResponse::<serde_json::Value>::message("Logged out successfully");
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value, json!({ "success": true, "message": "Logged out successfully" }));
    }

    #[test]
    fn validation_error_lists_fields() {
        let err = ApiError::validation(vec![FieldError {
            field: "seats".into(),
            message: "Seats must be between 2 and 8".into(),
        }]);
        assert_eq!(err.status, Status::BadRequest);

        let value = serde_json::to_value(err.body()).unwrap();
        assert_eq!(value["success"], json!(false));
        assert_eq!(value["message"], json!("Validation failed"));
        assert_eq!(value["errors"][0]["field"], json!("seats"));
    }

    #[test]
    fn plain_errors_omit_field_list() {
        let value = serde_json::to_value(ApiError::not_found("Car not found").body()).unwrap();
        assert_eq!(value, json!({ "success": false, "message": "Car not found" }));
    }
}
