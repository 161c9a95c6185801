use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub email: String,
    /// bcrypt hash
    pub password: String,
    pub phone: String,
    pub address: String,
    pub driving_license: String,
    pub role: Role,
    pub is_active: bool,
    pub last_login: Option<DateTime>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDto {
    #[validate(length(min = 2, max = 50, message = "Name must be between 2 and 50 characters"))]
    pub name: String,
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters long"))]
    pub password: String,
    #[validate(length(min = 10, max = 15, message = "Phone number must be between 10 and 15 characters"))]
    pub phone: String,
    #[validate(length(min = 10, max = 200, message = "Address must be between 10 and 200 characters"))]
    pub address: String,
    #[validate(length(min = 5, max = 20, message = "Driving license must be between 5 and 20 characters"))]
    pub driving_license: String,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
pub struct LoginDto {
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileDto {
    #[validate(length(min = 2, max = 50, message = "Name must be between 2 and 50 characters"))]
    pub name: Option<String>,
    #[validate(length(min = 10, max = 15, message = "Phone number must be between 10 and 15 characters"))]
    pub phone: Option<String>,
    #[validate(length(min = 10, max = 200, message = "Address must be between 10 and 200 characters"))]
    pub address: Option<String>,
    #[validate(length(min = 5, max = 20, message = "Driving license must be between 5 and 20 characters"))]
    pub driving_license: Option<String>,
}

#[derive(Debug, Deserialize, Validate, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordDto {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[validate(length(min = 6, message = "New password must be at least 6 characters long"))]
    pub new_password: String,
}

#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub driving_license: String,
    pub role: Role,
    pub is_active: bool,
    pub last_login: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        UserResponse {
            id: user.id.map(|id| id.to_hex()).unwrap_or_default(),
            name: user.name,
            email: user.email,
            phone: user.phone,
            address: user.address,
            driving_license: user.driving_license,
            role: user.role,
            is_active: user.is_active,
            last_login: user.last_login.map(|d| d.to_chrono()),
            created_at: user.created_at.to_chrono(),
        }
    }
}

/// Contact details embedded in booking responses.
#[derive(Debug, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub driving_license: Option<String>,
}

impl UserSummary {
    pub fn contact(user: &User) -> Self {
        UserSummary {
            id: user.id.map(|id| id.to_hex()).unwrap_or_default(),
            name: user.name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            address: None,
            driving_license: None,
        }
    }

    /// Contact details plus address and licence, for single-booking views.
    pub fn detailed(user: &User) -> Self {
        UserSummary {
            address: Some(user.address.clone()),
            driving_license: Some(user.driving_license.clone()),
            ..Self::contact(user)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register_dto() -> RegisterDto {
        RegisterDto {
            name: "Ada Driver".into(),
            email: "ada@example.com".into(),
            password: "secret1".into(),
            phone: "5551234567".into(),
            address: "12 Long Road, Springfield".into(),
            driving_license: "DL-12345".into(),
        }
    }

    #[test]
    fn valid_registration_passes() {
        assert!(register_dto().validate().is_ok());
    }

    #[test]
    fn short_password_and_bad_email_are_reported() {
        let dto = RegisterDto {
            email: "not-an-email".into(),
            password: "abc".into(),
            ..register_dto()
        };
        let errors = dto.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
        assert!(!fields.contains_key("name"));
    }

    #[test]
    fn response_never_carries_password() {
        let now = DateTime::now();
        let user = User {
            id: Some(ObjectId::new()),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            password: "$2b$04$hash".into(),
            phone: "5551234567".into(),
            address: "12 Long Road".into(),
            driving_license: "DL-12345".into(),
            role: Role::User,
            is_active: true,
            last_login: None,
            created_at: now,
            updated_at: now,
        };
        let value = serde_json::to_value(UserResponse::from(user)).unwrap();
        assert!(value.get("password").is_none());
        assert_eq!(value["role"], "user");
        assert_eq!(value["drivingLicense"], "DL-12345");
    }
}
