use log::info;
use mongodb::bson::{doc, DateTime};
use rocket::http::Status;
use rocket::response::status;
use rocket::serde::json::Json;
use rocket::State;
use rocket_okapi::openapi;
use serde_json::json;
use validator::Validate;

use crate::db::{is_duplicate_key, DbConn, USERS};
use crate::guards::AuthGuard;
use crate::models::{
    ChangePasswordDto, LoginDto, RegisterDto, Role, UpdateProfileDto, User, UserResponse,
};
use crate::services::{JwtService, PasswordService};
use crate::utils::{ApiError, ApiResponse};

fn issue_token(user: &User) -> Result<String, ApiError> {
    let id = user
        .id
        .ok_or_else(|| ApiError::internal_error("User without id"))?;
    JwtService::generate_token(&id, user.role)
        .map_err(|e| ApiError::internal_error(format!("Failed to generate token: {}", e)))
}

async fn load_user(db: &DbConn, auth: &AuthGuard) -> Result<User, ApiError> {
    db.collection::<User>(USERS)
        .find_one(doc! { "_id": auth.user_id }, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?
        .ok_or_else(|| ApiError::not_found("User not found"))
}

#[openapi(tag = "Auth")]
#[post("/auth/register", data = "<dto>")]
pub async fn register(
    db: &State<DbConn>,
    dto: Json<RegisterDto>,
) -> Result<status::Custom<Json<ApiResponse<serde_json::Value>>>, ApiError> {
    dto.validate()?;
    let dto = dto.into_inner();
    let email = dto.email.trim().to_lowercase();

    let users = db.collection::<User>(USERS);
    let existing = users
        .find_one(doc! { "email": &email }, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?;
    if existing.is_some() {
        return Err(ApiError::bad_request("User already exists with this email"));
    }

    let now = DateTime::now();
    let mut user = User {
        id: None,
        name: dto.name.trim().to_string(),
        email,
        password: PasswordService::hash(dto.password).await?,
        phone: dto.phone.trim().to_string(),
        address: dto.address.trim().to_string(),
        driving_license: dto.driving_license.trim().to_string(),
        role: Role::User,
        is_active: true,
        last_login: None,
        created_at: now,
        updated_at: now,
    };

    let result = users.insert_one(&user, None).await.map_err(|e| {
        if is_duplicate_key(&e) {
            ApiError::bad_request("User already exists with this email")
        } else {
            ApiError::internal_error(format!("Failed to create user: {}", e))
        }
    })?;
    user.id = result.inserted_id.as_object_id();

    let token = issue_token(&user)?;
    info!("registered user {}", user.email);

    Ok(status::Custom(
        Status::Created,
        Json(ApiResponse::success_with_message(
            "User registered successfully",
            json!({ "token": token, "user": UserResponse::from(user) }),
        )),
    ))
}

#[openapi(tag = "Auth")]
#[post("/auth/login", data = "<dto>")]
pub async fn login(
    db: &State<DbConn>,
    dto: Json<LoginDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    dto.validate()?;
    let dto = dto.into_inner();
    let email = dto.email.trim().to_lowercase();

    let users = db.collection::<User>(USERS);
    let mut user = users
        .find_one(doc! { "email": &email }, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Database error: {}", e)))?
        .ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    if !user.is_active {
        return Err(ApiError::unauthorized("Account is deactivated"));
    }
    if !PasswordService::verify(dto.password, user.password.clone()).await? {
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    let now = DateTime::now();
    users
        .update_one(
            doc! { "_id": user.id },
            doc! { "$set": { "lastLogin": now } },
            None,
        )
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to update user: {}", e)))?;
    user.last_login = Some(now);

    let token = issue_token(&user)?;
    Ok(Json(ApiResponse::success_with_message(
        "Login successful",
        json!({ "token": token, "user": UserResponse::from(user) }),
    )))
}

/// Tokens are stateless; the client discards its copy.
#[openapi(tag = "Auth")]
#[post("/auth/logout")]
pub async fn logout(auth: AuthGuard) -> Json<ApiResponse<serde_json::Value>> {
    info!("user {} logged out", auth.user_id);
    Json(ApiResponse::message("Logged out successfully"))
}

#[openapi(tag = "Auth")]
#[get("/auth/profile")]
pub async fn get_profile(
    db: &State<DbConn>,
    auth: AuthGuard,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let user = load_user(db, &auth).await?;
    Ok(Json(ApiResponse::success(json!({ "user": UserResponse::from(user) }))))
}

#[openapi(tag = "Auth")]
#[put("/auth/profile", data = "<dto>")]
pub async fn update_profile(
    db: &State<DbConn>,
    auth: AuthGuard,
    dto: Json<UpdateProfileDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    dto.validate()?;

    let mut update_doc = doc! { "updatedAt": DateTime::now() };
    if let Some(ref name) = dto.name {
        update_doc.insert("name", name.trim());
    }
    if let Some(ref phone) = dto.phone {
        update_doc.insert("phone", phone.trim());
    }
    if let Some(ref address) = dto.address {
        update_doc.insert("address", address.trim());
    }
    if let Some(ref license) = dto.driving_license {
        update_doc.insert("drivingLicense", license.trim());
    }

    let result = db
        .collection::<User>(USERS)
        .update_one(doc! { "_id": auth.user_id }, doc! { "$set": update_doc }, None)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to update profile: {}", e)))?;
    if result.matched_count == 0 {
        return Err(ApiError::not_found("User not found"));
    }

    let user = load_user(db, &auth).await?;
    Ok(Json(ApiResponse::success_with_message(
        "Profile updated successfully",
        json!({ "user": UserResponse::from(user) }),
    )))
}

#[openapi(tag = "Auth")]
#[put("/auth/change-password", data = "<dto>")]
pub async fn change_password(
    db: &State<DbConn>,
    auth: AuthGuard,
    dto: Json<ChangePasswordDto>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    dto.validate()?;
    let dto = dto.into_inner();
    let user = load_user(db, &auth).await?;

    if !PasswordService::verify(dto.current_password, user.password).await? {
        return Err(ApiError::bad_request("Current password is incorrect"));
    }

    let hash = PasswordService::hash(dto.new_password).await?;
    db.collection::<User>(USERS)
        .update_one(
            doc! { "_id": auth.user_id },
            doc! { "$set": { "password": hash, "updatedAt": DateTime::now() } },
            None,
        )
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to update password: {}", e)))?;

    info!("user {} changed password", auth.user_id);
    Ok(Json(ApiResponse::message("Password changed successfully")))
}
