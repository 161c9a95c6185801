use crate::utils::ApiError;

/// bcrypt runs on the blocking pool so request workers stay free.
pub struct PasswordService;

impl PasswordService {
    pub async fn hash(password: String) -> Result<String, ApiError> {
        let cost = crate::config::Config::bcrypt_cost();
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| ApiError::internal_error(format!("Hashing task failed: {}", e)))?
            .map_err(|e| ApiError::internal_error(format!("Failed to hash password: {}", e)))
    }

    pub async fn verify(password: String, hash: String) -> Result<bool, ApiError> {
        tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| ApiError::internal_error(format!("Hashing task failed: {}", e)))?
            .map_err(|e| ApiError::internal_error(format!("Failed to verify password: {}", e)))
    }
}
