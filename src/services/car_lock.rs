use std::time::Duration;

use log::{debug, warn};
use mongodb::bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::UpdateOptions;

use crate::db::{is_duplicate_key, DbConn, CAR_LOCKS};
use crate::utils::ApiError;

const ACQUIRE_ATTEMPTS: u32 = 5;
const RETRY_DELAY_MS: u64 = 100;

/// Lease over one car's booking calendar.
///
/// Held around every "check overlap, then write" sequence so two requests
/// cannot both pass the check for the same car. The lease lives in the
/// `car_locks` collection keyed by car id, which makes it visible to every
/// server instance; an expired lease may be taken over.
pub struct CarLock {
    car_id: ObjectId,
    token: ObjectId,
}

impl CarLock {
    pub async fn acquire(db: &DbConn, car_id: ObjectId) -> Result<CarLock, ApiError> {
        let token = ObjectId::new();

        for attempt in 1..=ACQUIRE_ATTEMPTS {
            if Self::try_acquire(db, car_id, token).await? {
                debug!("car lock {} acquired on attempt {}", car_id, attempt);
                return Ok(CarLock { car_id, token });
            }
            tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * attempt as u64)).await;
        }

        warn!("car lock {} still held after {} attempts", car_id, ACQUIRE_ATTEMPTS);
        Err(ApiError::conflict(
            "Another booking for this car is being processed. Please retry.",
        ))
    }

    async fn try_acquire(db: &DbConn, car_id: ObjectId, token: ObjectId) -> Result<bool, ApiError> {
        let ttl = crate::config::Config::car_lock_ttl_ms();
        let now = DateTime::now();
        let expires_at = DateTime::from_millis(now.timestamp_millis() + ttl);

        // Matches only a missing or expired lease; a live lease makes the
        // upsert collide on `_id`.
        let result = db
            .collection::<Document>(CAR_LOCKS)
            .update_one(
                doc! { "_id": car_id, "expiresAt": { "$lt": now } },
                doc! { "$set": { "token": token, "expiresAt": expires_at } },
                UpdateOptions::builder().upsert(true).build(),
            )
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if is_duplicate_key(&e) => Ok(false),
            Err(e) => Err(ApiError::internal_error(format!("Car lock error: {}", e))),
        }
    }

    /// Extends the lease just before a guarded write. Fails with a conflict
    /// when the lease expired and another request took it over.
    pub async fn refresh(&self, db: &DbConn) -> Result<(), ApiError> {
        let ttl = crate::config::Config::car_lock_ttl_ms();
        let expires_at = DateTime::from_millis(DateTime::now().timestamp_millis() + ttl);

        let result = db
            .collection::<Document>(CAR_LOCKS)
            .update_one(
                doc! { "_id": self.car_id, "token": self.token },
                doc! { "$set": { "expiresAt": expires_at } },
                None,
            )
            .await
            .map_err(|e| ApiError::internal_error(format!("Car lock error: {}", e)))?;

        if result.matched_count == 0 {
            warn!("car lock {} lost before write", self.car_id);
            return Err(ApiError::conflict(
                "Booking took too long and was overtaken by another request. Please retry.",
            ));
        }
        Ok(())
    }

    /// Releases the lease if this holder still owns it.
    pub async fn release(self, db: &DbConn) {
        let outcome = db
            .collection::<Document>(CAR_LOCKS)
            .delete_one(doc! { "_id": self.car_id, "token": self.token }, None)
            .await;

        if let Err(e) = outcome {
            warn!("failed to release car lock {}: {}", self.car_id, e);
        }
    }
}
