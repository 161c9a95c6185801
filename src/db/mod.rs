use log::{error, info};
use mongodb::bson::doc;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Client, Cursor, Database, IndexModel};
use rocket::fairing::AdHoc;

use crate::models::{Booking, Car, User};
use crate::utils::ApiError;

pub const USERS: &str = "users";
pub const CARS: &str = "cars";
pub const BOOKINGS: &str = "bookings";
pub const CAR_LOCKS: &str = "car_locks";

const DUPLICATE_KEY: i32 = 11000;

pub type DbConn = Database;

pub fn init() -> AdHoc {
    AdHoc::try_on_ignite("MongoDB", |rocket| async {
        match connect().await {
            Ok(database) => {
                info!("✓ MongoDB connected successfully");
                if let Err(e) = ensure_indexes(&database).await {
                    error!("✗ Failed to create indexes: {}", e);
                    return Err(rocket);
                }
                Ok(rocket.manage(database))
            }
            Err(e) => {
                error!("✗ Failed to connect to MongoDB: {}", e);
                Err(rocket)
            }
        }
    })
}

pub async fn connect() -> Result<Database, mongodb::error::Error> {
    let uri = crate::config::Config::mongodb_uri();
    let client = Client::with_uri_str(&uri).await?;

    // Test connection
    client
        .database("admin")
        .run_command(doc! {"ping": 1}, None)
        .await?;

    Ok(client.database(&crate::config::Config::mongodb_database()))
}

fn unique(keys: mongodb::bson::Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

fn plain(keys: mongodb::bson::Document) -> IndexModel {
    IndexModel::builder().keys(keys).build()
}

pub async fn ensure_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    db.collection::<User>(USERS)
        .create_index(unique(doc! { "email": 1 }), None)
        .await?;

    db.collection::<Car>(CARS)
        .create_indexes(
            [
                unique(doc! { "licensePlate": 1 }),
                plain(doc! { "location": 1, "isAvailable": 1, "isActive": 1 }),
                plain(doc! { "type": 1, "pricePerDay": 1 }),
            ],
            None,
        )
        .await?;

    db.collection::<Booking>(BOOKINGS)
        .create_indexes(
            [
                plain(doc! { "user": 1, "status": 1 }),
                plain(doc! { "car": 1, "pickupDate": 1, "returnDate": 1 }),
                plain(doc! { "status": 1, "createdAt": -1 }),
            ],
            None,
        )
        .await?;

    Ok(())
}

/// True when the error is a unique index violation.
pub fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY,
        ErrorKind::Command(e) => e.code == DUPLICATE_KEY,
        _ => false,
    }
}

/// Drains a cursor into a vector.
pub async fn collect<T>(mut cursor: Cursor<T>) -> Result<Vec<T>, ApiError>
where
    T: serde::de::DeserializeOwned + Unpin + Send + Sync,
{
    let mut items = Vec::new();
    while cursor
        .advance()
        .await
        .map_err(|e| ApiError::internal_error(format!("Cursor error: {}", e)))?
    {
        let item = cursor
            .deserialize_current()
            .map_err(|e| ApiError::internal_error(format!("Deserialization error: {}", e)))?;
        items.push(item);
    }
    Ok(items)
}
