//! End-to-end flows through the mounted Rocket app. They need a reachable
//! MongoDB (see `Rocket.toml`), so they only run with `cargo test -- --ignored`.

use chrono::{Duration, Timelike, Utc};
use mongodb::bson::{oid::ObjectId, DateTime};
use rocket::http::{ContentType, Header, Status};
use rocket::local::asynchronous::Client;
use serde_json::{json, Value};

use car_rental_server::models::{Role, User};
use car_rental_server::services::PasswordService;
use car_rental_server::{build_rocket, db};

async fn client() -> Client {
    Client::tracked(build_rocket())
        .await
        .expect("valid rocket instance")
}

fn bearer(token: &str) -> Header<'static> {
    Header::new("Authorization", format!("Bearer {}", token))
}

fn unique(prefix: &str) -> String {
    format!("{}{}", prefix, &ObjectId::new().to_hex()[16..])
}

async fn seed_admin() -> (String, String) {
    let database = db::connect().await.expect("mongodb reachable");
    let email = format!("{}@example.com", unique("admin"));
    let now = DateTime::now();
    let admin = User {
        id: None,
        name: "Fleet Admin".into(),
        email: email.clone(),
        password: PasswordService::hash("admin123".into()).await.unwrap(),
        phone: "5550001111".into(),
        address: "1 Depot Road, Springfield".into(),
        driving_license: "ADM12345".into(),
        role: Role::Admin,
        is_active: true,
        last_login: None,
        created_at: now,
        updated_at: now,
    };
    database
        .collection::<User>(db::USERS)
        .insert_one(&admin, None)
        .await
        .unwrap();
    (email, "admin123".to_string())
}

async fn post_json(client: &Client, uri: &str, token: Option<&str>, body: Value) -> (Status, Value) {
    let mut request = client.post(uri).header(ContentType::JSON).body(body.to_string());
    if let Some(token) = token {
        request = request.header(bearer(token));
    }
    let response = request.dispatch().await;
    let status = response.status();
    (status, response.into_json::<Value>().await.unwrap_or(Value::Null))
}

async fn patch_json(client: &Client, uri: &str, token: &str, body: Value) -> (Status, Value) {
    let response = client
        .patch(uri)
        .header(ContentType::JSON)
        .header(bearer(token))
        .body(body.to_string())
        .dispatch()
        .await;
    let status = response.status();
    (status, response.into_json::<Value>().await.unwrap_or(Value::Null))
}

async fn login(client: &Client, email: &str, password: &str) -> String {
    let (status, body) = post_json(
        client,
        "/api/auth/login",
        None,
        json!({ "email": email, "password": password }),
    )
    .await;
    assert_eq!(status, Status::Ok, "{}", body);
    body["token"].as_str().unwrap().to_string()
}

async fn register(client: &Client) -> String {
    let (status, body) = post_json(
        client,
        "/api/auth/register",
        None,
        json!({
            "name": "Jane Renter",
            "email": format!("{}@example.com", unique("renter")),
            "password": "secret1",
            "phone": "5551234567",
            "address": "42 Elm Street, Springfield",
            "drivingLicense": "DL998877",
        }),
    )
    .await;
    assert_eq!(status, Status::Created, "{}", body);
    assert!(body["user"].get("password").is_none());
    body["token"].as_str().unwrap().to_string()
}

async fn create_car(client: &Client, admin: &str, price: f64) -> String {
    let (status, body) = post_json(
        client,
        "/api/cars",
        Some(admin),
        json!({
            "make": "Toyota",
            "model": "Corolla",
            "year": 2022,
            "type": "sedan",
            "transmission": "automatic",
            "fuel": "hybrid",
            "seats": 5,
            "color": "Silver",
            "licensePlate": unique("t-"),
            "pricePerDay": price,
            "location": "Springfield Airport",
            "mileage": 12000,
        }),
    )
    .await;
    assert_eq!(status, Status::Created, "{}", body);
    body["car"]["id"].as_str().unwrap().to_string()
}

#[rocket::async_test]
#[ignore]
async fn booking_lifecycle_prices_and_blocks_overlaps() {
    let client = client().await;
    let (admin_email, admin_password) = seed_admin().await;
    let admin = login(&client, &admin_email, &admin_password).await;
    let renter = register(&client).await;
    let car_id = create_car(&client, &admin, 50.0).await;

    let base = (Utc::now() + Duration::days(30))
        .with_hour(10)
        .and_then(|d| d.with_minute(0))
        .and_then(|d| d.with_second(0))
        .and_then(|d| d.with_nanosecond(0))
        .unwrap();

    // Two full days at $50.
    let (status, body) = post_json(
        &client,
        "/api/bookings",
        Some(&renter),
        json!({
            "carId": car_id,
            "pickupDate": base.to_rfc3339(),
            "returnDate": (base + Duration::days(2)).to_rfc3339(),
            "pickupLocation": "Springfield Airport",
            "returnLocation": "Springfield Airport",
        }),
    )
    .await;
    assert_eq!(status, Status::Created, "{}", body);
    assert_eq!(body["booking"]["totalDays"], 2);
    assert_eq!(body["booking"]["totalAmount"], 100.0);
    assert_eq!(body["booking"]["status"], "pending");
    let first = body["booking"]["id"].as_str().unwrap().to_string();

    let (status, body) = patch_json(
        &client,
        &format!("/api/bookings/{}/status", first),
        &admin,
        json!({ "status": "confirmed" }),
    )
    .await;
    assert_eq!(status, Status::Ok, "{}", body);
    assert_eq!(body["message"], "Booking confirmed successfully");

    // Starts on the day the confirmed booking ends.
    let (status, body) = post_json(
        &client,
        "/api/bookings",
        Some(&renter),
        json!({
            "carId": car_id,
            "pickupDate": (base + Duration::days(2)).to_rfc3339(),
            "returnDate": (base + Duration::days(4)).to_rfc3339(),
            "pickupLocation": "Springfield Airport",
            "returnLocation": "Downtown",
        }),
    )
    .await;
    assert_eq!(status, Status::BadRequest);
    assert_eq!(body["message"], "Car is not available for the selected dates");

    // Any status may be set from any other, including the current one.
    for next in ["pending", "pending"] {
        let (status, body) = patch_json(
            &client,
            &format!("/api/bookings/{}/status", first),
            &admin,
            json!({ "status": next }),
        )
        .await;
        assert_eq!(status, Status::Ok, "{}", body);
        assert_eq!(body["booking"]["status"], "pending");
    }

    let (status, body) = patch_json(
        &client,
        &format!("/api/bookings/{}/status", first),
        &admin,
        json!({ "status": "unknown" }),
    )
    .await;
    assert_eq!(status, Status::BadRequest);
    assert_eq!(body["message"], "Invalid status");

    let (status, body) = patch_json(
        &client,
        &format!("/api/bookings/{}/cancel", first),
        &renter,
        json!({ "reason": "Plans changed" }),
    )
    .await;
    assert_eq!(status, Status::Ok, "{}", body);
    assert_eq!(body["booking"]["status"], "cancelled");
    assert_eq!(body["booking"]["cancellationReason"], "Plans changed");

    let (status, _) = patch_json(
        &client,
        &format!("/api/bookings/{}/cancel", first),
        &renter,
        json!({}),
    )
    .await;
    assert_eq!(status, Status::BadRequest);
}

#[rocket::async_test]
#[ignore]
async fn cancel_without_body_is_accepted() {
    let client = client().await;
    let (admin_email, admin_password) = seed_admin().await;
    let admin = login(&client, &admin_email, &admin_password).await;
    let renter = register(&client).await;
    let car_id = create_car(&client, &admin, 40.0).await;

    let pickup = Utc::now() + Duration::days(20);
    let (status, body) = post_json(
        &client,
        "/api/bookings",
        Some(&renter),
        json!({
            "carId": car_id,
            "pickupDate": pickup.to_rfc3339(),
            "returnDate": (pickup + Duration::days(1)).to_rfc3339(),
            "pickupLocation": "Springfield Airport",
            "returnLocation": "Springfield Airport",
        }),
    )
    .await;
    assert_eq!(status, Status::Created, "{}", body);
    let id = body["booking"]["id"].as_str().unwrap().to_string();

    let response = client
        .patch(format!("/api/bookings/{}/cancel", id))
        .header(bearer(&renter))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Ok);
    let body = response.into_json::<Value>().await.unwrap();
    assert_eq!(body["booking"]["status"], "cancelled");
    assert!(body["booking"]["cancellationReason"].is_null());
}

#[rocket::async_test]
#[ignore]
async fn auth_and_roles_are_enforced() {
    let client = client().await;
    let renter = register(&client).await;

    let (status, body) = post_json(&client, "/api/bookings", None, json!({})).await;
    assert_eq!(status, Status::Unauthorized);
    assert_eq!(body["success"], false);

    let response = client
        .get("/api/bookings/stats")
        .header(bearer(&renter))
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::Forbidden);

    let (status, body) = post_json(
        &client,
        "/api/auth/login",
        None,
        json!({ "email": "nobody@example.com", "password": "wrong-password" }),
    )
    .await;
    assert_eq!(status, Status::Unauthorized);
    assert_eq!(body["message"], "Invalid credentials");
}

#[rocket::async_test]
#[ignore]
async fn invalid_payloads_report_field_errors() {
    let client = client().await;
    let renter = register(&client).await;

    let (status, body) = post_json(
        &client,
        "/api/bookings",
        Some(&renter),
        json!({
            "carId": "not-an-id",
            "pickupDate": "tomorrow",
            "returnDate": "2030-01-03",
            "pickupLocation": "A",
            "returnLocation": "Downtown",
        }),
    )
    .await;
    assert_eq!(status, Status::BadRequest);
    let fields: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["carId", "pickupDate", "pickupLocation"]);

    let response = client
        .post("/api/bookings")
        .header(ContentType::JSON)
        .header(bearer(&renter))
        .body("{not json")
        .dispatch()
        .await;
    assert_eq!(response.status(), Status::BadRequest);

    let response = client.get("/api/no-such-route").dispatch().await;
    assert_eq!(response.status(), Status::NotFound);
}
