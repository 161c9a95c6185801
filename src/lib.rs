#[macro_use]
extern crate rocket;

pub mod config;
pub mod db;
pub mod guards;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use rocket::fairing::{Fairing, Info, Kind};
use rocket::http::Header;
use rocket::{Build, Request, Response, Rocket};
use rocket_okapi::swagger_ui::{make_swagger_ui, SwaggerUIConfig};

use crate::utils::ApiError;

/* ----------------------------- CORS ----------------------------- */

pub struct Cors;

#[rocket::async_trait]
impl Fairing for Cors {
    fn info(&self) -> Info {
        Info {
            name: "CORS",
            kind: Kind::Response,
        }
    }

    async fn on_response<'r>(&self, request: &'r Request<'_>, response: &mut Response<'r>) {
        if let Some(origin) = request.headers().get_one("Origin") {
            response.set_header(Header::new("Access-Control-Allow-Origin", origin.to_string()));
        }

        response.set_header(Header::new(
            "Access-Control-Allow-Methods",
            "GET, POST, PUT, PATCH, DELETE, OPTIONS",
        ));

        response.set_header(Header::new(
            "Access-Control-Allow-Headers",
            "Content-Type, Authorization",
        ));

        response.set_header(Header::new("Access-Control-Allow-Credentials", "true"));
    }
}

/* ----------------------------- OPTIONS ----------------------------- */

#[options("/<_..>")]
fn options_handler() {}

/* ----------------------------- ERRORS ----------------------------- */

#[catch(400)]
fn bad_request() -> ApiError {
    ApiError::bad_request("Bad request")
}

/// Malformed or mistyped JSON bodies fail the data guard with 422.
#[catch(422)]
fn unprocessable() -> ApiError {
    ApiError::bad_request("Validation failed")
}

#[catch(401)]
fn unauthorized() -> ApiError {
    ApiError::unauthorized("Not authorized, token missing or invalid")
}

#[catch(403)]
fn forbidden() -> ApiError {
    ApiError::forbidden("Not authorized to access this route")
}

#[catch(404)]
fn not_found(req: &Request) -> ApiError {
    ApiError::not_found(format!("Route {} not found", req.uri().path()))
}

#[catch(500)]
fn internal_error() -> ApiError {
    ApiError::internal_error("Internal server error")
}

/* ----------------------------- SWAGGER ----------------------------- */

fn swagger_config() -> SwaggerUIConfig {
    SwaggerUIConfig {
        url: "../openapi.json".to_string(),
        ..Default::default()
    }
}

/* ----------------------------- BUILD ----------------------------- */

/// Assembles the application: database fairing, CORS, routes under `/api`
/// and JSON catchers.
pub fn build_rocket() -> Rocket<Build> {
    rocket::build()
        .attach(db::init())
        .attach(Cors)
        .mount("/", routes![options_handler])
        .mount(
            "/api",
            rocket_okapi::openapi_get_routes![
                // Auth
                routes::auth::register,
                routes::auth::login,
                routes::auth::logout,
                routes::auth::get_profile,
                routes::auth::update_profile,
                routes::auth::change_password,
                // Cars
                routes::car::list_cars,
                routes::car::get_car,
                routes::car::check_availability,
                routes::car::cars_by_location,
                // Cars - Admin
                routes::car::create_car,
                routes::car::update_car,
                routes::car::delete_car,
                routes::car::toggle_availability,
                // Bookings
                routes::booking::create_booking,
                routes::booking::my_bookings,
                routes::booking::get_booking,
                routes::booking::cancel_booking,
                // Bookings - Admin
                routes::booking::all_bookings,
                routes::booking::booking_stats,
                routes::booking::update_status,
                routes::booking::update_payment,
            ],
        )
        .mount("/api/docs", make_swagger_ui(&swagger_config()))
        .register(
            "/",
            catchers![
                bad_request,
                unprocessable,
                unauthorized,
                forbidden,
                not_found,
                internal_error
            ],
        )
}
