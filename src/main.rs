use dotenvy::dotenv;
use log::info;

#[rocket::launch]
fn rocket() -> _ {
    dotenv().ok();
    env_logger::init();

    let profile = car_rental_server::config::Config::profile();
    info!("🚗 Car rental API starting ({} profile)", profile);
    if car_rental_server::config::Config::is_development() {
        info!("📚 Swagger UI → http://localhost:8000/api/docs");
    }

    car_rental_server::build_rocket()
}
