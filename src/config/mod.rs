use rocket::figment::{Figment, Profile, providers::{Env, Format, Toml}};
use rocket::Config as RocketConfig;
use std::env;
use std::sync::OnceLock;

static FIGMENT: OnceLock<Figment> = OnceLock::new();

pub struct Config;

impl Config {
    fn figment() -> &'static Figment {
        FIGMENT.get_or_init(|| {
            Figment::from(RocketConfig::default())
                .merge(Toml::file("Rocket.toml").nested())
                .merge(Env::prefixed("ROCKET_").global())
                .select(Self::profile())
        })
    }

    /// Profile named by `ROCKET_PROFILE`, falling back to Rocket's build default
    /// (`debug` or `release`).
    pub fn profile() -> Profile {
        env::var("ROCKET_PROFILE")
            .map(|p| Profile::new(&p))
            .unwrap_or(RocketConfig::DEFAULT_PROFILE)
    }

    pub fn jwt_secret() -> String {
        Self::figment()
            .extract_inner("jwt_secret")
            .unwrap_or_else(|_| "default-secret".to_string())
    }

    /// Access token lifetime in seconds.
    pub fn jwt_expiry() -> i64 {
        Self::figment()
            .extract_inner("jwt_expiry")
            .unwrap_or(7 * 24 * 60 * 60)
    }

    pub fn mongodb_uri() -> String {
        Self::figment()
            .extract_inner("mongodb_uri")
            .unwrap_or_else(|_| "mongodb://localhost:27017".to_string())
    }

    pub fn mongodb_database() -> String {
        Self::figment()
            .extract_inner("mongodb_database")
            .unwrap_or_else(|_| "car-rental".to_string())
    }

    pub fn bcrypt_cost() -> u32 {
        Self::figment()
            .extract_inner("bcrypt_cost")
            .unwrap_or(bcrypt::DEFAULT_COST)
    }

    /// Lease duration of a per-car booking lock, in milliseconds.
    pub fn car_lock_ttl_ms() -> i64 {
        Self::figment()
            .extract_inner("car_lock_ttl_ms")
            .unwrap_or(10_000)
    }

    pub fn is_development() -> bool {
        Self::profile() == RocketConfig::DEBUG_PROFILE
    }
}
