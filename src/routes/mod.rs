pub mod auth;
pub mod booking;
pub mod car;
