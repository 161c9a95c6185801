pub mod availability;
pub mod booking;
pub mod car_lock;
pub mod jwt;
pub mod password;

pub use availability::AvailabilityService;
pub use booking::BookingService;
pub use car_lock::CarLock;
pub use jwt::JwtService;
pub use password::PasswordService;
