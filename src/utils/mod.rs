pub mod pagination;
pub mod response;
pub mod validation;

pub use pagination::Page;
pub use response::{ApiError, ApiResponse, ErrorBody, FieldError};
pub use validation::{parse_date, parse_object_id, require_date};
