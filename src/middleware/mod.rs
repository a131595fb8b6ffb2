pub mod auth;
pub mod request_id;

pub use auth::SchoolContext;
pub use request_id::RequestId;
