use actix_web::{dev::Payload, FromRequest, HttpRequest};
use std::future::{ready, Ready};

use crate::core::AppError;

/// Per-request acting context for ledger operations.
///
/// Tenancy resolution and authorization happen upstream; by the time a
/// request reaches this service the gateway has already validated the
/// school and user and forwarded them as headers. Every operation takes
/// this context explicitly instead of reading ambient state.
#[derive(Debug, Clone)]
pub struct SchoolContext {
    pub school_id: String,
    pub user_id: String,
}

impl SchoolContext {
    pub fn new(school_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            school_id: school_id.into(),
            user_id: user_id.into(),
        }
    }
}

fn header_value(req: &HttpRequest, name: &str) -> Result<String, AppError> {
    req.headers()
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::validation(format!("Missing {} header", name)))
}

impl FromRequest for SchoolContext {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let context = header_value(req, "X-School-Id").and_then(|school_id| {
            let user_id = header_value(req, "X-User-Id")?;
            Ok(SchoolContext {
                school_id,
                user_id,
            })
        });

        ready(context)
    }
}
