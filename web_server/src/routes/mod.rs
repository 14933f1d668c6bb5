use actix_web::HttpRequest;
use uuid::Uuid;

pub mod health;
pub mod index;
pub mod merge;
pub mod upload;

/// Cookie (and query parameter) naming the caller's current batch.
pub const BATCH_COOKIE: &str = "batch_id";

/// Batch id carried by the request cookie. Malformed ids count as missing.
pub fn batch_from_cookie(req: &HttpRequest) -> Option<Uuid> {
    req.cookie(BATCH_COOKIE)
        .and_then(|cookie| Uuid::parse_str(cookie.value()).ok())
}
