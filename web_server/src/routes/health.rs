use actix_web::{HttpResponse, Responder, http::header::ContentType};
use tracing::instrument;

#[instrument]
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok()
        .content_type(ContentType::plaintext())
        .body("Web server is up")
}
