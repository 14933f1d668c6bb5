use actix_web::{HttpResponse, Responder, http::header::ContentType};

const INDEX_PAGE: &str = include_str!("../../static/index.html");

pub async fn index() -> impl Responder {
    HttpResponse::Ok()
        .content_type(ContentType::html())
        .body(INDEX_PAGE)
}
