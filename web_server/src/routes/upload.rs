use actix_multipart::form::{MultipartForm, tempfile::TempFile, text::Text};
use actix_web::cookie::{Cookie, SameSite};
use actix_web::http::header::CONTENT_TYPE;
use actix_web::{HttpRequest, HttpResponse, web};
use merger::ValidationError;
use serde::Serialize;
use tracing::instrument;

use crate::errors::ApiError;
use crate::routes::{BATCH_COOKIE, batch_from_cookie};
use crate::storage::{IncomingFile, UploadStore};

#[derive(Debug, MultipartForm)]
pub struct UploadForm {
    pub files: Vec<TempFile>,
    pub save_as_pdf: Option<Text<String>>,
}

#[derive(Serialize)]
struct UploadResponse {
    message: String,
    batch_id: String,
}

/// Replace the caller's batch with the uploaded files.
///
/// The previous batch is dropped before the new files are checked, so a
/// rejected upload leaves the caller with no batch at all. That includes
/// requests whose body could not be read as a multipart form.
#[instrument(skip_all)]
pub async fn upload(
    req: HttpRequest,
    form: Result<MultipartForm<UploadForm>, actix_web::Error>,
    store: web::Data<UploadStore>,
) -> Result<HttpResponse, ApiError> {
    if let Some(previous) = batch_from_cookie(&req) {
        store.discard(previous).await;
    }

    let form = match form {
        Ok(MultipartForm(form)) => form,
        Err(_) if !is_multipart(&req) => return Err(ValidationError::NoFiles.into()),
        Err(error) => {
            tracing::warn!("Could not read upload form. error={error}");
            return Err(ApiError::BadRequest(error.to_string()));
        }
    };

    let save_as_pdf = form
        .save_as_pdf
        .as_ref()
        .is_some_and(|flag| flag.as_str() == "true");

    // Browsers send an empty part when no file was picked
    let files: Vec<IncomingFile> = form
        .files
        .iter()
        .filter(|file| file.file_name.as_deref().is_some_and(|name| !name.is_empty()))
        .map(|file| IncomingFile {
            file_name: file.file_name.clone().unwrap_or_default(),
            path: file.file.path().to_path_buf(),
        })
        .collect();

    let (batch_id, count) = store.create(&files, save_as_pdf).await?;

    let cookie = Cookie::build(BATCH_COOKIE, batch_id.to_string())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .finish();

    Ok(HttpResponse::Ok().cookie(cookie).json(UploadResponse {
        message: format!("{count} files uploaded successfully."),
        batch_id: batch_id.to_string(),
    }))
}

fn is_multipart(req: &HttpRequest) -> bool {
    req.headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.trim_start().to_ascii_lowercase().starts_with("multipart/form-data"))
}
