use std::fs;

use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{HttpRequest, HttpResponse, web};
use merger::{MergeError, MergedDocument, merge_files};
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;

use crate::errors::ApiError;
use crate::routes::batch_from_cookie;
use crate::storage::UploadStore;

#[derive(Debug, Deserialize)]
pub struct MergeQuery {
    batch_id: Option<String>,
}

/// Merge the caller's batch and send the result back as a download.
///
/// The batch comes from the `batch_id` query parameter, or the cookie set on
/// upload. The batch is kept, so merging again gives the same result.
#[instrument(skip(req, store))]
pub async fn merge(
    req: HttpRequest,
    query: web::Query<MergeQuery>,
    store: web::Data<UploadStore>,
) -> Result<HttpResponse, ApiError> {
    let batch_id = match query.batch_id.as_deref() {
        Some(raw) => Some(
            Uuid::parse_str(raw)
                .map_err(|_| ApiError::BadRequest(format!("Invalid batch id: {raw}")))?,
        ),
        None => batch_from_cookie(&req),
    };

    // Without a batch there is nothing to merge, same as an empty one
    let batch = match batch_id {
        Some(id) => store.get(id).await,
        None => None,
    }
    .ok_or(MergeError::TooFewFiles)?;

    let (merged, content) = web::block(move || -> Result<(MergedDocument, Vec<u8>), MergeError> {
        let merged = merge_files(&batch.files, batch.save_as_pdf, &batch.dir)?;
        let content = fs::read(&merged.path)?;
        Ok((merged, content))
    })
    .await
    .map_err(|error| {
        tracing::error!("Merge task did not complete. error={error}");
        ApiError::Internal(format!("Merge failed: {error}"))
    })??;

    tracing::info!(
        "Sending merged document. name={} bytes={}",
        merged.download_name(),
        content.len()
    );

    Ok(HttpResponse::Ok()
        .content_type(merged.content_type())
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(merged.download_name())],
        })
        .body(content))
}
