use image::ImageFormat;
use lopdf::Document;

use crate::helpers::{image_bytes, pdf_bytes, spawn_app};

fn header(response: &reqwest::Response, name: &str) -> String {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_owned()
}

#[tokio::test]
async fn merge_pdfs_keeps_every_page() {
    let app = spawn_app().await;
    let batch_id = app
        .upload_batch(
            vec![("a.pdf", pdf_bytes(&["A1", "A2"])), ("b.pdf", pdf_bytes(&["B1"]))],
            false,
        )
        .await;

    let response = app.merge(&batch_id).await;

    assert_eq!(response.status(), 200);
    assert_eq!(header(&response, "content-type"), "application/pdf");
    assert!(header(&response, "content-disposition").contains("merged_document.pdf"));
    let bytes = response.bytes().await.unwrap();
    let merged = Document::load_mem(&bytes).expect("Merged output is not a PDF");
    assert_eq!(merged.get_pages().len(), 3);
}

#[tokio::test]
async fn merge_images_stacks_them() {
    let app = spawn_app().await;
    let batch_id = app
        .upload_batch(
            vec![
                ("top.png", image_bytes(40, 10, ImageFormat::Png)),
                ("bottom.png", image_bytes(25, 30, ImageFormat::Png)),
            ],
            false,
        )
        .await;

    let response = app.merge(&batch_id).await;

    assert_eq!(response.status(), 200);
    assert!(header(&response, "content-disposition").contains("merged_document.png"));
    let bytes = response.bytes().await.unwrap();
    let merged = image::load_from_memory(&bytes).expect("Merged output is not an image");
    assert_eq!((merged.width(), merged.height()), (40, 40));
}

#[tokio::test]
async fn merge_images_as_pdf() {
    let app = spawn_app().await;
    let batch_id = app
        .upload_batch(
            vec![
                ("a.jpg", image_bytes(16, 16, ImageFormat::Jpeg)),
                ("b.jpg", image_bytes(16, 8, ImageFormat::Jpeg)),
                ("c.jpg", image_bytes(8, 16, ImageFormat::Jpeg)),
            ],
            true,
        )
        .await;

    let response = app.merge(&batch_id).await;

    assert_eq!(response.status(), 200);
    assert!(header(&response, "content-disposition").contains("merged_document.pdf"));
    let bytes = response.bytes().await.unwrap();
    assert_eq!(Document::load_mem(&bytes).unwrap().get_pages().len(), 3);
}

#[tokio::test]
async fn merge_text_twice_gives_the_same_bytes() {
    let app = spawn_app().await;
    let batch_id = app
        .upload_batch(
            vec![("one.txt", b"first".to_vec()), ("two.txt", b"second".to_vec())],
            false,
        )
        .await;

    let first = app.merge(&batch_id).await;
    assert_eq!(first.status(), 200);
    assert!(header(&first, "content-disposition").contains("merged_document.txt"));
    let first = first.bytes().await.unwrap();
    let second = app.merge(&batch_id).await.bytes().await.unwrap();

    assert_eq!(&first[..], b"first\nsecond\n");
    assert_eq!(first, second);
}

#[tokio::test]
async fn merge_uses_the_batch_cookie() {
    let app = spawn_app().await;
    let batch_id = app
        .upload_batch(
            vec![("one.txt", b"a".to_vec()), ("two.txt", b"b".to_vec())],
            false,
        )
        .await;

    let response = app
        .client
        .post(format!("{}/merge", &app.address))
        .header("Cookie", format!("batch_id={batch_id}"))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 200);
    assert_eq!(&response.bytes().await.unwrap()[..], b"a\nb\n");
}

#[tokio::test]
async fn merge_single_file_is_rejected() {
    let app = spawn_app().await;
    let batch_id = app
        .upload_batch(vec![("only.pdf", pdf_bytes(&["A"]))], false)
        .await;

    let response = app.merge(&batch_id).await;

    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Upload at least two files first.");
}

#[tokio::test]
async fn merge_without_batch_is_rejected() {
    let app = spawn_app().await;

    let response = app
        .client
        .post(format!("{}/merge", &app.address))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Upload at least two files first.");
}

#[tokio::test]
async fn merge_corrupt_pdf_fails_with_server_error() {
    let app = spawn_app().await;
    let batch_id = app
        .upload_batch(
            vec![("a.pdf", pdf_bytes(&["A"])), ("b.pdf", b"not a pdf".to_vec())],
            false,
        )
        .await;

    let response = app.merge(&batch_id).await;

    assert_eq!(response.status(), 500);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().starts_with("Merge failed: "));
}

#[tokio::test]
async fn new_upload_replaces_the_previous_batch() {
    let app = spawn_app().await;
    let old_batch = app
        .upload_batch(
            vec![("one.txt", b"a".to_vec()), ("two.txt", b"b".to_vec())],
            false,
        )
        .await;

    // A rejected upload still drops the batch named by the cookie
    let response = app
        .client
        .post(format!("{}/upload", &app.address))
        .header("Cookie", format!("batch_id={old_batch}"))
        .multipart(reqwest::multipart::Form::new())
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 400);

    assert_eq!(app.merge(&old_batch).await.status(), 400);
}

#[tokio::test]
async fn upload_that_is_not_a_form_still_drops_the_previous_batch() {
    let app = spawn_app().await;
    let old_batch = app
        .upload_batch(
            vec![("one.txt", b"a".to_vec()), ("two.txt", b"b".to_vec())],
            false,
        )
        .await;
    assert_eq!(app.merge(&old_batch).await.status(), 200);

    let response = app
        .client
        .post(format!("{}/upload", &app.address))
        .header("Cookie", format!("batch_id={old_batch}"))
        .header("Content-Type", "multipart/form-data; boundary=missing")
        .body("not a multipart body")
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 400);

    let response = app.merge(&old_batch).await;
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Upload at least two files first.");
}
