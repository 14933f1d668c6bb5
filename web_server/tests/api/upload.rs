use crate::helpers::{pdf_bytes, spawn_app};

async fn error_message(response: reqwest::Response) -> String {
    let body: serde_json::Value = response.json().await.expect("Error body is not JSON");
    body["error"].as_str().unwrap_or_default().to_owned()
}

#[tokio::test]
async fn upload_same_type_files_succeeds() {
    let app = spawn_app().await;

    let response = app
        .upload(
            vec![("a.pdf", pdf_bytes(&["A"])), ("b.PDF", pdf_bytes(&["B"]))],
            Some("false"),
        )
        .await;

    assert_eq!(response.status(), 200);
    let cookie = response
        .cookies()
        .find(|cookie| cookie.name() == "batch_id")
        .map(|cookie| cookie.value().to_owned())
        .expect("Upload did not set the batch cookie");
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["message"], "2 files uploaded successfully.");
    assert_eq!(body["batch_id"], cookie.as_str());
}

#[tokio::test]
async fn upload_without_files_is_rejected() {
    let app = spawn_app().await;

    let response = app.upload(vec![], Some("true")).await;

    assert_eq!(response.status(), 400);
    assert_eq!(error_message(response).await, "No files uploaded.");
}

#[tokio::test]
async fn upload_disallowed_extension_is_rejected() {
    let app = spawn_app().await;

    let response = app
        .upload(
            vec![("a.txt", b"fine".to_vec()), ("run.exe", b"MZ".to_vec())],
            None,
        )
        .await;

    assert_eq!(response.status(), 400);
    assert_eq!(error_message(response).await, "File not allowed: run.exe");
}

#[tokio::test]
async fn upload_mixed_extensions_is_rejected() {
    let app = spawn_app().await;

    let response = app
        .upload(
            vec![("a.jpg", b"jpg".to_vec()), ("b.jpeg", b"jpeg".to_vec())],
            None,
        )
        .await;

    assert_eq!(response.status(), 400);
    assert_eq!(
        error_message(response).await,
        "All files must be of the same type."
    );
}

#[tokio::test]
async fn upload_that_is_not_multipart_is_rejected() {
    let app = spawn_app().await;

    let response = app
        .client
        .post(format!("{}/upload", &app.address))
        .header("Content-Type", "application/json")
        .body("{}")
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 400);
    assert_eq!(error_message(response).await, "No files uploaded.");
}

#[tokio::test]
async fn upload_without_content_type_is_rejected() {
    let app = spawn_app().await;

    let response = app
        .client
        .post(format!("{}/upload", &app.address))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 400);
    assert_eq!(error_message(response).await, "No files uploaded.");
}
