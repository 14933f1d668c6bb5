use reqwest::Response;

use crate::helpers::spawn_app;

#[tokio::test]
async fn health_check_test() {
    let app = spawn_app().await;

    let response = check_endpoint("/management/health", &app).await;
    let status_code = response.status();
    let response_body = response
        .text()
        .await
        .expect("Cannot read health check response body");

    assert!(status_code.is_success());
    assert_eq!("Web server is up", response_body);
}

#[tokio::test]
async fn index_page_is_served() {
    let app = spawn_app().await;

    let response = check_endpoint("/", &app).await;
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    let body = response.text().await.expect("Cannot read index body");

    assert!(content_type.starts_with("text/html"));
    assert!(body.contains(r#"name="files""#));
    assert!(body.contains("save_as_pdf"));
}

async fn check_endpoint(endpoint: &str, app: &crate::helpers::TestApp) -> Response {
    app.client
        .get(format!("{}{}", &app.address, endpoint))
        .send()
        .await
        .unwrap_or_else(|e| panic!("Failed to request path={endpoint}. error={e}"))
}
