use std::io::Cursor;
use std::sync::LazyLock;

use dotenv::dotenv;
use image::{ImageFormat, Rgb, RgbImage};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream};
use reqwest::Response;
use reqwest::multipart::{Form, Part};
use web_server::app_settings::get_app_settings;
use web_server::startup::Application;
use web_server::telemetry::{get_telemetry_subscriber, init_telemetry_subscriber};

pub struct TestApp {
    /// Address where our app will be listening to HTTP requests.
    /// Commonly using 127.0.0.1:[port] during local tests.
    ///
    /// Port is assigned dynamically based on what the OS provides.
    pub address: String,
    pub client: reqwest::Client,
}

impl TestApp {
    /// Upload `files` as `(name, bytes)` pairs. `save_as_pdf` is sent as is
    /// when present.
    pub async fn upload(&self, files: Vec<(&str, Vec<u8>)>, save_as_pdf: Option<&str>) -> Response {
        let mut form = Form::new();
        for (name, bytes) in files {
            form = form.part("files", Part::bytes(bytes).file_name(name.to_owned()));
        }
        if let Some(flag) = save_as_pdf {
            form = form.text("save_as_pdf", flag.to_owned());
        }

        self.client
            .post(format!("{}/upload", &self.address))
            .multipart(form)
            .send()
            .await
            .expect("Failed to execute upload request")
    }

    /// Upload and return the new batch id, failing the test on rejection.
    pub async fn upload_batch(&self, files: Vec<(&str, Vec<u8>)>, save_as_pdf: bool) -> String {
        let flag = if save_as_pdf { "true" } else { "false" };
        let response = self.upload(files, Some(flag)).await;
        assert_eq!(response.status(), 200);
        let body: serde_json::Value = response.json().await.expect("Upload body is not JSON");
        body["batch_id"]
            .as_str()
            .expect("Upload response has no batch_id")
            .to_owned()
    }

    pub async fn merge(&self, batch_id: &str) -> Response {
        self.client
            .post(format!("{}/merge", &self.address))
            .query(&[("batch_id", batch_id)])
            .send()
            .await
            .expect("Failed to execute merge request")
    }
}

#[allow(clippy::let_underscore_future)]
pub async fn spawn_app() -> TestApp {
    dotenv().ok();

    LazyLock::force(&TRACING);

    let mut settings = get_app_settings().expect("Could not get App Settings");
    // using "0" as port will let the OS bind our test server to
    // a random available port. This allows us to run multiple instances
    // of our web server and test it in parallel
    settings.application.port = 0;
    settings.application.host = "127.0.0.1".to_owned();

    let app: Application = Application::build(settings)
        .await
        .expect("Could not build Application server");

    let app_port = app.port();
    let _ = tokio::spawn(app.run_until_stopped());

    let address = format!("http://127.0.0.1:{app_port}");
    TestApp {
        address,
        client: reqwest::Client::new(),
    }
}

static TRACING: LazyLock<()> = LazyLock::new(|| {
    let result = if std::env::var("TEST_LOG").is_ok() {
        let subscriber =
            get_telemetry_subscriber("docmerge", "test", "test", "info", std::io::stdout);
        init_telemetry_subscriber(subscriber)
    } else {
        let subscriber =
            get_telemetry_subscriber("docmerge", "test", "test", "info", std::io::sink);
        init_telemetry_subscriber(subscriber)
    };
    result.expect("Could not init telemetry");
});

/// A PDF with one page per label; each page prints its label.
pub fn pdf_bytes(labels: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Font".to_vec())),
        ("Subtype", Object::Name(b"Type1".to_vec())),
        ("BaseFont", Object::Name(b"Helvetica".to_vec())),
    ]));
    let resources_id = doc.add_object(Dictionary::from_iter([(
        "Font",
        Object::Dictionary(Dictionary::from_iter([("F1", Object::Reference(font_id))])),
    )]));

    let kids: Vec<Object> = labels
        .iter()
        .map(|label| {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Integer(18)]),
                    Operation::new("Td", vec![Object::Integer(72), Object::Integer(720)]),
                    Operation::new("Tj", vec![Object::string_literal(*label)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(Dictionary::new(), content.encode().unwrap()));
            let page_id = doc.add_object(Dictionary::from_iter([
                ("Type", Object::Name(b"Page".to_vec())),
                ("Parent", Object::Reference(pages_id)),
                ("Contents", Object::Reference(content_id)),
                ("Resources", Object::Reference(resources_id)),
                (
                    "MediaBox",
                    Object::Array(vec![
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Integer(612),
                        Object::Integer(792),
                    ]),
                ),
            ]));
            Object::Reference(page_id)
        })
        .collect();

    doc.objects.insert(
        pages_id,
        Object::Dictionary(Dictionary::from_iter([
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(kids.len() as i64)),
            ("Kids", Object::Array(kids)),
        ])),
    );
    let catalog_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("Could not build test PDF");
    bytes
}

pub fn image_bytes(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    RgbImage::from_pixel(width, height, Rgb([200, 40, 40]))
        .write_to(&mut bytes, format)
        .expect("Could not encode test image");
    bytes.into_inner()
}
