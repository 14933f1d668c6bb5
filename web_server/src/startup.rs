use std::net::TcpListener;
use std::path::Path;

use actix_multipart::form::MultipartFormConfig;
use actix_multipart::form::tempfile::TempFileConfig;
use actix_web::{App, HttpServer, dev::Server, web};
use tracing_actix_web::TracingLogger;

use crate::app_settings::AppSettings;
use crate::errors::ApiError;
use crate::routes::{health::health_check, index::index, merge::merge, upload::upload};
use crate::storage::UploadStore;

pub struct Application {
    port: u16,
    server: Server,
}

impl Application {
    pub async fn build(settings: AppSettings) -> Result<Self, std::io::Error> {
        let address = format!(
            "{}:{}",
            settings.application.host, settings.application.port
        );
        let listener = TcpListener::bind(address)?;
        let port = listener.local_addr()?.port();

        let store = UploadStore::new(settings.uploads.temp_root.as_deref().map(Path::new))?;
        let server = run(listener, settings, store)?;
        Ok(Self { server, port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Run the web server and blocks the main thread until it stops
    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        self.server.await
    }
}

fn run(
    listener: TcpListener,
    settings: AppSettings,
    store: UploadStore,
) -> Result<Server, std::io::Error> {
    let port = listener.local_addr()?.port();

    let max_payload_bytes = settings.uploads.max_payload_bytes;
    // Spool uploads next to the batches so storing them is a local copy
    let spool_dir = store.root().to_path_buf();
    let store = web::Data::new(store);

    let server = HttpServer::new(move || {
        let multipart_config = MultipartFormConfig::default()
            .total_limit(max_payload_bytes)
            .error_handler(|error, _req| ApiError::BadRequest(error.to_string()).into());

        App::new()
            .wrap(TracingLogger::default())
            .route("/", web::get().to(index))
            .route("/upload", web::post().to(upload))
            .route("/merge", web::post().to(merge))
            .route("/management/health", web::get().to(health_check))
            .app_data(multipart_config)
            .app_data(TempFileConfig::default().directory(&spool_dir))
            .app_data(store.clone())
    })
    .listen(listener)?
    .run();

    tracing::info!("Document merge web server is running. port={port}");

    Ok(server)
}
