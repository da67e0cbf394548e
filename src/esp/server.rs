use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use esp_idf_svc::http::server::{Configuration, EspHttpServer};
use esp_idf_svc::http::Method;
use esp_idf_svc::io::Write;
use log::{error, info};

use crate::config::HttpSettings;
use crate::esp::camera::EspCamera;
use crate::esp::motors::EspDriveController;
use crate::page::control_page;
use crate::stream::{self, capture_jpeg, MjpegStream, StreamError};

const CORS: (&str, &str) = ("Access-Control-Allow-Origin", "*");
const TEXT_PLAIN: (&str, &str) = ("Content-Type", "text/plain");

/// Running HTTP servers. Dropping this stops them.
pub struct Servers {
    _main: EspHttpServer<'static>,
    _stream: Option<EspHttpServer<'static>>,
}

/// Start the control server and, when enabled, the dedicated stream server.
///
/// The httpd runs all handlers of one server on a single task, so a stream
/// served from the main server holds off `/drive` until it ends.
pub fn start(
    settings: &HttpSettings,
    drive: Arc<Mutex<EspDriveController>>,
    camera: EspCamera,
    jpeg_quality: u8,
) -> anyhow::Result<Servers> {
    let mut main = EspHttpServer::new(&Configuration {
        http_port: settings.port,
        ctrl_port: settings.ctrl_port(),
        ..Default::default()
    })?;

    main.fn_handler("/drive", Method::Get, move |request| -> anyhow::Result<()> {
        let outcome = drive
            .lock()
            .map_err(|_| anyhow!("drive controller lock poisoned"))?
            .dispatch(request.uri());

        match outcome {
            Ok(outcome) => {
                request
                    .into_response(outcome.status(), Some(outcome.reason()), &[CORS, TEXT_PLAIN])?
                    .write_all(outcome.body().as_bytes())?;
            }
            Err(err) => {
                error!("Drive command failed: {err}");
                request
                    .into_response(500, Some("Internal Server Error"), &[CORS, TEXT_PLAIN])?
                    .write_all(err.to_string().as_bytes())?;
            }
        }
        Ok(())
    })?;

    register_stream(&mut main, camera, jpeg_quality)?;

    for uri in ["/capture", "/image"] {
        let mut camera = camera;
        main.fn_handler(uri, Method::Get, move |request| -> anyhow::Result<()> {
            match capture_jpeg(&mut camera, jpeg_quality) {
                Ok(jpeg) => {
                    request
                        .into_response(200, Some("OK"), &[CORS, ("Content-Type", "image/jpeg")])?
                        .write_all(jpeg.as_ref())?;
                }
                Err(err) => {
                    error!("Single capture failed: {err}");
                    request
                        .into_response(500, Some("Internal Server Error"), &[CORS, TEXT_PLAIN])?
                        .write_all(b"Camera Capture Failed")?;
                }
            }
            Ok(())
        })?;
    }

    let stream_port = settings.stream_server.then(|| settings.stream_port());
    let page = control_page(stream_port);
    main.fn_handler("/", Method::Get, move |request| -> anyhow::Result<()> {
        request
            .into_response(200, Some("OK"), &[("Content-Type", "text/html")])?
            .write_all(page.as_bytes())?;
        Ok(())
    })?;

    info!(
        "HTTP server on port {} (ctrl {})",
        settings.port,
        settings.ctrl_port()
    );

    let stream_server = if settings.stream_server {
        let mut server = EspHttpServer::new(&Configuration {
            http_port: settings.stream_port(),
            ctrl_port: settings.stream_ctrl_port(),
            ..Default::default()
        })?;
        register_stream(&mut server, camera, jpeg_quality)?;
        info!("Stream server on port {}", settings.stream_port());
        Some(server)
    } else {
        None
    };

    Ok(Servers {
        _main: main,
        _stream: stream_server,
    })
}

fn register_stream(
    server: &mut EspHttpServer<'static>,
    camera: EspCamera,
    jpeg_quality: u8,
) -> anyhow::Result<()> {
    server.fn_handler("/stream", Method::Get, move |request| -> anyhow::Result<()> {
        let mut response =
            request.into_response(200, Some("OK"), &[("Content-Type", stream::CONTENT_TYPE)])?;

        info!("Client connected to stream.");
        let mut stream = MjpegStream::new(camera, jpeg_quality);

        match stream.run(&mut response) {
            // Disconnects end every stream, nothing to report upstream.
            StreamError::Write(_) => Ok(()),
            err => Err(anyhow::Error::from(err)),
        }
    })?;
    Ok(())
}
