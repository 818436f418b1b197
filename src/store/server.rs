//! HTTP/1 server exposing blob storage.
//!
//! Routes:
//! - `GET /` HTML index
//! - `POST /upload`, `POST /save_processed`, `POST /processed` (multipart field `file`)
//! - `GET /images` JSON listing of uploads
//! - `GET /image/<name>`, `GET /static/uploads/<name>`, `GET /static/processed/<name>`
//! - `GET /health/live`, `GET /health/ready`

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument};

use super::storage::{content_type_for, BlobStorage, StorageError, StoreArea};
use super::{BlobEntry, ErrorResponse, UploadResponse};
use crate::codec;
use crate::errors::error_logging;
use crate::observability;
use crate::pipeline_errors::PipelineError;
use crate::segmentation;

type HttpResponse = Response<Full<Bytes>>;

/// Bind the store server and start accepting connections.
///
/// Returns the bound address (useful with port 0) and the accept loop task.
pub async fn spawn_store_server(
    storage: Arc<BlobStorage>,
    addr: SocketAddr,
) -> Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    info!(address = %local_addr, "Blob store listening");

    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let storage = storage.clone();

                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let service = hyper::service::service_fn(move |req: Request<Incoming>| {
                            let storage = storage.clone();
                            async move { Ok::<_, Infallible>(handle_request(req, storage).await) }
                        });

                        if let Err(err) = http1::Builder::new().serve_connection(io, service).await
                        {
                            error_logging::log_network_error(
                                &err,
                                "serve_store_connection",
                                Some(&peer_addr.to_string()),
                                None,
                            );
                        }
                    });
                }
                Err(e) => {
                    error_logging::log_network_error(
                        &e,
                        "accept_tcp_connection",
                        Some(&local_addr.to_string()),
                        None,
                    );
                }
            }
        }
    });

    Ok((local_addr, handle))
}

async fn handle_request(req: Request<Incoming>, storage: Arc<BlobStorage>) -> HttpResponse {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let span = observability::http_span(method.as_str(), &path);

    let (route_label, response) = route(req, storage).instrument(span).await;

    observability::record_request_metrics(
        method.as_str(),
        route_label,
        response.status().as_u16(),
        start.elapsed(),
    );
    response
}

async fn route(req: Request<Incoming>, storage: Arc<BlobStorage>) -> (&'static str, HttpResponse) {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match (&method, path.as_str()) {
        (&Method::GET, "/") => ("/", index(&storage).await),
        (&Method::POST, "/upload") => ("/upload", upload(req, &storage).await),
        (&Method::POST, "/save_processed") => ("/save_processed", save_processed(req, &storage).await),
        (&Method::POST, "/processed") => ("/processed", process(req, &storage).await),
        (&Method::GET, "/images") => ("/images", list_images(&storage).await),
        (&Method::GET, "/health/live") => ("/health/live", text_response(StatusCode::OK, "OK")),
        (&Method::GET, "/health/ready") => ("/health/ready", ready(&storage)),
        (&Method::GET, p) => {
            if let Some(name) = p.strip_prefix("/image/") {
                ("/image", serve_blob(&storage, StoreArea::Uploads, name).await)
            } else if let Some(name) = p.strip_prefix("/static/uploads/") {
                ("/static/uploads", serve_blob(&storage, StoreArea::Uploads, name).await)
            } else if let Some(name) = p.strip_prefix("/static/processed/") {
                ("/static/processed", serve_blob(&storage, StoreArea::Processed, name).await)
            } else {
                ("unknown", error_response(StatusCode::NOT_FOUND, "Not Found"))
            }
        }
        _ => ("unknown", error_response(StatusCode::NOT_FOUND, "Not Found")),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> HttpResponse {
    match serde_json::to_vec(body) {
        Ok(json) => {
            let mut response = Response::new(Full::new(Bytes::from(json)));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            error_logging::log_internal_error(&e, "store_server", "serialize_response");
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> HttpResponse {
    json_response(status, &ErrorResponse { error: message.into() })
}

fn text_response(status: StatusCode, body: &'static str) -> HttpResponse {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}

fn storage_error_response(err: &StorageError) -> HttpResponse {
    match err {
        StorageError::InvalidName(_) => error_response(StatusCode::BAD_REQUEST, err.to_string()),
        StorageError::NotFound(_) => error_response(StatusCode::NOT_FOUND, err.to_string()),
        StorageError::Io(_) => {
            error_logging::log_filesystem_error(err, "store_blob", None, None);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Storage failure")
        }
    }
}

/// A file pulled out of a multipart request
struct UploadedFile {
    filename: String,
    bytes: Bytes,
}

/// Read the multipart field `file` from a request, enforcing the size limit.
async fn read_file_field(
    req: Request<Incoming>,
    max_content_length: u64,
) -> Result<UploadedFile, HttpResponse> {
    let declared = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok());
    if declared.is_some_and(|len| len > max_content_length) {
        return Err(error_response(StatusCode::PAYLOAD_TOO_LARGE, "File too large"));
    }

    let boundary = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| multer::parse_boundary(value).ok())
        .ok_or_else(|| error_response(StatusCode::BAD_REQUEST, "Expected multipart/form-data"))?;

    let limit = usize::try_from(max_content_length).unwrap_or(usize::MAX);
    let body = match Limited::new(req.into_body(), limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            return Err(error_response(StatusCode::PAYLOAD_TOO_LARGE, "File too large"));
        }
        Err(e) => {
            warn!(error = %e, "Failed to read request body");
            return Err(error_response(StatusCode::BAD_REQUEST, "Could not read request body"));
        }
    };

    let stream = futures::stream::once(async move { Ok::<Bytes, Infallible>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                if filename.is_empty() {
                    return Err(error_response(StatusCode::BAD_REQUEST, "No selected file"));
                }
                let bytes = field.bytes().await.map_err(|e| {
                    error_response(StatusCode::BAD_REQUEST, format!("Malformed upload: {}", e))
                })?;
                return Ok(UploadedFile { filename, bytes });
            }
            Ok(Some(_)) => continue,
            Ok(None) => return Err(error_response(StatusCode::BAD_REQUEST, "No file part")),
            Err(e) => {
                return Err(error_response(
                    StatusCode::BAD_REQUEST,
                    format!("Malformed upload: {}", e),
                ))
            }
        }
    }
}

async fn upload(req: Request<Incoming>, storage: &BlobStorage) -> HttpResponse {
    let file = match read_file_field(req, storage.config().max_content_length).await {
        Ok(file) => file,
        Err(response) => return response,
    };

    match storage.save_upload(&file.filename, file.bytes.to_vec()).await {
        Ok(blob) => {
            info!(filename = %blob.name, size = blob.size, "Image uploaded");
            json_response(
                StatusCode::OK,
                &UploadResponse {
                    message: "File uploaded successfully".to_string(),
                    filename: blob.name,
                    url: blob.url,
                    threshold: None,
                },
            )
        }
        Err(e) => storage_error_response(&e),
    }
}

async fn save_processed(req: Request<Incoming>, storage: &BlobStorage) -> HttpResponse {
    let file = match read_file_field(req, storage.config().max_content_length).await {
        Ok(file) => file,
        Err(response) => return response,
    };

    match storage.save_processed(&file.filename, file.bytes.to_vec()).await {
        Ok(blob) => {
            info!(filename = %blob.name, size = blob.size, "Processed image saved");
            json_response(
                StatusCode::OK,
                &UploadResponse {
                    message: "Processed image saved successfully".to_string(),
                    filename: blob.name,
                    url: blob.url,
                    threshold: None,
                },
            )
        }
        Err(e) => storage_error_response(&e),
    }
}

/// Segment an uploaded image on the server and store the binary result
async fn process(req: Request<Incoming>, storage: &BlobStorage) -> HttpResponse {
    let file = match read_file_field(req, storage.config().max_content_length).await {
        Ok(file) => file,
        Err(response) => return response,
    };

    let filename = file.filename.clone();
    let computed = tokio::task::spawn_blocking(move || -> Result<(Vec<u8>, u8), PipelineError> {
        let image = codec::decode_bytes(&file.bytes)?;
        let result = segmentation::segment_image(&image)?;
        let encoded = codec::encode_gray(&result.image, &file.filename)?;
        Ok((encoded, result.threshold))
    })
    .await;

    let (encoded, threshold) = match computed {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            observability::record_error_metrics(e.kind(), "store_server");
            warn!(filename = %filename, error = %e, "Server-side processing rejected");
            return error_response(StatusCode::BAD_REQUEST, e.to_string());
        }
        Err(e) => {
            error_logging::log_internal_error(&e, "store_server", "process_image");
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Processing failed");
        }
    };

    match storage.save_processed(&filename, encoded).await {
        Ok(blob) => {
            info!(filename = %blob.name, threshold, "Image processed on server");
            json_response(
                StatusCode::OK,
                &UploadResponse {
                    message: "Image processed successfully".to_string(),
                    filename: blob.name,
                    url: blob.url,
                    threshold: Some(threshold),
                },
            )
        }
        Err(e) => storage_error_response(&e),
    }
}

async fn list_images(storage: &BlobStorage) -> HttpResponse {
    match storage.list(StoreArea::Uploads).await {
        Ok(blobs) => {
            let entries: Vec<BlobEntry> = blobs
                .into_iter()
                .map(|blob| BlobEntry {
                    name: blob.name,
                    url: blob.url,
                })
                .collect();
            json_response(StatusCode::OK, &entries)
        }
        Err(e) => storage_error_response(&e),
    }
}

async fn serve_blob(storage: &BlobStorage, area: StoreArea, name: &str) -> HttpResponse {
    match storage.read(area, name).await {
        Ok(bytes) => {
            let mut response = Response::new(Full::new(Bytes::from(bytes)));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(content_type_for(name)));
            response
        }
        Err(StorageError::InvalidName(_)) | Err(StorageError::NotFound(_)) => {
            error_response(StatusCode::NOT_FOUND, "Image not found")
        }
        Err(e) => storage_error_response(&e),
    }
}

fn ready(storage: &BlobStorage) -> HttpResponse {
    let start = Instant::now();
    let result = observability::health_checks::check_storage_health(storage.config());
    observability::record_health_check_metrics("storage", result.is_ok(), start.elapsed());

    match result {
        Ok(()) => text_response(StatusCode::OK, "OK"),
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            text_response(StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
        }
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn render_gallery(title: &str, blobs: &[super::StoredBlob]) -> String {
    let mut html = format!("<h2>{}</h2>\n<ul>\n", title);
    if blobs.is_empty() {
        html.push_str("<li><em>none yet</em></li>\n");
    }
    for blob in blobs {
        let url = escape_html(&blob.url);
        html.push_str(&format!(
            "<li><a href=\"{url}\"><img src=\"{url}\" height=\"96\" alt=\"\"> {}</a></li>\n",
            escape_html(&blob.name)
        ));
    }
    html.push_str("</ul>\n");
    html
}

async fn index(storage: &BlobStorage) -> HttpResponse {
    let uploads = storage.list(StoreArea::Uploads).await.unwrap_or_default();
    let processed = storage.list(StoreArea::Processed).await.unwrap_or_default();

    let body = format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>Otsu relay</title></head>\n<body>\n\
         <h1>Otsu relay</h1>\n\
         <form action=\"/processed\" method=\"post\" enctype=\"multipart/form-data\">\n\
         <input type=\"file\" name=\"file\" accept=\".png,.jpg,.jpeg,.gif\">\n\
         <button type=\"submit\">Binarize</button>\n</form>\n{}{}</body>\n</html>\n",
        render_gallery("Uploaded images", &uploads),
        render_gallery("Processed images", &processed),
    );

    let mut response = Response::new(Full::new(Bytes::from(body)));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
    response
}
