//! Image Upload
//!
//! Profile and banner images are stored with an external image host. The
//! host receives the file as a multipart form and answers with the public
//! URL that goes into the profile. Upload progress is reported over a
//! channel as the request body is streamed.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Timeout for a whole upload
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Body chunk size; progress is reported once per chunk
const CHUNK_SIZE: usize = 64 * 1024;

/// Default image host API root
pub const DEFAULT_UPLOAD_BASE_URL: &str = "https://api.cloudinary.com/v1_1";

/// A stored image
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadedImage {
    pub secure_url: String,
    pub public_id: String,
}

/// Bytes handed to the transport so far
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub sent: u64,
    pub total: u64,
}

impl UploadProgress {
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.sent.min(self.total) * 100) / self.total) as u8
    }
}

/// External image hosting
#[async_trait]
pub trait ImageHost: Send + Sync {
    /// Upload `data` under `file_name`, sending progress to `progress`
    async fn upload(
        &self,
        file_name: &str,
        data: Bytes,
        progress: Option<mpsc::UnboundedSender<UploadProgress>>,
    ) -> Result<UploadedImage>;
}

/// Content type guessed from the file extension
fn mime_for(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// Unsigned multipart uploads to an HTTP image host
pub struct HttpImageHost {
    client: reqwest::Client,
    endpoint: String,
    upload_preset: String,
}

impl HttpImageHost {
    pub fn new(base_url: &str, cloud_name: &str, upload_preset: &str) -> Result<Self> {
        if cloud_name.trim().is_empty() || upload_preset.trim().is_empty() {
            return Err(Error::UploadError(
                "image hosting is not configured (cloud_name and upload_preset are required)"
                    .to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(|e| Error::UploadError(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/{}/image/upload",
                base_url.trim_end_matches('/'),
                cloud_name.trim()
            ),
            upload_preset: upload_preset.trim().to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ImageHost for HttpImageHost {
    async fn upload(
        &self,
        file_name: &str,
        data: Bytes,
        progress: Option<mpsc::UnboundedSender<UploadProgress>>,
    ) -> Result<UploadedImage> {
        if data.is_empty() {
            return Err(Error::UploadError("file is empty".to_string()));
        }

        let total = data.len() as u64;
        let chunks: Vec<Bytes> = (0..data.len())
            .step_by(CHUNK_SIZE)
            .map(|start| data.slice(start..(start + CHUNK_SIZE).min(data.len())))
            .collect();

        let mut sent = 0u64;
        let stream = futures::stream::iter(chunks.into_iter().map(move |chunk| {
            sent += chunk.len() as u64;
            if let Some(tx) = &progress {
                let _ = tx.send(UploadProgress { sent, total });
            }
            Ok::<Bytes, std::io::Error>(chunk)
        }));

        let part = Part::stream_with_length(Body::wrap_stream(stream), total)
            .file_name(file_name.to_string())
            .mime_str(mime_for(file_name))
            .map_err(|e| Error::UploadError(e.to_string()))?;
        let form = Form::new()
            .part("file", part)
            .text("upload_preset", self.upload_preset.clone());

        debug!("Uploading {} ({} bytes) to {}", file_name, total, self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::UploadError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::UploadError(format!(
                "image host returned {}: {}",
                status.as_u16(),
                body
            )));
        }

        let image: UploadedImage = response
            .json()
            .await
            .map_err(|e| Error::UploadError(format!("unexpected image host response: {}", e)))?;
        info!("Uploaded {} as {}", file_name, image.public_id);
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    /// Read one HTTP request, body included
    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 8192];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);

            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let headers = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let body = &buf[end + 4..];
            let length = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok());
            let complete = match length {
                Some(length) => body.len() >= length,
                None => body.ends_with(b"0\r\n\r\n"),
            };
            if complete {
                break;
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Answer a single request with `status` and `body`
    async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            request
        });
        (format!("http://{}", addr), handle)
    }

    fn image_bytes() -> Bytes {
        Bytes::from(vec![7u8; CHUNK_SIZE * 2 + 100])
    }

    #[tokio::test]
    async fn test_upload_returns_hosted_image_and_full_progress() {
        let (base_url, server) = serve_once(
            "200 OK",
            r#"{"secure_url":"https://img.host/demo/a.png","public_id":"tips/a","bytes":131172}"#,
        )
        .await;
        let host = HttpImageHost::new(&base_url, "demo", "tips").unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let image = host.upload("a.png", image_bytes(), Some(tx)).await.unwrap();

        assert_eq!(
            image,
            UploadedImage {
                secure_url: "https://img.host/demo/a.png".to_string(),
                public_id: "tips/a".to_string(),
            }
        );

        let mut updates = Vec::new();
        while let Ok(update) = rx.try_recv() {
            updates.push(update);
        }
        assert_eq!(updates.len(), 3);
        assert!(updates.windows(2).all(|w| w[0].sent < w[1].sent));
        assert_eq!(updates.last().unwrap().percent(), 100);

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /demo/image/upload"));
        assert!(request.contains("name=\"upload_preset\""));
        assert!(request.contains("filename=\"a.png\""));
    }

    #[tokio::test]
    async fn test_upload_error_status_is_upload_error() {
        let (base_url, server) =
            serve_once("400 Bad Request", r#"{"error":{"message":"Invalid preset"}}"#).await;
        let host = HttpImageHost::new(&base_url, "demo", "nope").unwrap();

        let err = host.upload("a.png", image_bytes(), None).await.unwrap_err();

        match err {
            Error::UploadError(message) => {
                assert!(message.contains("400"), "{}", message);
                assert!(message.contains("Invalid preset"), "{}", message);
            }
            other => panic!("expected UploadError, got {:?}", other),
        }
        server.await.unwrap();
    }

    #[test]
    fn test_host_requires_configuration() {
        assert!(matches!(
            HttpImageHost::new(DEFAULT_UPLOAD_BASE_URL, "", "preset"),
            Err(Error::UploadError(_))
        ));
        let host = HttpImageHost::new("https://img.example/v1/", "demo", "tips").unwrap();
        assert_eq!(host.endpoint(), "https://img.example/v1/demo/image/upload");
    }

    #[tokio::test]
    async fn test_empty_file_rejected() {
        let host = HttpImageHost::new(DEFAULT_UPLOAD_BASE_URL, "demo", "tips").unwrap();
        let err = host.upload("a.png", Bytes::new(), None).await.unwrap_err();
        assert_eq!(err, Error::UploadError("file is empty".to_string()));
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(UploadProgress { sent: 0, total: 200 }.percent(), 0);
        assert_eq!(UploadProgress { sent: 50, total: 200 }.percent(), 25);
        assert_eq!(UploadProgress { sent: 200, total: 200 }.percent(), 100);
        assert_eq!(mime_for("Banner.JPG"), "image/jpeg");
        assert_eq!(mime_for("notes"), "application/octet-stream");
    }
}
