//! Image upload command

use anyhow::{anyhow, Result};
use bytes::Bytes;
use std::io::{self, Write};
use std::path::Path;
use tokio::sync::mpsc;

use crate::config::ClientConfig;
use crate::upload::{HttpImageHost, ImageHost, UploadProgress};

use super::{print_error, print_success};

/// Run the upload command
pub async fn run(config: ClientConfig, path: &Path) -> Result<()> {
    let upload = &config.upload;
    let host = match HttpImageHost::new(&upload.base_url, &upload.cloud_name, &upload.upload_preset)
    {
        Ok(host) => host,
        Err(e) => {
            print_error(&e.to_string());
            return Ok(());
        }
    };

    let data = tokio::fs::read(path)
        .await
        .map_err(|e| anyhow!("Failed to read {}: {}", path.display(), e))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());

    let (tx, mut rx) = mpsc::unbounded_channel::<UploadProgress>();
    let printer = tokio::spawn(async move {
        let mut last = None;
        while let Some(progress) = rx.recv().await {
            let percent = progress.percent();
            if last != Some(percent) {
                print!("\rUploading... {:>3}%", percent);
                let _ = io::stdout().flush();
                last = Some(percent);
            }
        }
        println!();
    });

    let result = host.upload(&file_name, Bytes::from(data), Some(tx)).await;
    // The sender is dropped with the upload, which ends the printer
    let _ = printer.await;

    match result {
        Ok(image) => {
            print_success(&format!("Uploaded {}", file_name));
            println!("  URL: {}", image.secure_url);
            println!("  ID:  {}", image.public_id);
        }
        Err(e) => print_error(&e.to_string()),
    }
    Ok(())
}
