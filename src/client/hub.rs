//! Tokenizer file retrieval.
//!
//! B_i: A local `tokenizer.json` exists → use it as is
//! I^B: Otherwise fetch it once from the configured URL and keep it

use crate::models::{InferenceConfig, QaError, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Return the configured tokenizer path, downloading it first if missing.
pub async fn ensure_tokenizer(config: &InferenceConfig) -> Result<PathBuf> {
    let path = config.tokenizer_path.clone();
    if path.exists() {
        return Ok(path);
    }
    download_file(
        &config.tokenizer_url,
        &path,
        Duration::from_secs(config.timeout_secs),
    )
    .await?;
    Ok(path)
}

/// Download `url` into `dest`, creating parent directories.
///
/// The body is written to a temp file next to `dest` and renamed into
/// place, so a failed download never leaves a truncated file behind.
pub async fn download_file(url: &str, dest: &Path, timeout: Duration) -> Result<()> {
    info!(url, dest = %dest.display(), "Downloading");

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(QaError::Network)?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            QaError::Timeout(timeout)
        } else {
            QaError::Network(e)
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(QaError::Download {
            url: url.to_string(),
            status: status.as_u16(),
            message,
        });
    }

    let bytes = response.bytes().await.map_err(QaError::Network)?;

    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| QaError::io(format!("creating {}", parent.display()), e))?;
    }

    let temp_path = dest.with_extension("part");
    if let Err(e) = persist(&temp_path, dest, &bytes).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }

    info!(bytes = bytes.len(), dest = %dest.display(), "Download complete");
    Ok(())
}

/// Write `bytes` to `temp_path`, then move it over `dest`.
async fn persist(temp_path: &Path, dest: &Path, bytes: &[u8]) -> Result<()> {
    tokio::fs::write(temp_path, bytes)
        .await
        .map_err(|e| QaError::io("writing download", e))?;
    tokio::fs::rename(temp_path, dest)
        .await
        .map_err(|e| QaError::io("renaming download", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_support::{StubServer, reply};

    #[tokio::test]
    async fn test_existing_tokenizer_is_not_downloaded() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("tokenizer.json");
        std::fs::write(&path, "{}").unwrap();

        let config = InferenceConfig {
            tokenizer_path: path.clone(),
            tokenizer_url: "http://127.0.0.1:9/never-fetched".to_string(),
            ..Default::default()
        };
        assert_eq!(ensure_tokenizer(&config).await.unwrap(), path);
    }

    #[tokio::test]
    async fn test_failed_download_leaves_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("nested/tokenizer.json");

        let result =
            download_file("http://127.0.0.1:9/tokenizer.json", &dest, Duration::from_secs(2)).await;

        assert!(result.is_err());
        assert!(!dest.exists());
        assert!(!dest.with_extension("part").exists());
    }

    #[tokio::test]
    async fn test_download_writes_body() {
        let server = StubServer::start(vec![reply("200 OK", &[], r#"{"version":"1.0"}"#)]).await;
        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("data/tokenizer.json");

        download_file(&format!("{}/tokenizer.json", server.url), &dest, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(&dest).unwrap(), r#"{"version":"1.0"}"#);
        assert!(!dest.with_extension("part").exists());
    }

    #[tokio::test]
    async fn test_error_status_is_download_error() {
        let server = StubServer::start(vec![reply("404 Not Found", &[], "missing")]).await;
        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("tokenizer.json");

        let err = download_file(&format!("{}/tokenizer.json", server.url), &dest, Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, QaError::Download { status: 404, .. }));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_failed_rename_removes_partial_file() {
        let server = StubServer::start(vec![reply("200 OK", &[], "{}")]).await;
        let dir = tempfile::TempDir::new().unwrap();
        // A non-empty directory at the destination makes the rename fail.
        let dest = dir.path().join("tokenizer.json");
        std::fs::create_dir_all(dest.join("occupied")).unwrap();

        let result =
            download_file(&format!("{}/tokenizer.json", server.url), &dest, Duration::from_secs(5)).await;

        assert!(matches!(result, Err(QaError::Io { .. })));
        assert!(!dest.with_extension("part").exists());
    }
}
