//! Manuscript storage
//!
//! Uploaded files go to a [`BlobStore`], which returns the public URL and
//! provider id recorded on the paper.
//! - Local directory (development, tests)
//! - Cloudinary signed uploads

use crate::config::StorageConfig;
use crate::errors::{AppError, Result};
use crate::review::StoredFile;
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// A file received from a client
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Trait for blob storage backends
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store the upload and return where it can be fetched
    async fn put(&self, upload: &Upload) -> Result<StoredFile>;

    /// Remove a stored file; deleting a missing file succeeds
    async fn delete(&self, file: &StoredFile) -> Result<()>;

    /// Provider name
    fn name(&self) -> &str;
}

/// Reduce a client file name to a safe single path component
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "manuscript".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Files written under a local directory
pub struct LocalBlobStore {
    root: PathBuf,
    public_base_url: String,
    folder: String,
}

impl LocalBlobStore {
    pub fn new(
        root: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
        folder: impl Into<String>,
    ) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into(),
            folder: folder.into(),
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, upload: &Upload) -> Result<StoredFile> {
        let public_id = format!(
            "{}/{}-{}",
            self.folder,
            Uuid::new_v4(),
            sanitize_file_name(&upload.file_name)
        );
        let path = self.root.join(&public_id);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &upload.bytes).await?;

        tracing::debug!(path = %path.display(), bytes = upload.bytes.len(), "Stored upload");

        Ok(StoredFile {
            url: format!("{}/{}", self.public_base_url.trim_end_matches('/'), public_id),
            public_id,
        })
    }

    async fn delete(&self, file: &StoredFile) -> Result<()> {
        let path = self.root.join(&file.public_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &str {
        "local"
    }
}

/// Cloudinary upload API client
pub struct CloudinaryBlobStore {
    client: reqwest::Client,
    cloud_name: String,
    api_key: String,
    api_secret: String,
    folder: String,
}

#[derive(Deserialize)]
struct CloudinaryResponse {
    secure_url: String,
    public_id: String,
}

impl CloudinaryBlobStore {
    pub fn new(
        cloud_name: String,
        api_key: String,
        api_secret: String,
        folder: String,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            cloud_name,
            api_key,
            api_secret,
            folder,
        })
    }

    /// SHA-256 signature over the signed parameters (already sorted by
    /// name, `&`-joined) followed by the secret
    fn sign(&self, params: &str) -> String {
        hex::encode(Sha256::digest(format!("{}{}", params, self.api_secret).as_bytes()))
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "https://api.cloudinary.com/v1_1/{}/raw/{}",
            self.cloud_name, action
        )
    }
}

#[async_trait]
impl BlobStore for CloudinaryBlobStore {
    async fn put(&self, upload: &Upload) -> Result<StoredFile> {
        let timestamp = Utc::now().timestamp();

        let mut part = reqwest::multipart::Part::bytes(upload.bytes.clone())
            .file_name(sanitize_file_name(&upload.file_name));
        if let Some(content_type) = &upload.content_type {
            part = part.mime_str(content_type).map_err(|e| AppError::Validation {
                message: format!("Invalid content type: {}", e),
                field: Some("file".to_string()),
            })?;
        }

        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp.to_string())
            .text("folder", self.folder.clone())
            .text(
                "signature",
                self.sign(&format!("folder={}&timestamp={}", self.folder, timestamp)),
            )
            .text("signature_algorithm", "sha256");

        let response = self
            .client
            .post(self.endpoint("upload"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::Storage {
                message: format!("Upload request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Storage {
                message: format!("Upload rejected {}: {}", status, body),
            });
        }

        let result: CloudinaryResponse = response.json().await.map_err(|e| AppError::Storage {
            message: format!("Failed to parse upload response: {}", e),
        })?;

        Ok(StoredFile {
            url: result.secure_url,
            public_id: result.public_id,
        })
    }

    async fn delete(&self, file: &StoredFile) -> Result<()> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = self.sign(&format!(
            "public_id={}&timestamp={}",
            file.public_id, timestamp
        ));

        let response = self
            .client
            .post(self.endpoint("destroy"))
            .form(&[
                ("public_id", file.public_id.as_str()),
                ("api_key", self.api_key.as_str()),
                ("timestamp", timestamp.as_str()),
                ("signature", signature.as_str()),
                ("signature_algorithm", "sha256"),
            ])
            .send()
            .await
            .map_err(|e| AppError::Storage {
                message: format!("Destroy request failed: {}", e),
            })?;

        if !response.status().is_success() {
            return Err(AppError::Storage {
                message: format!("Destroy rejected {}", response.status()),
            });
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "cloudinary"
    }
}

/// Create a blob store based on configuration
pub fn create_blob_store(config: &StorageConfig) -> Result<Arc<dyn BlobStore>> {
    match config.provider.as_str() {
        "cloudinary" => {
            let (Some(cloud_name), Some(api_key), Some(api_secret)) = (
                config.cloud_name.clone(),
                config.api_key.clone(),
                config.api_secret.clone(),
            ) else {
                return Err(AppError::Configuration {
                    message: "storage.cloud_name, storage.api_key and storage.api_secret are required for cloudinary"
                        .to_string(),
                });
            };
            Ok(Arc::new(CloudinaryBlobStore::new(
                cloud_name,
                api_key,
                api_secret,
                config.folder.clone(),
                Duration::from_secs(config.timeout_secs),
            )?))
        }
        "local" => Ok(Arc::new(LocalBlobStore::new(
            &config.local_dir,
            &config.public_base_url,
            &config.folder,
        ))),
        other => Err(AppError::Configuration {
            message: format!("Unknown storage provider: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(name: &str) -> Upload {
        Upload {
            file_name: name.to_string(),
            content_type: Some("application/pdf".to_string()),
            bytes: b"%PDF-1.7 test".to_vec(),
        }
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("paper v2.pdf"), "paper_v2.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\docs\\draft.pdf"), "draft.pdf");
        assert_eq!(sanitize_file_name("..."), "manuscript");
    }

    #[tokio::test]
    async fn test_local_store_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path(), "http://localhost:5000/uploads/", "research_papers");

        let stored = store.put(&upload("my paper.pdf")).await.unwrap();

        assert!(stored.public_id.starts_with("research_papers/"));
        assert!(stored.public_id.ends_with("-my_paper.pdf"));
        assert_eq!(
            stored.url,
            format!("http://localhost:5000/uploads/{}", stored.public_id)
        );

        let written = tokio::fs::read(dir.path().join(&stored.public_id)).await.unwrap();
        assert_eq!(written, b"%PDF-1.7 test");
    }

    #[tokio::test]
    async fn test_local_delete_removes_file_and_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path(), "http://files.test", "research_papers");

        let stored = store.put(&upload("draft.pdf")).await.unwrap();
        let path = dir.path().join(&stored.public_id);
        assert!(path.exists());

        store.delete(&stored).await.unwrap();
        assert!(!path.exists());
        store.delete(&stored).await.unwrap();
    }

    #[test]
    fn test_cloudinary_signature_is_stable() {
        let store = CloudinaryBlobStore::new(
            "demo".into(),
            "key".into(),
            "secret".into(),
            "research_papers".into(),
            Duration::from_secs(5),
        )
        .unwrap();

        let expected = hex::encode(Sha256::digest(
            b"folder=research_papers&timestamp=1700000000secret",
        ));
        let signed = store.sign("folder=research_papers&timestamp=1700000000");
        assert_eq!(signed, expected);
        assert_eq!(signed.len(), 64);
        assert_eq!(
            store.endpoint("upload"),
            "https://api.cloudinary.com/v1_1/demo/raw/upload"
        );
        assert_eq!(
            store.endpoint("destroy"),
            "https://api.cloudinary.com/v1_1/demo/raw/destroy"
        );
    }

    #[test]
    fn test_create_blob_store() {
        let config = StorageConfig::default();
        assert_eq!(create_blob_store(&config).unwrap().name(), "local");

        let missing = StorageConfig {
            provider: "cloudinary".into(),
            ..StorageConfig::default()
        };
        assert!(matches!(
            create_blob_store(&missing),
            Err(AppError::Configuration { .. })
        ));
    }
}
