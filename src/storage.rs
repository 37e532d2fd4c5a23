use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use bytes::Bytes;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::MediaConfig;

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedMedia {
    pub secure_url: String,
    pub key: String,
}

#[async_trait]
pub trait MediaHost: Send + Sync {
    /// Uploads the local file at `path` under `folder`.
    async fn upload(&self, path: &Path, folder: &str) -> anyhow::Result<UploadedMedia>;
    async fn delete(&self, key: &str) -> anyhow::Result<()>;
}

/// S3-compatible media host (MinIO, R2, AWS).
#[derive(Clone)]
pub struct S3MediaHost {
    client: Client,
    bucket: String,
    public_url: String,
}

impl S3MediaHost {
    pub async fn new(cfg: &MediaConfig) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(Credentials::new(
                &cfg.access_key,
                &cfg.secret_key,
                None,
                None,
                "static",
            ))
            .endpoint_url(&cfg.endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(&cfg.endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: cfg.bucket.clone(),
            public_url: cfg.public_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MediaHost for S3MediaHost {
    async fn upload(&self, path: &Path, folder: &str) -> anyhow::Result<UploadedMedia> {
        let body = tokio::fs::read(path)
            .await
            .with_context(|| format!("read staged file {}", path.display()))?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("bin");
        let key = format!("{}/{}.{}", folder, Uuid::new_v4(), ext);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(Bytes::from(body)))
            .content_type(mime_from_ext(ext))
            .send()
            .await
            .with_context(|| format!("s3 put_object {}", key))?;

        Ok(UploadedMedia {
            secure_url: format!("{}/{}", self.public_url, key),
            key,
        })
    }

    async fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("s3 delete_object")?;
        Ok(())
    }
}

/// Media host bound to an upload deadline.
#[derive(Clone)]
pub struct MediaUploader {
    host: Arc<dyn MediaHost>,
    timeout: Duration,
}

impl MediaUploader {
    pub fn new(host: Arc<dyn MediaHost>, timeout: Duration) -> Self {
        Self { host, timeout }
    }

    pub async fn upload(&self, file: &StagedFile, folder: &str) -> anyhow::Result<UploadedMedia> {
        let media = tokio::time::timeout(self.timeout, self.host.upload(file.path(), folder))
            .await
            .with_context(|| format!("upload timed out after {:?}", self.timeout))??;
        debug!(key = %media.key, "media uploaded");
        Ok(media)
    }

    /// Removes an uploaded object; failures are logged and swallowed.
    pub async fn discard(&self, media: &UploadedMedia) {
        if let Err(e) = self.host.delete(&media.key).await {
            warn!(error = %e, key = %media.key, "failed to delete orphaned media");
        }
    }
}

/// A file written to the local staging directory. The file is removed on drop.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    /// Writes `body` to a fresh file in `dir`, named after its content type.
    pub async fn write(dir: &Path, content_type: &str, body: Bytes) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("create staging dir {}", dir.display()))?;
        let ext = ext_from_mime(content_type).unwrap_or("bin");
        let path = dir.join(format!("{}.{}", Uuid::new_v4(), ext));
        // Guard first so a failed write still cleans up a partial file.
        let staged = Self { path };
        tokio::fs::write(&staged.path, &body)
            .await
            .with_context(|| format!("write staged file {}", staged.path.display()))?;
        Ok(staged)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "staged file removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "failed to remove staged file")
            }
        }
    }
}

pub fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

fn mime_from_ext(ext: &str) -> &'static str {
    match ext {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "heic" => "image/heic",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    };

    use super::*;

    /// Records uploads instead of sending them anywhere.
    #[derive(Default)]
    pub struct FakeMediaHost {
        pub uploaded: Mutex<Vec<UploadedMedia>>,
        pub deleted: Mutex<Vec<String>>,
        fail: AtomicBool,
        stall: Option<Duration>,
    }

    impl FakeMediaHost {
        pub fn failing() -> Self {
            let host = Self::default();
            host.fail.store(true, Ordering::SeqCst);
            host
        }

        /// Host that takes `delay` to answer every upload.
        pub fn stalled(delay: Duration) -> Self {
            Self {
                stall: Some(delay),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl MediaHost for FakeMediaHost {
        async fn upload(&self, path: &Path, folder: &str) -> anyhow::Result<UploadedMedia> {
            if let Some(delay) = self.stall {
                tokio::time::sleep(delay).await;
            }
            anyhow::ensure!(!self.fail.load(Ordering::SeqCst), "media host unavailable");
            anyhow::ensure!(path.exists(), "staged file missing: {}", path.display());
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("file");
            let key = format!("{}/{}", folder, name);
            let media = UploadedMedia {
                secure_url: format!("https://media.local/{}", key),
                key,
            };
            self.uploaded.lock().unwrap().push(media.clone());
            Ok(media)
        }

        async fn delete(&self, key: &str) -> anyhow::Result<()> {
            self.deleted.lock().unwrap().push(key.to_string());
            Ok(())
        }
    }
}
