//! Local image store for product pictures.
//!
//! Files live flat in one directory and are named `<unix-seconds>.<ext>`.
//! A second upload within the same second gets `<unix-seconds>-<n>.<ext>`
//! instead of replacing the first one.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::Utc;
use image::ImageFormat;
use tokio::{fs, io::AsyncWriteExt};

/// Highest counter tried before giving up on a free filename.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Image types accepted for products.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
}

impl ImageKind {
    /// Sniff the content, ignoring whatever extension the client claimed.
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        match image::guess_format(bytes).ok()? {
            ImageFormat::Jpeg => Some(ImageKind::Jpeg),
            ImageFormat::Png => Some(ImageKind::Png),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "jpg",
            ImageKind::Png => "png",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImageStorage {
    root: Arc<PathBuf>,
}

impl ImageStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Arc::new(root.into()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_root(&self) -> std::io::Result<()> {
        fs::create_dir_all(self.root.as_path()).await
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub async fn exists(&self, name: &str) -> std::io::Result<bool> {
        check_name(name)?;
        fs::try_exists(self.path_of(name)).await
    }

    /// Write `bytes` under a fresh timestamp name and return that name.
    pub async fn put(&self, bytes: &[u8], kind: ImageKind) -> std::io::Result<String> {
        self.ensure_root().await?;
        let stamp = Utc::now().timestamp();
        let ext = kind.extension();

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let name = if attempt == 0 {
                format!("{stamp}.{ext}")
            } else {
                format!("{stamp}-{attempt}.{ext}")
            };
            let opened = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.path_of(&name))
                .await;
            let mut file = match opened {
                Ok(file) => file,
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(err),
            };
            if let Err(err) = write_all(&mut file, bytes).await {
                drop(file);
                let _ = fs::remove_file(self.path_of(&name)).await;
                return Err(err);
            }
            tracing::debug!(file = %name, size = bytes.len(), "image stored");
            return Ok(name);
        }

        Err(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free image name for timestamp {stamp}"),
        ))
    }

    /// Remove a stored image. A file that is already gone is not an error.
    pub async fn delete(&self, name: &str) -> std::io::Result<()> {
        check_name(name)?;
        match fs::remove_file(self.path_of(name)).await {
            Ok(()) => {
                tracing::debug!(file = %name, "image deleted");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

async fn write_all(file: &mut fs::File, bytes: &[u8]) -> std::io::Result<()> {
    file.write_all(bytes).await?;
    file.sync_all().await
}

// Names come back out of the database; never let one escape the root.
fn check_name(name: &str) -> std::io::Result<()> {
    let plain = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\']);
    if plain {
        Ok(())
    } else {
        Err(std::io::Error::new(
            ErrorKind::InvalidInput,
            format!("invalid image name {name:?}"),
        ))
    }
}
