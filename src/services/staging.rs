//! Local staging of upload bodies.
//!
//! A `StagedFile` owns the temporary copy of one incoming file. The HTTP layer
//! streams each multipart field into the staging directory; the pipeline reads
//! it back and the file is removed when the guard is dropped, whatever the
//! outcome of the upload.

use bytes::Bytes;
use futures::{Stream, StreamExt, pin_mut};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, warn};
use uuid::Uuid;

enum Staging {
    Memory(Bytes),
    Disk(PathBuf),
}

pub struct StagedFile {
    staging: Staging,
    len: u64,
}

impl StagedFile {
    /// Bytes already in memory; nothing to release.
    pub fn in_memory(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let len = bytes.len() as u64;
        Self {
            staging: Staging::Memory(bytes),
            len,
        }
    }

    /// Stream `chunks` into `.staged-{uuid}` under `dir`.
    ///
    /// A partially written file is removed if the stream or a write fails.
    pub async fn write_stream<S, E>(dir: &Path, chunks: S) -> io::Result<Self>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        fs::create_dir_all(dir).await?;
        let path = dir.join(format!(".staged-{}", Uuid::new_v4()));
        let mut file = File::create(&path).await?;
        // From here on the guard owns the path and removes it on early return.
        let mut staged = Self {
            staging: Staging::Disk(path),
            len: 0,
        };

        pin_mut!(chunks);
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(io::Error::other)?;
            staged.len += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(staged)
    }

    pub async fn write(dir: &Path, bytes: Bytes) -> io::Result<Self> {
        Self::write_stream(dir, futures::stream::iter([Ok::<_, io::Error>(bytes)])).await
    }

    /// Number of staged bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.staging {
            Staging::Disk(path) => Some(path),
            Staging::Memory(_) => None,
        }
    }

    pub async fn read(&self) -> io::Result<Bytes> {
        match &self.staging {
            Staging::Memory(bytes) => Ok(bytes.clone()),
            Staging::Disk(path) => fs::read(path).await.map(Bytes::from),
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        let Staging::Disk(path) = &self.staging else {
            return;
        };
        match std::fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "released staged file"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to release staged file")
            }
        }
    }
}
