//! Snapshot storage using one file per field in a directory on disk.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

pub use error::Error;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use cohort_snapshot::SnapshotStore;
use tokio::fs;
use tokio::io::{self, AsyncWriteExt};
use tracing::debug;
use uuid::Uuid;

/// Suffix for files that are still being written.
const PARTIAL_SUFFIX: &str = ".partial";

/// Snapshot store backed by files on disk.
#[derive(Clone, Debug)]
pub struct FsSnapshotStore {
    dir: PathBuf,
}

impl FsSnapshotStore {
    /// Creates a new `FsSnapshotStore` rooted at the specified directory.
    ///
    /// The directory is created lazily on the first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn get_file_path(&self, field: &str) -> Result<PathBuf, Error> {
        if field.is_empty()
            || field.contains(['/', '\\'])
            || field.starts_with('.')
            || field.ends_with(PARTIAL_SUFFIX)
        {
            return Err(Error::InvalidField(field.to_string()));
        }

        Ok(self.dir.join(field))
    }
}

#[async_trait]
impl SnapshotStore for FsSnapshotStore {
    type Error = Error;

    async fn del<F: Into<String> + Send>(&self, field: F) -> Result<(), Self::Error> {
        let path = self.get_file_path(&field.into())?;
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Io("error deleting file", e)),
        }
    }

    async fn fields(&self) -> Result<Vec<String>, Self::Error> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::Io("error reading directory", e)),
        };
        let mut fields = Vec::new();

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::Io("error reading directory entry", e))?
        {
            if let Some(name) = entry.file_name().to_str() {
                if !name.ends_with(PARTIAL_SUFFIX) {
                    fields.push(name.to_string());
                }
            }
        }

        fields.sort();
        Ok(fields)
    }

    async fn get<F: Into<String> + Send>(&self, field: F) -> Result<Option<Bytes>, Self::Error> {
        let path = self.get_file_path(&field.into())?;
        match fs::read(path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io("error reading file", e)),
        }
    }

    async fn put<F: Into<String> + Send>(&self, field: F, bytes: Bytes) -> Result<(), Self::Error> {
        let field = field.into();
        let path = self.get_file_path(&field)?;

        fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| Error::Io("error creating directory", e))?;

        // Each writer gets its own side file; concurrent puts of one field
        // race only on the final rename, which replaces the target whole
        let partial_path = self
            .dir
            .join(format!("{field}.{}{PARTIAL_SUFFIX}", Uuid::new_v4().simple()));

        if let Err(e) = write_synced(&partial_path, &bytes).await {
            let _ = fs::remove_file(&partial_path).await;
            return Err(e);
        }

        if let Err(e) = fs::rename(&partial_path, &path).await {
            let _ = fs::remove_file(&partial_path).await;
            return Err(Error::Io("error renaming file", e));
        }

        debug!("wrote snapshot field {} ({} bytes)", field, bytes.len());
        Ok(())
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    let mut file = fs::File::create(path)
        .await
        .map_err(|e| Error::Io("error creating file", e))?;
    file.write_all(bytes)
        .await
        .map_err(|e| Error::Io("error writing file", e))?;
    file.sync_all()
        .await
        .map_err(|e| Error::Io("error syncing file", e))
}
