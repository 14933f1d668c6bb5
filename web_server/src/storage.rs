use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use merger::format::extension_of;
use merger::{DocumentFormat, ValidationError, validate_batch};
use tempfile::TempDir;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::instrument;
use uuid::Uuid;

/// A file storage service rooted at one directory
pub struct FileStorage {
    /// Base directory where files will be stored
    base_dir: PathBuf,
}

impl FileStorage {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Copies an existing file into storage, overwriting whatever is stored
    /// under the same path.
    ///
    /// # Arguments
    /// * `path` - The path where the file should be stored (relative to base_dir)
    /// * `source` - The file to copy from
    ///
    /// # Returns
    /// The full path of the stored file
    pub fn copy_file<P>(&self, path: &P, source: &Path) -> Result<PathBuf, io::Error>
    where
        P: AsRef<Path>,
    {
        let full_path = self.prepare(path.as_ref())?;
        fs::copy(source, &full_path)?;
        Ok(full_path)
    }

    /// Deletes the base directory and everything in it
    pub fn remove_all(&self) -> Result<(), io::Error> {
        match fs::remove_dir_all(&self.base_dir) {
            Err(error) if error.kind() != io::ErrorKind::NotFound => Err(error),
            _ => Ok(()),
        }
    }

    /// Gets the base directory of this storage instance
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn prepare(&self, path: &Path) -> Result<PathBuf, io::Error> {
        let full_path = self.base_dir.join(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(full_path)
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Cannot write uploaded file: {0}")]
    Io(#[from] io::Error),
}

/// One file received in an upload request, already spooled to disk.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    /// Name as sent by the client
    pub file_name: String,
    pub path: PathBuf,
}

/// A stored upload waiting to be merged.
#[derive(Debug, Clone)]
pub struct UploadBatch {
    pub files: Vec<PathBuf>,
    pub format: DocumentFormat,
    pub save_as_pdf: bool,
    /// Private directory of the batch; merge output is written here too.
    pub dir: PathBuf,
}

/// Upload batches keyed by id. All batch directories live in one temp
/// directory that is deleted when the store is dropped.
pub struct UploadStore {
    root: TempDir,
    batches: Mutex<HashMap<Uuid, UploadBatch>>,
}

impl UploadStore {
    pub fn new(temp_root: Option<&Path>) -> Result<Self, io::Error> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("docmerge-");
        let root = match temp_root {
            Some(dir) => {
                fs::create_dir_all(dir)?;
                builder.tempdir_in(dir)?
            }
            None => builder.tempdir()?,
        };
        tracing::info!("Upload store ready. root={:?}", root.path());
        Ok(Self {
            root,
            batches: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Drop a batch and its files. Unknown ids are ignored.
    #[instrument(skip(self))]
    pub async fn discard(&self, id: Uuid) {
        let Some(batch) = self.batches.lock().await.remove(&id) else {
            return;
        };
        if let Err(error) = FileStorage::new(batch.dir).remove_all() {
            tracing::warn!("Could not remove batch directory. batch_id={id} error={error}");
        }
    }

    /// Validate and persist a new batch. Nothing is written when validation
    /// fails. Returns the new batch id and the number of stored files.
    #[instrument(skip(self, files), fields(files = files.len()))]
    pub async fn create(
        &self,
        files: &[IncomingFile],
        save_as_pdf: bool,
    ) -> Result<(Uuid, usize), StoreError> {
        let names: Vec<&str> = files.iter().map(|file| file.file_name.as_str()).collect();
        let format = validate_batch(&names)?;

        let id = Uuid::new_v4();
        let storage = FileStorage::new(self.root.path().join(id.to_string()));
        let stored = match persist(&storage, files) {
            Ok(stored) => stored,
            Err(error) => {
                let _ = storage.remove_all();
                return Err(error.into());
            }
        };

        let count = stored.len();
        let batch = UploadBatch {
            files: stored,
            format,
            save_as_pdf,
            dir: storage.base_dir().to_path_buf(),
        };
        self.batches.lock().await.insert(id, batch);

        tracing::info!("Batch stored. batch_id={id} count={count} format={format:?}");
        Ok((id, count))
    }

    /// Snapshot of a batch, if it exists.
    pub async fn get(&self, id: Uuid) -> Option<UploadBatch> {
        self.batches.lock().await.get(&id).cloned()
    }
}

fn persist(storage: &FileStorage, files: &[IncomingFile]) -> Result<Vec<PathBuf>, io::Error> {
    files
        .iter()
        .enumerate()
        .map(|(index, file)| {
            let extension = extension_of(&file.file_name).unwrap_or_default();
            let name = sanitize_filename(&file.file_name, index, &extension);
            storage.copy_file(&name, &file.path)
        })
        .collect()
}

/// Reduce a client supplied name to a safe file name: only the last path
/// component, ASCII letters, digits and `_.-`, whitespace turned into `_`.
///
/// Falls back to `upload_<index>.<extension>` when sanitising strips the
/// extension, so merging still knows the batch format.
pub fn sanitize_filename(file_name: &str, index: usize, extension: &str) -> String {
    let base = file_name.rsplit(['/', '\\']).next().unwrap_or_default();

    let ascii: String = base.chars().filter(char::is_ascii).collect();
    let joined = ascii.split_ascii_whitespace().collect::<Vec<_>>().join("_");
    let cleaned: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');

    let keeps_extension = extension_of(trimmed).is_some_and(|found| found == extension)
        && trimmed.len() > extension.len() + 1;
    if keeps_extension {
        trimmed.to_owned()
    } else {
        format!("upload_{index}.{extension}")
    }
}
