//! Uploaded image storage.
//!
//! Every catalog entity keeps its images in a folder named after its title:
//!
//! ```text
//! uploads/
//! ├── .staging/                 incoming multipart files
//! ├── categories/{title}/       category image
//! ├── products/{title}/         main image + gallery
//! └── blogs/{title}/            cover image
//! ```
//!
//! Incoming files are streamed into `.staging/` as [`StagedFile`]s. A request
//! then moves them into place through a [`MediaChange`], which journals every
//! filesystem mutation so it can be undone when the database write that
//! follows fails. Deletions are only scheduled, and run on
//! [`MediaChange::commit`].

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Bytes;
use rand::Rng;
use thiserror::Error;

use bazaar_core::Title;

use crate::config::UploadConfig;

const STAGING_DIR: &str = ".staging";
const MAX_EXTENSION_LEN: usize = 8;

/// Content types accepted for uploads, with their fallback extension.
const ALLOWED_TYPES: &[(&str, &str)] = &[
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/webp", "webp"),
];

/// Errors from the media pipeline.
#[derive(Debug, Error)]
pub enum MediaError {
    /// The part's content type is not an accepted image type.
    #[error("invalid file type: {0}")]
    InvalidFileType(String),

    /// A single file exceeded the configured size limit.
    #[error("file too large (limit {limit} bytes)")]
    FileTooLarge { limit: usize },

    /// Renaming an entity folder would overwrite another entity's folder.
    #[error("folder already exists: {0}")]
    FolderExists(String),

    /// The multipart body could not be read.
    #[error("upload failed: {0}")]
    Upload(String),

    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Which entity family a folder belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Category,
    Product,
    Blog,
}

impl MediaKind {
    /// Directory name under the upload root.
    #[must_use]
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Category => "categories",
            Self::Product => "products",
            Self::Blog => "blogs",
        }
    }

    /// Every entity family.
    pub const ALL: [Self; 3] = [Self::Category, Self::Product, Self::Blog];
}

/// Source of file bytes for [`MediaStore::stage`].
///
/// Implemented for axum multipart fields in the upload extractor.
#[allow(async_fn_in_trait)]
pub trait ChunkSource {
    /// Next chunk of the file, or `None` at the end.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, MediaError>;
}

/// Upload root and limits.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
    max_file_bytes: usize,
}

impl MediaStore {
    /// Create a store rooted at `config.root`.
    #[must_use]
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            root: config.root.clone(),
            max_file_bytes: config.max_file_bytes,
        }
    }

    /// The upload root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder holding an entity's images.
    #[must_use]
    pub fn entity_dir(&self, kind: MediaKind, title: &Title) -> PathBuf {
        self.root.join(kind.dir_name()).join(title.as_str())
    }

    fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    /// Create the upload directory tree.
    ///
    /// # Errors
    ///
    /// Returns `MediaError::Io` if a directory cannot be created.
    pub async fn ensure_layout(&self) -> Result<(), MediaError> {
        tokio::fs::create_dir_all(self.staging_dir()).await?;
        for kind in MediaKind::ALL {
            tokio::fs::create_dir_all(self.root.join(kind.dir_name())).await?;
        }
        Ok(())
    }

    /// Stream one uploaded file into the staging area.
    ///
    /// # Errors
    ///
    /// Returns `MediaError::InvalidFileType` for non-image content types and
    /// `MediaError::FileTooLarge` when the file exceeds the size limit. No
    /// partial file is left behind on error.
    pub async fn stage(
        &self,
        field: &str,
        file_name: Option<&str>,
        content_type: Option<&str>,
        source: &mut impl ChunkSource,
    ) -> Result<StagedFile, MediaError> {
        use tokio::io::AsyncWriteExt;

        let fallback_ext = accepted_extension(content_type)?;
        let name = staged_file_name(field, file_name, fallback_ext);
        let path = self.staging_dir().join(&name);

        let mut file = tokio::fs::File::create(&path).await?;
        // From here on the guard owns the file and removes it on any early return.
        let staged = StagedFile {
            path,
            name,
            placed: false,
        };

        let mut written = 0usize;
        while let Some(chunk) = source.next_chunk().await? {
            written += chunk.len();
            if written > self.max_file_bytes {
                return Err(MediaError::FileTooLarge {
                    limit: self.max_file_bytes,
                });
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        tracing::debug!(file = %staged.name, bytes = written, "Staged upload");
        Ok(staged)
    }

    /// Copy an existing file into an entity folder, creating it if needed.
    ///
    /// Used to seed the default category's image.
    ///
    /// # Errors
    ///
    /// Returns `MediaError::Io` if the copy fails.
    pub async fn copy_into(
        &self,
        kind: MediaKind,
        title: &Title,
        source: &Path,
        file_name: &str,
    ) -> Result<(), MediaError> {
        let dir = self.entity_dir(kind, title);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::copy(source, dir.join(file_name)).await?;
        Ok(())
    }

    /// Start a journaled set of filesystem changes.
    #[must_use]
    pub fn change(&self) -> MediaChange<'_> {
        MediaChange {
            store: self,
            undo: Vec::new(),
            deferred: Vec::new(),
            finished: false,
        }
    }
}

/// A file sitting in `.staging/`.
///
/// Dropping it without [`MediaChange::place`] deletes the file.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    name: String,
    placed: bool,
}

impl StagedFile {
    /// Generated file name (also the name it will have once placed).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current location in the staging area.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.placed {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove staged upload");
        }
    }
}

#[derive(Debug)]
enum Undo {
    RemoveFile(PathBuf),
    RenameBack { current: PathBuf, original: PathBuf },
    RemoveDirIfEmpty(PathBuf),
}

#[derive(Debug)]
enum Deferred {
    File(PathBuf),
    Folder(PathBuf),
}

/// Journal of filesystem mutations for one request.
///
/// Finish it with [`commit`](Self::commit) once the database write succeeded,
/// or [`rollback`](Self::rollback) otherwise. [`finish`](Self::finish) picks
/// one based on a result. Dropping an unfinished change rolls it back.
#[derive(Debug)]
pub struct MediaChange<'a> {
    store: &'a MediaStore,
    undo: Vec<Undo>,
    deferred: Vec<Deferred>,
    finished: bool,
}

impl MediaChange<'_> {
    /// Move a staged file into `{kind}/{title}/`. Returns the stored file name.
    ///
    /// # Errors
    ///
    /// Returns `MediaError::Io` if the folder cannot be created or the move fails.
    pub async fn place(
        &mut self,
        kind: MediaKind,
        title: &Title,
        mut staged: StagedFile,
    ) -> Result<String, MediaError> {
        let dir = self.store.entity_dir(kind, title);
        if !tokio::fs::try_exists(&dir).await? {
            tokio::fs::create_dir_all(&dir).await?;
            self.undo.push(Undo::RemoveDirIfEmpty(dir.clone()));
        }

        let target = dir.join(&staged.name);
        tokio::fs::rename(&staged.path, &target).await?;
        staged.placed = true;
        self.undo.push(Undo::RemoveFile(target));

        Ok(std::mem::take(&mut staged.name))
    }

    /// Rename an entity folder after a title change.
    ///
    /// Does nothing when the titles are equal or the source folder is missing.
    ///
    /// # Errors
    ///
    /// Returns `MediaError::FolderExists` if the target folder already exists.
    pub async fn rename_folder(
        &mut self,
        kind: MediaKind,
        from: &Title,
        to: &Title,
    ) -> Result<(), MediaError> {
        if from == to {
            return Ok(());
        }
        let original = self.store.entity_dir(kind, from);
        let current = self.store.entity_dir(kind, to);

        if !tokio::fs::try_exists(&original).await? {
            tracing::warn!(folder = %original.display(), "Entity folder missing, nothing to rename");
            return Ok(());
        }
        if tokio::fs::try_exists(&current).await? {
            return Err(MediaError::FolderExists(format!(
                "{}/{}",
                kind.dir_name(),
                to.as_str()
            )));
        }

        tokio::fs::rename(&original, &current).await?;
        self.undo.push(Undo::RenameBack { current, original });
        Ok(())
    }

    /// Schedule deletion of one file in `{kind}/{title}/`.
    ///
    /// Names that are not a single path component are ignored.
    pub fn remove_later(&mut self, kind: MediaKind, title: &Title, file: &str) {
        if !is_plain_file_name(file) {
            tracing::warn!(file, "Refusing to delete file outside the entity folder");
            return;
        }
        let path = self.store.entity_dir(kind, title).join(file);
        self.deferred.push(Deferred::File(path));
    }

    /// Schedule deletion of the whole `{kind}/{title}/` folder.
    pub fn remove_folder_later(&mut self, kind: MediaKind, title: &Title) {
        let path = self.store.entity_dir(kind, title);
        self.deferred.push(Deferred::Folder(path));
    }

    /// Commit on `Ok`, roll back on `Err`, and pass the result through.
    pub async fn finish<T, E>(self, result: Result<T, E>) -> Result<T, E> {
        if result.is_ok() {
            self.commit().await;
        } else {
            self.rollback().await;
        }
        result
    }

    /// Run the scheduled deletions. Failures are logged, not returned.
    pub async fn commit(mut self) {
        self.finished = true;
        for item in std::mem::take(&mut self.deferred) {
            let outcome = match &item {
                Deferred::File(path) => tokio::fs::remove_file(path).await,
                Deferred::Folder(path) => tokio::fs::remove_dir_all(path).await,
            };
            match outcome {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::error!(?item, error = %e, "Failed to delete media"),
            }
        }
    }

    /// Undo every recorded operation in reverse order.
    pub async fn rollback(mut self) {
        self.finished = true;
        self.deferred.clear();
        while let Some(step) = self.undo.pop() {
            let outcome = match &step {
                Undo::RemoveFile(path) => tokio::fs::remove_file(path).await,
                Undo::RenameBack { current, original } => {
                    tokio::fs::rename(current, original).await
                }
                Undo::RemoveDirIfEmpty(path) => remove_dir_if_empty(path).await,
            };
            if let Err(e) = outcome {
                tracing::error!(?step, error = %e, "Failed to undo media change");
            }
        }
    }
}

impl Drop for MediaChange<'_> {
    fn drop(&mut self) {
        if self.finished || self.undo.is_empty() {
            return;
        }
        tracing::warn!(steps = self.undo.len(), "Media change dropped unfinished, rolling back");
        while let Some(step) = self.undo.pop() {
            let outcome = match &step {
                Undo::RemoveFile(path) => std::fs::remove_file(path),
                Undo::RenameBack { current, original } => std::fs::rename(current, original),
                Undo::RemoveDirIfEmpty(path) => std::fs::remove_dir(path),
            };
            if let Err(e) = outcome {
                tracing::error!(?step, error = %e, "Failed to undo media change");
            }
        }
    }
}

async fn remove_dir_if_empty(path: &Path) -> std::io::Result<()> {
    let mut entries = tokio::fs::read_dir(path).await?;
    if entries.next_entry().await?.is_none() {
        tokio::fs::remove_dir(path).await?;
    }
    Ok(())
}

/// Check the content type and return its fallback extension.
///
/// # Errors
///
/// Returns `MediaError::InvalidFileType` unless the type is JPEG, PNG or WebP.
pub fn accepted_extension(content_type: Option<&str>) -> Result<&'static str, MediaError> {
    let essence = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();

    ALLOWED_TYPES
        .iter()
        .find(|(mime, _)| *mime == essence)
        .map(|(_, ext)| *ext)
        .ok_or(MediaError::InvalidFileType(essence))
}

/// Generate `{field}-{unix_millis}-{random}{.ext}`.
///
/// The extension is taken from the client's file name when it has one,
/// reduced to at most 8 lowercase ASCII alphanumerics.
#[must_use]
pub fn staged_file_name(field: &str, original: Option<&str>, fallback_ext: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis());
    let suffix: u32 = rand::rng().random_range(0..1_000_000_000);
    let field: String = field
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    let ext = original
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(sanitize_extension)
        .filter(|ext| !ext.is_empty())
        .unwrap_or_else(|| fallback_ext.to_owned());

    format!("{field}-{millis}-{suffix}.{ext}")
}

fn sanitize_extension(ext: &str) -> String {
    ext.chars()
        .filter(char::is_ascii_alphanumeric)
        .take(MAX_EXTENSION_LEN)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name)
        && name != ".."
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct Chunks(Vec<Bytes>);

    impl ChunkSource for Chunks {
        async fn next_chunk(&mut self) -> Result<Option<Bytes>, MediaError> {
            if self.0.is_empty() {
                Ok(None)
            } else {
                Ok(Some(self.0.remove(0)))
            }
        }
    }

    fn store(dir: &Path, limit: usize) -> MediaStore {
        MediaStore::new(&UploadConfig {
            root: dir.to_path_buf(),
            max_file_bytes: limit,
            default_category_image: dir.join("seed.jpeg"),
        })
    }

    fn title(s: &str) -> Title {
        Title::parse(s).unwrap()
    }

    fn staging_is_empty(store: &MediaStore) -> bool {
        std::fs::read_dir(store.staging_dir()).unwrap().next().is_none()
    }

    async fn stage_bytes(store: &MediaStore, data: &'static [u8]) -> StagedFile {
        store
            .stage(
                "image",
                Some("photo.JPG"),
                Some("image/jpeg"),
                &mut Chunks(vec![Bytes::from_static(data)]),
            )
            .await
            .unwrap()
    }

    #[test]
    fn test_accepted_extension() {
        assert_eq!(accepted_extension(Some("image/jpeg")).unwrap(), "jpg");
        assert_eq!(accepted_extension(Some("IMAGE/PNG; charset=x")).unwrap(), "png");
        assert_eq!(accepted_extension(Some("image/webp")).unwrap(), "webp");
        assert!(matches!(
            accepted_extension(Some("application/pdf")),
            Err(MediaError::InvalidFileType(_))
        ));
        assert!(accepted_extension(None).is_err());
    }

    #[test]
    fn test_staged_file_name_shape() {
        let name = staged_file_name("gallery", Some("My Photo.PNG"), "png");
        let parts: Vec<&str> = name.splitn(3, '-').collect();
        assert_eq!(parts[0], "gallery");
        assert!(parts[1].parse::<u128>().is_ok());
        assert!(parts[2].ends_with(".png"));
    }

    #[test]
    fn test_staged_file_name_sanitizes_extension() {
        assert!(staged_file_name("image", Some("x.j!p*eg"), "jpg").ends_with(".jpeg"));
        assert!(staged_file_name("image", Some("x.verylongextension"), "jpg").ends_with(".verylong"));
        assert!(staged_file_name("image", Some("noext"), "webp").ends_with(".webp"));
        assert!(staged_file_name("image", None, "jpg").ends_with(".jpg"));
    }

    #[test]
    fn test_is_plain_file_name() {
        assert!(is_plain_file_name("image-1-2.jpg"));
        assert!(!is_plain_file_name("../secret"));
        assert!(!is_plain_file_name("a/b.jpg"));
        assert!(!is_plain_file_name(".."));
        assert!(!is_plain_file_name(""));
    }

    #[tokio::test]
    async fn test_stage_rejects_oversized_file_without_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 4);
        store.ensure_layout().await.unwrap();

        let result = store
            .stage(
                "image",
                Some("big.png"),
                Some("image/png"),
                &mut Chunks(vec![Bytes::from_static(b"abc"), Bytes::from_static(b"de")]),
            )
            .await;

        assert!(matches!(result, Err(MediaError::FileTooLarge { limit: 4 })));
        assert!(staging_is_empty(&store));
    }

    #[tokio::test]
    async fn test_dropped_staged_file_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 1024);
        store.ensure_layout().await.unwrap();

        let staged = stage_bytes(&store, b"jpeg").await;
        assert!(staged.path().exists());
        assert!(staged.name().ends_with(".jpg"));
        drop(staged);

        assert!(staging_is_empty(&store));
    }

    #[tokio::test]
    async fn test_place_then_rollback_restores_tree() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 1024);
        store.ensure_layout().await.unwrap();
        let shoes = title("Shoes");

        let staged = stage_bytes(&store, b"jpeg").await;
        let mut change = store.change();
        let name = change.place(MediaKind::Product, &shoes, staged).await.unwrap();
        let placed = store.entity_dir(MediaKind::Product, &shoes).join(&name);
        assert!(placed.exists());

        change.rollback().await;

        assert!(!placed.exists());
        assert!(!store.entity_dir(MediaKind::Product, &shoes).exists());
        assert!(staging_is_empty(&store));
    }

    #[tokio::test]
    async fn test_rename_folder_conflict_and_undo() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 1024);
        store.ensure_layout().await.unwrap();
        let (old, new, taken) = (title("Old"), title("New"), title("Taken"));
        std::fs::create_dir_all(store.entity_dir(MediaKind::Category, &old)).unwrap();
        std::fs::create_dir_all(store.entity_dir(MediaKind::Category, &taken)).unwrap();

        let mut change = store.change();
        let err = change
            .rename_folder(MediaKind::Category, &old, &taken)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FolderExists(_)));

        change
            .rename_folder(MediaKind::Category, &old, &new)
            .await
            .unwrap();
        assert!(store.entity_dir(MediaKind::Category, &new).exists());

        change.rollback().await;
        assert!(store.entity_dir(MediaKind::Category, &old).exists());
        assert!(!store.entity_dir(MediaKind::Category, &new).exists());
    }

    #[tokio::test]
    async fn test_rename_missing_folder_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 1024);
        store.ensure_layout().await.unwrap();

        let mut change = store.change();
        change
            .rename_folder(MediaKind::Blog, &title("Ghost"), &title("Spirit"))
            .await
            .unwrap();
        change.commit().await;
        assert!(!store.entity_dir(MediaKind::Blog, &title("Spirit")).exists());
    }

    #[tokio::test]
    async fn test_deferred_deletes_run_only_on_commit() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 1024);
        store.ensure_layout().await.unwrap();
        let lamp = title("Lamp");
        let folder = store.entity_dir(MediaKind::Product, &lamp);
        std::fs::create_dir_all(&folder).unwrap();
        std::fs::write(folder.join("old.jpg"), b"x").unwrap();

        let mut change = store.change();
        change.remove_later(MediaKind::Product, &lamp, "old.jpg");
        change.rollback().await;
        assert!(folder.join("old.jpg").exists());

        let mut change = store.change();
        change.remove_later(MediaKind::Product, &lamp, "old.jpg");
        change.remove_later(MediaKind::Product, &lamp, "missing.jpg");
        change.commit().await;
        assert!(!folder.join("old.jpg").exists());

        let mut change = store.change();
        change.remove_folder_later(MediaKind::Product, &lamp);
        change.finish(Ok::<_, ()>(())).await.unwrap();
        assert!(!folder.exists());
    }

    #[tokio::test]
    async fn test_finish_with_error_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 1024);
        store.ensure_layout().await.unwrap();
        let desk = title("Desk");

        let staged = stage_bytes(&store, b"jpeg").await;
        let mut change = store.change();
        change.place(MediaKind::Product, &desk, staged).await.unwrap();
        let result: Result<(), &str> = change.finish(Err("db down")).await;

        assert!(result.is_err());
        assert!(!store.entity_dir(MediaKind::Product, &desk).exists());
    }

    #[tokio::test]
    async fn test_dropped_change_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), 1024);
        store.ensure_layout().await.unwrap();
        let chair = title("Chair");

        let staged = stage_bytes(&store, b"jpeg").await;
        {
            let mut change = store.change();
            change.place(MediaKind::Product, &chair, staged).await.unwrap();
        }

        assert!(!store.entity_dir(MediaKind::Product, &chair).exists());
    }
}
