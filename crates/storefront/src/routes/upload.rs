//! Multipart form extraction for catalog writes.
//!
//! File parts are streamed straight into the media staging area; text parts
//! are collected by name. Nothing is buffered in memory beyond one chunk.

use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::multipart::{Field, Multipart, MultipartError};
use axum::extract::{FromRequest, Request};

use crate::error::AppError;
use crate::services::media::{ChunkSource, MediaError, StagedFile};
use crate::state::AppState;

/// Multipart fields that may carry files.
const FILE_FIELDS: &[&str] = &["image", "gallery"];

/// Most gallery files accepted in one request.
pub const MAX_GALLERY_FILES: usize = 10;

/// A parsed multipart form whose files are already staged on disk.
///
/// Staged files that are not taken out of the form are deleted when it
/// drops.
#[derive(Debug, Default)]
pub struct UploadForm {
    texts: HashMap<String, Vec<String>>,
    files: HashMap<String, Vec<StagedFile>>,
}

impl UploadForm {
    /// The first value of a text field, trimmed. Blank values count as absent.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<String> {
        self.texts
            .get(name)
            .and_then(|values| values.first())
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(str::to_owned)
    }

    /// Every non-blank value of a repeated text field.
    #[must_use]
    pub fn texts(&self, name: &str) -> Vec<String> {
        self.texts
            .get(name)
            .map(|values| {
                values
                    .iter()
                    .map(|v| v.trim())
                    .filter(|v| !v.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Take the first file of a field.
    pub fn take_file(&mut self, name: &str) -> Option<StagedFile> {
        let files = self.files.get_mut(name)?;
        if files.is_empty() {
            None
        } else {
            Some(files.remove(0))
        }
    }

    /// Take every file of a field.
    pub fn take_files(&mut self, name: &str) -> Vec<StagedFile> {
        self.files.remove(name).unwrap_or_default()
    }

    fn push_file(&mut self, name: String, file: StagedFile) -> Result<(), MediaError> {
        let limit = if name == "gallery" { MAX_GALLERY_FILES } else { 1 };
        let files = self.files.entry(name).or_default();
        if files.len() >= limit {
            return Err(MediaError::Upload("too many files".to_owned()));
        }
        files.push(file);
        Ok(())
    }
}

/// Adapts a multipart field to the media store's chunk reader.
struct FieldChunks<'a>(Field<'a>);

impl ChunkSource for FieldChunks<'_> {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, MediaError> {
        self.0.chunk().await.map_err(upload_error)
    }
}

fn upload_error(e: MultipartError) -> MediaError {
    MediaError::Upload(e.body_text())
}

impl FromRequest<AppState> for UploadForm {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;

        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await.map_err(upload_error)? {
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };

            if field.file_name().is_none() {
                let value = field.text().await.map_err(upload_error)?;
                form.texts.entry(name).or_default().push(value);
                continue;
            }

            if !FILE_FIELDS.contains(&name.as_str()) {
                return Err(MediaError::Upload(format!("unexpected file field '{name}'")).into());
            }

            let file_name = field.file_name().map(str::to_owned);
            let content_type = field.content_type().map(str::to_owned);
            let staged = state
                .media()
                .stage(
                    &name,
                    file_name.as_deref(),
                    content_type.as_deref(),
                    &mut FieldChunks(field),
                )
                .await?;
            form.push_file(name, staged)?;
        }

        Ok(form)
    }
}
