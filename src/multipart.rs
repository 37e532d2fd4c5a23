use std::{collections::HashMap, path::Path};

use axum::extract::Multipart;
use tracing::debug;

use crate::{errors::AuthError, storage::StagedFile};

/// Text fields and staged files of a multipart form.
///
/// Files are written to the staging directory as they stream in; they are
/// removed when the form (or the `StagedFile` taken out of it) is dropped.
#[derive(Debug, Default)]
pub struct StagedForm {
    pub fields: HashMap<String, String>,
    pub files: HashMap<String, StagedFile>,
}

impl StagedForm {
    /// Reads the whole form. Only parts named in `file_fields` are staged;
    /// empty file parts are ignored.
    pub async fn read(
        mut mp: Multipart,
        file_fields: &[&str],
        staging_dir: &Path,
    ) -> Result<Self, AuthError> {
        let mut form = Self::default();
        while let Some(field) = mp.next_field().await.map_err(malformed)? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            if file_fields.contains(&name.as_str()) {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let body = field.bytes().await.map_err(malformed)?;
                if body.is_empty() {
                    continue;
                }
                let staged = StagedFile::write(staging_dir, &content_type, body)
                    .await
                    .map_err(AuthError::Internal)?;
                debug!(field = %name, path = %staged.path().display(), "file staged");
                form.files.insert(name, staged);
            } else {
                let text = field.text().await.map_err(malformed)?;
                form.fields.insert(name, text);
            }
        }
        Ok(form)
    }

    pub fn take_field(&mut self, name: &str) -> Option<String> {
        self.fields.remove(name)
    }

    pub fn take_file(&mut self, name: &str) -> Option<StagedFile> {
        self.files.remove(name)
    }
}

fn malformed(e: axum::extract::multipart::MultipartError) -> AuthError {
    AuthError::validation(format!("Malformed multipart body: {e}"))
}
