// Multipart form decoding shared by the upload endpoints

use std::collections::HashMap;

use axum::extract::Multipart;

use crate::{
    error::{AppError, Result},
    services::storage::Upload,
};

#[derive(Debug, Default)]
pub struct UploadForm {
    pub fields: HashMap<String, String>,
    pub files: HashMap<String, Upload>,
}

impl UploadForm {
    pub async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read multipart field: {e}")))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let content_type = field
                        .content_type()
                        .unwrap_or("application/octet-stream")
                        .to_string();
                    let data = field.bytes().await.map_err(|e| {
                        AppError::BadRequest(format!("Failed to read file {file_name}: {e}"))
                    })?;
                    form.files.insert(
                        name,
                        Upload {
                            file_name,
                            content_type,
                            data: data.to_vec(),
                        },
                    );
                }
                None => {
                    let value = field.text().await.map_err(|e| {
                        AppError::BadRequest(format!("Failed to read field {name}: {e}"))
                    })?;
                    form.fields.insert(name, value);
                }
            }
        }

        Ok(form)
    }

    pub fn take_file(&mut self, name: &str) -> Result<Upload> {
        self.files
            .remove(name)
            .ok_or_else(|| AppError::Validation("No file was uploaded.".to_string()))
    }

    // Trimmed text field, `None` when absent or blank.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}
