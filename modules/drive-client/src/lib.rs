pub mod error;
pub mod types;

pub use error::{DriveError, Result};
pub use types::{DriveFile, FileList, FileMetadata};

use bytes::Bytes;

const API_URL: &str = "https://www.googleapis.com/drive/v3";
const UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3";

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// Client for the Google Drive v3 files API, used as the image sink.
/// Uploads are idempotent-safe by name: callers check `find_file` before
/// re-uploading.
pub struct DriveClient {
    client: reqwest::Client,
    token: String,
}

impl DriveClient {
    pub fn new(token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
        }
    }

    /// Look up a file by exact name inside a folder. Returns the file id
    /// of the first match.
    pub async fn find_file(&self, name: &str, folder_id: &str) -> Result<Option<String>> {
        let query = format!(
            "name = '{}' and '{}' in parents and trashed = false",
            escape_query(name),
            folder_id
        );
        let url = format!("{}/files", API_URL);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("q", query.as_str()), ("fields", "files(id,name)")])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DriveError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let list: FileList = resp.json().await?;
        Ok(list.files.into_iter().next().map(|f| f.id))
    }

    /// Find a child folder by name, creating it if absent. Returns the
    /// folder id.
    pub async fn ensure_folder(&self, name: &str, parent_id: &str) -> Result<String> {
        let query = format!(
            "name = '{}' and '{}' in parents and mimeType = '{}' and trashed = false",
            escape_query(name),
            parent_id,
            FOLDER_MIME
        );
        let url = format!("{}/files", API_URL);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("q", query.as_str()), ("fields", "files(id,name)")])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DriveError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let list: FileList = resp.json().await?;
        if let Some(existing) = list.files.into_iter().next() {
            return Ok(existing.id);
        }

        let metadata = FileMetadata {
            name: name.to_string(),
            mime_type: Some(FOLDER_MIME.to_string()),
            parents: vec![parent_id.to_string()],
        };
        let resp = self
            .client
            .post(format!("{}/files", API_URL))
            .bearer_auth(&self.token)
            .query(&[("fields", "id")])
            .json(&metadata)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DriveError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let folder: DriveFile = resp.json().await?;
        tracing::info!(name, id = %folder.id, "Created Drive folder");
        Ok(folder.id)
    }

    /// Multipart upload of raw bytes into a folder. Returns the file id.
    pub async fn upload(
        &self,
        data: Bytes,
        name: &str,
        folder_id: &str,
        mime_type: &str,
    ) -> Result<String> {
        let metadata = FileMetadata {
            name: name.to_string(),
            mime_type: None,
            parents: vec![folder_id.to_string()],
        };

        let metadata_part = reqwest::multipart::Part::text(serde_json::to_string(&metadata)?)
            .mime_str("application/json")
            .map_err(|e| DriveError::Parse(e.to_string()))?;
        let media_part = reqwest::multipart::Part::bytes(data.to_vec())
            .mime_str(mime_type)
            .map_err(|e| DriveError::Parse(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .part("metadata", metadata_part)
            .part("media", media_part);

        let resp = self
            .client
            .post(format!("{}/files", UPLOAD_URL))
            .bearer_auth(&self.token)
            .query(&[("uploadType", "multipart"), ("fields", "id")])
            .multipart(form)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DriveError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let file: DriveFile = resp.json().await?;
        tracing::debug!(name, id = %file.id, "Uploaded file to Drive");
        Ok(file.id)
    }
}

fn escape_query(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}
