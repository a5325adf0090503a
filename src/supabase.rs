use async_trait::async_trait;
use postgrest::Postgrest;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::config::Config;

/// PostgREST client authenticated with the service-role key. Row ownership is
/// enforced by the `user_id` filters every query carries.
pub fn postgrest_client(config: &Config) -> Postgrest {
    Postgrest::new(config.postgrest_url())
        .insert_header("apikey", config.supabase_key.as_str())
        .insert_header("Authorization", format!("Bearer {}", config.supabase_key))
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Storage returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Storage response missing signed URL")]
    MissingSignedUrl,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn signed_url(&self, bucket: &str, path: &str, expires_in_secs: u64) -> Result<String, StorageError>;
    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>, StorageError>;
    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError>;
    fn public_url(&self, bucket: &str, path: &str) -> String;
}

#[derive(Clone)]
pub struct SupabaseStorage {
    http: reqwest::Client,
    base_url: String,
    key: String,
}

#[derive(Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedURL", alias = "signedUrl")]
    signed_url: Option<String>,
}

fn encode_path(path: &str) -> String {
    path.trim_start_matches('/')
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

impl SupabaseStorage {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.storage_url(),
            key: config.supabase_key.clone(),
        }
    }

    fn object_url(&self, kind: &str, bucket: &str, path: &str) -> String {
        format!("{}/object/{}{}/{}", self.base_url, kind, bucket, encode_path(path))
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, StorageError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(StorageError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl ObjectStorage for SupabaseStorage {
    async fn signed_url(&self, bucket: &str, path: &str, expires_in_secs: u64) -> Result<String, StorageError> {
        let response = self
            .http
            .post(self.object_url("sign/", bucket, path))
            .bearer_auth(&self.key)
            .header("apikey", &self.key)
            .json(&json!({ "expiresIn": expires_in_secs }))
            .send()
            .await?;

        let signed: SignedUrlResponse = Self::check(response).await?.json().await?;
        let signed_path = signed.signed_url.ok_or(StorageError::MissingSignedUrl)?;
        Ok(format!("{}{}", self.base_url, signed_path))
    }

    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>, StorageError> {
        let response = self
            .http
            .get(self.object_url("", bucket, path))
            .bearer_auth(&self.key)
            .header("apikey", &self.key)
            .send()
            .await?;

        let bytes = Self::check(response).await?.bytes().await?;
        log::debug!("Downloaded {} bytes from {}/{}", bytes.len(), bucket, path);
        Ok(bytes.to_vec())
    }

    async fn upload(&self, bucket: &str, path: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        let response = self
            .http
            .post(self.object_url("", bucket, path))
            .bearer_auth(&self.key)
            .header("apikey", &self.key)
            .header("content-type", content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        self.object_url("public/", bucket, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_paths_are_segment_encoded() {
        let storage = SupabaseStorage {
            http: reqwest::Client::new(),
            base_url: "https://project.supabase.co/storage/v1".to_string(),
            key: "key".to_string(),
        };
        assert_eq!(
            storage.public_url("generated-images", "/user 1/logo.png"),
            "https://project.supabase.co/storage/v1/object/public/generated-images/user%201/logo.png"
        );
        assert_eq!(
            storage.object_url("sign/", "audio-recordings", "a/b.webm"),
            "https://project.supabase.co/storage/v1/object/sign/audio-recordings/a/b.webm"
        );
    }
}
