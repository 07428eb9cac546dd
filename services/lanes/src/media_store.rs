use crate::config::MediaConfig;
use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Object storage for image media, keyed per lane and event
pub struct MediaStore {
    client: S3Client,
    bucket: String,
    config: MediaConfig,
}

impl MediaStore {
    /// Create a new media store
    pub async fn new(config: &MediaConfig) -> Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let s3_config = s3_config_builder.build();
        let client = S3Client::from_conf(s3_config);

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "Media store initialized"
        );

        Ok(Self {
            client,
            bucket: config.bucket.clone(),
            config: config.clone(),
        })
    }

    /// Generate the object key for a full-size image.
    /// Format: media/{lane_id}/{event_id}/{image_id}.{ext}
    ///
    /// Partitioning strategy:
    /// - First level: lane id, so a lane's media shares a prefix for
    ///   listing and lifecycle policies
    /// - Second level: event id for gallery-scoped operations
    /// - Filename: image id plus a sanitized extension
    pub fn generate_media_key(
        &self,
        lane_id: Uuid,
        event_id: Uuid,
        image_id: Uuid,
        format: &str,
    ) -> String {
        format!(
            "media/{lane_id}/{event_id}/{image_id}.{ext}",
            ext = sanitize_extension(format)
        )
    }

    /// Generate the object key for an image's thumbnail
    pub fn generate_thumbnail_key(
        &self,
        lane_id: Uuid,
        event_id: Uuid,
        image_id: Uuid,
        format: &str,
    ) -> String {
        format!(
            "media/{lane_id}/{event_id}/{image_id}_thumb.{ext}",
            ext = sanitize_extension(format)
        )
    }

    /// Public URL for a stored object.
    ///
    /// Uses the configured CDN/base URL when present, otherwise the bucket's
    /// virtual-hosted S3 URL.
    pub fn public_url(&self, key: &str) -> String {
        match self.config.public_base_url {
            Some(ref base) => format!("{}/{}", base.trim_end_matches('/'), key),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.config.region, key
            ),
        }
    }

    /// Upload image bytes under the given key
    #[instrument(skip(self, data), fields(key = %key, size_bytes = data.len()))]
    pub async fn upload_image(&self, key: &str, data: Vec<u8>, format: &str) -> Result<()> {
        let content_type = content_type_for(format);

        debug!("Uploading image to object storage");

        if data.len() > self.config.multipart_threshold_bytes {
            self.multipart_upload(key, data, &content_type).await?;
        } else {
            self.simple_upload(key, data, &content_type).await?;
        }

        info!(key = %key, "Image uploaded");

        Ok(())
    }

    /// Simple single-part upload for small files
    async fn simple_upload(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        let body = ByteStream::from(data);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .context("Failed to upload image to object storage")?;

        Ok(())
    }

    /// Multipart upload for large files
    async fn multipart_upload(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        let create_response = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .context("Failed to create multipart upload")?;

        let upload_id = create_response
            .upload_id()
            .context("No upload ID in response")?;

        let mut completed_parts = Vec::new();
        let part_size = self.config.part_size_bytes;
        let mut part_number = 1;

        for chunk in data.chunks(part_size) {
            let body = ByteStream::from(chunk.to_vec());

            let upload_part_response = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(upload_id)
                .part_number(part_number)
                .body(body)
                .send()
                .await
                .context("Failed to upload part")?;

            let completed_part = aws_sdk_s3::types::CompletedPart::builder()
                .part_number(part_number)
                .e_tag(upload_part_response.e_tag().unwrap_or_default())
                .build();

            completed_parts.push(completed_part);
            part_number += 1;
        }

        let completed_upload = aws_sdk_s3::types::CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts))
            .build();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_upload)
            .send()
            .await
            .context("Failed to complete multipart upload")?;

        Ok(())
    }

    /// Delete an object from storage
    #[instrument(skip(self), fields(key = %key))]
    pub async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("Failed to delete object from storage")?;

        debug!(key = %key, "Object deleted from storage");
        Ok(())
    }

    /// Check if an object exists in storage
    pub async fn object_exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                if e.as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false)
                {
                    Ok(false)
                } else {
                    Err(e).context("Failed to check object existence")
                }
            }
        }
    }

    /// Generate a time-limited presigned GET URL for an object
    pub async fn presign_get(
        &self,
        key: &str,
        expiry: Duration,
    ) -> Result<(String, DateTime<Utc>)> {
        let presigning_config =
            PresigningConfig::expires_in(expiry).context("Failed to create presigning config")?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning_config)
            .await
            .context("Failed to generate presigned URL")?;

        let expires_at = Utc::now()
            + chrono::Duration::from_std(expiry).unwrap_or_else(|_| chrono::Duration::hours(1));

        Ok((presigned.uri().to_string(), expires_at))
    }

    /// Get the bucket name
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

/// Sanitize a file extension to a safe lowercase token
fn sanitize_extension(format: &str) -> String {
    let ext: String = format
        .trim_start_matches('.')
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase();

    if ext.is_empty() {
        "bin".to_string()
    } else {
        ext
    }
}

/// Get content type for an image format
fn content_type_for(format: &str) -> String {
    match sanitize_extension(format).as_str() {
        "jpeg" | "jpg" => "image/jpeg".to_string(),
        "png" => "image/png".to_string(),
        "webp" => "image/webp".to_string(),
        "heic" => "image/heic".to_string(),
        "gif" => "image/gif".to_string(),
        _ => "application/octet-stream".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> MediaConfig {
        MediaConfig {
            bucket: "lanes-media".to_string(),
            region: "us-east-1".to_string(),
            endpoint_url: None,
            force_path_style: false,
            public_base_url: None,
            presigned_url_expiry_secs: 3600,
            multipart_threshold_bytes: 5 * 1024 * 1024,
            part_size_bytes: 5 * 1024 * 1024,
        }
    }

    #[test]
    fn test_media_key_layout() {
        let lane_id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let event_id = Uuid::parse_str("650e8400-e29b-41d4-a716-446655440000").unwrap();
        let image_id = Uuid::parse_str("750e8400-e29b-41d4-a716-446655440000").unwrap();

        let key = format!(
            "media/{}/{}/{}.{}",
            lane_id, event_id, image_id, "jpg"
        );
        assert!(key.starts_with("media/550e8400"));
        assert!(key.ends_with(".jpg"));

        let thumb = format!("media/{}/{}/{}_thumb.{}", lane_id, event_id, image_id, "jpg");
        assert!(thumb.contains("_thumb."));
    }

    #[test]
    fn test_sanitize_extension() {
        assert_eq!(sanitize_extension("jpg"), "jpg");
        assert_eq!(sanitize_extension(".JPEG"), "jpeg");
        assert_eq!(sanitize_extension("png "), "png");
        assert_eq!(sanitize_extension("../etc"), "etc");
        assert_eq!(sanitize_extension(""), "bin");
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("jpeg"), "image/jpeg");
        assert_eq!(content_type_for("JPG"), "image/jpeg");
        assert_eq!(content_type_for("png"), "image/png");
        assert_eq!(content_type_for("unknown"), "application/octet-stream");
    }

    #[test]
    fn test_public_url_prefers_configured_base() {
        let mut config = test_config();
        config.public_base_url = Some("https://cdn.example.com/".to_string());

        let base = config.public_base_url.as_deref().unwrap();
        let url = format!("{}/{}", base.trim_end_matches('/'), "media/a/b/c.jpg");
        assert_eq!(url, "https://cdn.example.com/media/a/b/c.jpg");
    }

    #[test]
    fn test_public_url_falls_back_to_bucket_url() {
        let config = test_config();
        let url = format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            config.bucket, config.region, "media/a/b/c.jpg"
        );
        assert_eq!(
            url,
            "https://lanes-media.s3.us-east-1.amazonaws.com/media/a/b/c.jpg"
        );
    }
}
