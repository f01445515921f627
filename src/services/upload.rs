use crate::error::{AppError, AppResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct UploadConfig {
    /// Public media (thumbnails, screenshots), served under `/uploads`.
    pub upload_dir: String,
    /// Resource archives. Never served directly; downloads go through the quota check.
    pub archive_dir: String,
}

impl UploadConfig {
    pub fn from_env() -> Self {
        Self {
            upload_dir: std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".to_string()),
            archive_dir: std::env::var("ARCHIVE_DIR")
                .unwrap_or_else(|_| "./storage/resources".to_string()),
        }
    }

    pub fn archive_path(&self, file_name: &str) -> PathBuf {
        Path::new(&self.archive_dir).join(file_name)
    }
}

const MAX_IMAGE_SIZE: usize = 5 * 1024 * 1024; // 5 MB
const ALLOWED_IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

/// Validate file magic bytes match the declared content type.
fn validate_image_magic(data: &[u8], content_type: &str) -> bool {
    match content_type {
        "image/jpeg" => data.len() >= 3 && data[..3] == [0xFF, 0xD8, 0xFF],
        "image/png" => data.len() >= 4 && data[..4] == [0x89, 0x50, 0x4E, 0x47],
        "image/gif" => data.len() >= 4 && data[..4] == [0x47, 0x49, 0x46, 0x38],
        "image/webp" => {
            data.len() >= 12
                && data[..4] == [0x52, 0x49, 0x46, 0x46]
                && data[8..12] == [0x57, 0x45, 0x42, 0x50]
        }
        _ => false,
    }
}

/// Checks the archive signature for the extensions we know; others are accepted as-is.
fn validate_archive_magic(data: &[u8], ext: &str) -> bool {
    match ext {
        ".zip" => data.starts_with(b"PK\x03\x04") || data.starts_with(b"PK\x05\x06"),
        ".rar" => data.starts_with(b"Rar!\x1a\x07"),
        ".7z" => data.starts_with(&[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C]),
        _ => !data.is_empty(),
    }
}

/// Lower-cased extension including the dot, e.g. `.zip`.
pub fn file_extension(file_name: &str) -> Option<String> {
    let name = Path::new(file_name).file_name()?.to_str()?;
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(format!(".{}", ext.to_ascii_lowercase()))
}

pub struct StoredArchive {
    pub file_name: String,
    pub size: i64,
}

pub struct UploadService;

impl UploadService {
    /// Validate and store a resource archive as `{stem}{ext}` in the archive directory.
    pub async fn save_archive(
        config: &UploadConfig,
        data: &[u8],
        original_name: &str,
        stem: &str,
        allowed_types: &[String],
        max_size: u64,
    ) -> AppResult<StoredArchive> {
        if data.is_empty() {
            return Err(AppError::Validation("Resource file is empty".to_string()));
        }
        if data.len() as u64 > max_size {
            return Err(AppError::PayloadTooLarge);
        }

        let ext = file_extension(original_name)
            .filter(|ext| allowed_types.iter().any(|allowed| allowed == ext))
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "Unsupported file type. Allowed: {}",
                    allowed_types.join(", ")
                ))
            })?;

        if !validate_archive_magic(data, &ext) {
            return Err(AppError::Validation(
                "File content does not match its extension".to_string(),
            ));
        }

        let file_name = format!("{}{}", stem, ext);
        write_file(Path::new(&config.archive_dir), &file_name, data).await?;

        Ok(StoredArchive {
            file_name,
            size: data.len() as i64,
        })
    }

    /// Save a thumbnail or screenshot. Returns the public URL path (e.g. `/uploads/images/x.png`).
    pub async fn save_image(
        config: &UploadConfig,
        data: &[u8],
        content_type: &str,
        subdirectory: &str,
    ) -> AppResult<String> {
        if data.len() > MAX_IMAGE_SIZE {
            return Err(AppError::PayloadTooLarge);
        }

        if !ALLOWED_IMAGE_TYPES.contains(&content_type) {
            return Err(AppError::Validation(format!(
                "Unsupported image type: {}. Allowed: jpeg, png, gif, webp",
                content_type
            )));
        }

        if !validate_image_magic(data, content_type) {
            return Err(AppError::Validation(
                "Image content does not match declared content type".to_string(),
            ));
        }

        let ext = match content_type {
            "image/jpeg" => "jpg",
            "image/png" => "png",
            "image/gif" => "gif",
            "image/webp" => "webp",
            _ => return Err(AppError::Validation("Unsupported image type".to_string())),
        };

        let filename = format!("{}.{}", Uuid::new_v4(), ext);
        let dir = Path::new(&config.upload_dir).join(subdirectory);
        write_file(&dir, &filename, data).await?;

        Ok(format!("/uploads/{}/{}", subdirectory, filename))
    }

    /// Removes an archive and any media stored for a deleted resource. Missing files are ignored.
    pub async fn remove_resource_files(config: &UploadConfig, archive: &str, media_urls: &[String]) {
        let mut paths = vec![config.archive_path(archive)];
        paths.extend(media_urls.iter().filter_map(|url| {
            url.strip_prefix("/uploads/")
                .filter(|rel| !rel.contains(".."))
                .map(|rel| Path::new(&config.upload_dir).join(rel))
        }));

        for path in paths {
            if let Err(e) = fs::remove_file(&path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Failed to remove {}: {}", path.display(), e);
                }
            }
        }
    }
}

async fn write_file(dir: &Path, file_name: &str, data: &[u8]) -> AppResult<()> {
    fs::create_dir_all(dir).await.map_err(|e| {
        AppError::Internal(anyhow::anyhow!(
            "Failed to create upload directory {}: {}",
            dir.display(),
            e
        ))
    })?;

    fs::write(dir.join(file_name), data).await.map_err(|e| {
        AppError::Internal(anyhow::anyhow!("Failed to write {}: {}", file_name, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jpeg_magic_bytes_valid() {
        let data = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
        assert!(validate_image_magic(&data, "image/jpeg"));
    }

    #[test]
    fn webp_magic_bytes_valid() {
        let data = [
            0x52, 0x49, 0x46, 0x46, // RIFF
            0x00, 0x00, 0x00, 0x00, // size
            0x57, 0x45, 0x42, 0x50, // WEBP
        ];
        assert!(validate_image_magic(&data, "image/webp"));
    }

    #[test]
    fn wrong_image_magic_rejected() {
        let png_data = [0x89, 0x50, 0x4E, 0x47];
        assert!(!validate_image_magic(&png_data, "image/jpeg"));
        assert!(!validate_image_magic(&[], "image/png"));
    }

    #[test]
    fn archive_signatures() {
        assert!(validate_archive_magic(b"PK\x03\x04rest", ".zip"));
        assert!(!validate_archive_magic(b"MZ\x90\x00", ".zip"));
        assert!(validate_archive_magic(b"Rar!\x1a\x07\x01\x00", ".rar"));
        assert!(validate_archive_magic(
            &[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C, 0x00],
            ".7z"
        ));
    }

    #[test]
    fn extension_parsing() {
        assert_eq!(file_extension("garage.ZIP").as_deref(), Some(".zip"));
        assert_eq!(file_extension("dir/pack.tar.7z").as_deref(), Some(".7z"));
        assert_eq!(file_extension("noext"), None);
        assert_eq!(file_extension("trailing."), None);
    }

    #[tokio::test]
    async fn archive_rejects_disallowed_extension_and_size() {
        let config = UploadConfig {
            upload_dir: std::env::temp_dir().join("fivehub-unit-media").display().to_string(),
            archive_dir: std::env::temp_dir().join("fivehub-unit-archives").display().to_string(),
        };
        let allowed = vec![".zip".to_string()];

        let err = UploadService::save_archive(&config, b"MZ\x90", "tool.exe", "tool", &allowed, 1024)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::Validation(_)));

        let err = UploadService::save_archive(&config, &[0u8; 64], "big.zip", "big", &allowed, 16)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AppError::PayloadTooLarge));
    }
}
