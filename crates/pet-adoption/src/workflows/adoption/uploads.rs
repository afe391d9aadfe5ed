//! Signed-commitment uploads: image validation and the storage seam.

use mime::Mime;

use super::domain::ProcessId;

/// Raw file as received from a multipart form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitmentUpload {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
}

impl ImageFormat {
    pub const fn extension(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Png => "png",
            ImageFormat::Webp => "webp",
        }
    }

    fn from_mime(mime: &Mime) -> Option<Self> {
        if mime.type_() != mime::IMAGE {
            return None;
        }
        match mime.subtype().as_str() {
            "jpeg" | "jpg" | "pjpeg" => Some(ImageFormat::Jpeg),
            "png" => Some(ImageFormat::Png),
            "webp" => Some(ImageFormat::Webp),
            _ => None,
        }
    }

    fn matches_signature(self, bytes: &[u8]) -> bool {
        match self {
            ImageFormat::Jpeg => bytes.starts_with(&[0xFF, 0xD8, 0xFF]),
            ImageFormat::Png => bytes.starts_with(&[0x89, b'P', b'N', b'G']),
            ImageFormat::Webp => {
                bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadRejection {
    #[error("a signed commitment image is required")]
    Missing,
    #[error("file is {size} bytes, the limit is {limit} bytes")]
    TooLarge { size: usize, limit: usize },
    /// The request body was cut off before the file was read in full.
    #[error("file exceeds the {limit} byte upload limit")]
    ExceedsLimit { limit: usize },
    #[error("unsupported file type '{0}', only jpg, png and webp images are accepted")]
    UnsupportedType(String),
    #[error("file contents do not look like a {0} image")]
    CorruptImage(&'static str),
}

/// Size and format rules for commitment images.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPolicy {
    max_bytes: usize,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self::new(5 * 1024 * 1024)
    }
}

impl UploadPolicy {
    pub const fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub const fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn validate(&self, upload: &CommitmentUpload) -> Result<ImageFormat, UploadRejection> {
        if upload.bytes.is_empty() {
            return Err(UploadRejection::Missing);
        }
        if upload.bytes.len() > self.max_bytes {
            return Err(UploadRejection::TooLarge {
                size: upload.bytes.len(),
                limit: self.max_bytes,
            });
        }

        let declared = upload
            .content_type
            .as_deref()
            .filter(|value| !value.trim().is_empty() && *value != "application/octet-stream")
            .and_then(|value| value.parse::<Mime>().ok());
        let guessed = upload
            .file_name
            .as_deref()
            .and_then(|name| mime_guess::from_path(name).first());

        let mime = declared.or(guessed).ok_or_else(|| {
            UploadRejection::UnsupportedType(
                upload
                    .file_name
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
            )
        })?;

        let format = ImageFormat::from_mime(&mime)
            .ok_or_else(|| UploadRejection::UnsupportedType(mime.essence_str().to_string()))?;

        if !format.matches_signature(&upload.bytes) {
            return Err(UploadRejection::CorruptImage(format.extension()));
        }

        Ok(format)
    }
}

/// External file storage (CDN, bucket, local disk).
pub trait CommitmentStorage: Send + Sync {
    /// Store a validated image and return the reference saved on the process.
    fn store(
        &self,
        process_id: &ProcessId,
        format: ImageFormat,
        bytes: &[u8],
    ) -> Result<String, StorageError>;

    /// Remove a stored image whose process update could not be saved.
    fn discard(&self, reference: &str) -> Result<(), StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("file storage failed: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];

    fn upload(name: &str, content_type: Option<&str>, bytes: &[u8]) -> CommitmentUpload {
        CommitmentUpload {
            file_name: Some(name.to_string()),
            content_type: content_type.map(str::to_string),
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn accepts_declared_png() {
        let policy = UploadPolicy::default();
        let format = policy
            .validate(&upload("compromiso.png", Some("image/png"), PNG))
            .expect("png accepted");
        assert_eq!(format, ImageFormat::Png);
    }

    #[test]
    fn guesses_type_from_extension_when_not_declared() {
        let policy = UploadPolicy::default();
        let jpeg = [0xFF, 0xD8, 0xFF, 0xE0, 0x00];
        let format = policy
            .validate(&upload("firma.JPG", Some("application/octet-stream"), &jpeg))
            .expect("jpeg accepted");
        assert_eq!(format, ImageFormat::Jpeg);
    }

    #[test]
    fn accepts_webp() {
        let mut bytes = b"RIFF".to_vec();
        bytes.extend_from_slice(&[0x10, 0, 0, 0]);
        bytes.extend_from_slice(b"WEBPVP8 ");
        let format = UploadPolicy::default()
            .validate(&upload("firma.webp", None, &bytes))
            .expect("webp accepted");
        assert_eq!(format, ImageFormat::Webp);
    }

    #[test]
    fn rejects_pdf() {
        let err = UploadPolicy::default()
            .validate(&upload("compromiso.pdf", Some("application/pdf"), b"%PDF-1.7"))
            .expect_err("pdf refused");
        assert_eq!(
            err,
            UploadRejection::UnsupportedType("application/pdf".to_string())
        );
    }

    #[test]
    fn rejects_oversized_files() {
        let policy = UploadPolicy::new(4);
        let err = policy
            .validate(&upload("compromiso.png", Some("image/png"), PNG))
            .expect_err("too large");
        assert_eq!(
            err,
            UploadRejection::TooLarge {
                size: PNG.len(),
                limit: 4
            }
        );
    }

    #[test]
    fn rejects_empty_and_mislabelled_files() {
        let policy = UploadPolicy::default();
        assert_eq!(
            policy.validate(&upload("vacio.png", Some("image/png"), &[])),
            Err(UploadRejection::Missing)
        );
        assert_eq!(
            policy.validate(&upload("falso.png", Some("image/png"), b"not an image")),
            Err(UploadRejection::CorruptImage("png"))
        );
    }
}
