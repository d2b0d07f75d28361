//! Image upload validation applied when offers are authored
use crate::boundary::MediaStore;
use crate::config::MediaLimits;
use crate::error::{MarketError, MarketResult};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub file_name: String,
    pub mime_type: String,
    pub size: u64,
}

impl ImageUpload {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, size: u64) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            size,
        }
    }
}

/// Uploads partitioned by outcome. A file with a disallowed type lands in
/// `invalid_type` whatever its size.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub valid: Vec<ImageUpload>,
    pub oversized: Vec<ImageUpload>,
    pub invalid_type: Vec<ImageUpload>,
}

impl UploadReport {
    pub fn has_errors(&self) -> bool {
        !self.oversized.is_empty() || !self.invalid_type.is_empty()
    }

    fn describe_errors(&self, limits: &MediaLimits) -> String {
        let mut problems = Vec::new();
        for upload in &self.invalid_type {
            problems.push(format!(
                "{} has unsupported type {}",
                upload.file_name, upload.mime_type
            ));
        }
        for upload in &self.oversized {
            problems.push(format!(
                "{} is {} (limit {})",
                upload.file_name,
                format_file_size(upload.size),
                format_file_size(limits.max_file_size)
            ));
        }
        problems.join("; ")
    }
}

pub fn is_allowed_type(mime_type: &str, limits: &MediaLimits) -> bool {
    let mime_type = mime_type.trim().to_ascii_lowercase();
    limits.allowed_mime_types.iter().any(|t| *t == mime_type)
}

pub fn validate_uploads(uploads: &[ImageUpload], limits: &MediaLimits) -> UploadReport {
    let mut report = UploadReport::default();

    for upload in uploads {
        if !is_allowed_type(&upload.mime_type, limits) {
            report.invalid_type.push(upload.clone());
        } else if upload.size > limits.max_file_size {
            report.oversized.push(upload.clone());
        } else {
            report.valid.push(upload.clone());
        }
    }

    report
}

/// Human readable size, `1536` becomes `1.5 KB`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded} {}", UNITS[unit])
}

/// Validate a batch of images for one offer and hand them to the media store.
/// Nothing is stored unless the whole batch is acceptable.
pub fn upload_images<M: MediaStore + ?Sized>(
    store: &M,
    uploads: &[(ImageUpload, Vec<u8>)],
    limits: &MediaLimits,
) -> MarketResult<Vec<String>> {
    if uploads.len() > limits.max_images_per_offer {
        return Err(MarketError::Validation(format!(
            "at most {} images are allowed, got {}",
            limits.max_images_per_offer,
            uploads.len()
        )));
    }

    let metadata: Vec<ImageUpload> = uploads.iter().map(|(u, _)| u.clone()).collect();
    let report = validate_uploads(&metadata, limits);
    if report.has_errors() {
        return Err(MarketError::Validation(report.describe_errors(limits)));
    }

    let mut refs = Vec::with_capacity(uploads.len());
    for (upload, bytes) in uploads {
        let reference = store.store(upload, bytes)?;
        debug!(file = %upload.file_name, %reference, "Stored offer image");
        refs.push(reference);
    }

    Ok(refs)
}
