use anyhow::{Context, Result};
use image::ImageFormat;
use std::path::{Path, PathBuf};

use crate::encoded::EncodedImage;

/// File name offered when saving a certificate.
pub const ARTIFACT_FILE_NAME: &str = "employee-of-the-month.png";

/// Write the certificate into `dir` under the standard name.
pub fn save_artifact(artifact: &EncodedImage, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    let path = dir.join(ARTIFACT_FILE_NAME);
    save_artifact_to(artifact, &path)?;
    Ok(path)
}

/// Transcode the certificate to PNG and write it to `path`.
pub fn save_artifact_to(artifact: &EncodedImage, path: &Path) -> Result<()> {
    let image = artifact
        .decode()
        .context("Certificate is not a decodable image")?;

    image
        .save_with_format(path, ImageFormat::Png)
        .with_context(|| format!("Failed to save certificate to {}", path.display()))?;

    log::info!(
        "Certificate from {} saved to {} ({}x{})",
        artifact.created_at().format("%H:%M:%S"),
        path.display(),
        image.width(),
        image.height()
    );
    Ok(())
}
