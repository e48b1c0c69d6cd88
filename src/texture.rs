use egui::{Context, TextureHandle, TextureOptions};
use image::RgbImage;

use crate::encoded::EncodedImage;
use crate::ui::BoothApp;

/// Texture decoded from an encoded still, remembered by image identity.
pub struct StillTexture {
    image_id: u64,
    pub handle: TextureHandle,
}

impl BoothApp {
    pub fn update_camera_texture(&mut self, ctx: &Context, image: &RgbImage) {
        // Skip invalid frames to prevent a white flash
        if image.width() == 0 || image.height() == 0 {
            return;
        }

        let size = [image.width() as usize, image.height() as usize];
        let pixels = image.as_flat_samples();
        let color_image = egui::ColorImage::from_rgb(size, pixels.as_slice());

        // Reuse the texture while the frame size is stable
        if let Some(texture) = self.camera_texture.as_mut().filter(|t| t.size() == size) {
            texture.set(color_image, TextureOptions::LINEAR);
            return;
        }
        self.camera_texture =
            Some(ctx.load_texture("camera_preview", color_image, TextureOptions::LINEAR));
    }

    /// Texture for `image`, decoding only when the image changed.
    pub fn still_texture(
        ctx: &Context,
        slot: &mut Option<StillTexture>,
        name: &str,
        image: &EncodedImage,
    ) -> Option<TextureHandle> {
        if let Some(cached) = slot {
            if cached.image_id == image.id() {
                return Some(cached.handle.clone());
            }
        }

        let rgb = match image.decode() {
            Ok(decoded) => decoded.to_rgb8(),
            Err(e) => {
                log::warn!("Cannot display {} ({}): {}", name, image.mime(), e);
                *slot = None;
                return None;
            }
        };
        let size = [rgb.width() as usize, rgb.height() as usize];
        let color_image = egui::ColorImage::from_rgb(size, rgb.as_flat_samples().as_slice());
        let handle = ctx.load_texture(name, color_image, TextureOptions::LINEAR);

        *slot = Some(StillTexture {
            image_id: image.id(),
            handle: handle.clone(),
        });
        Some(handle)
    }
}
