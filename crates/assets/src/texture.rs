//! Texture decoding and upload.

use crate::AssetError;
use crate::gpu::{GpuBackend, GpuError, GpuTexture, TextureFormat, TextureUpload};
use std::path::Path;

/// Decoded RGBA8 pixels, ready to upload.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureImage {
    /// A single-pixel image, used for placeholder bindings.
    pub fn solid(rgba: [u8; 4]) -> Self {
        Self {
            width: 1,
            height: 1,
            pixels: rgba.to_vec(),
        }
    }

    /// Decode an image file. Rows are flipped so that UV (0, 0) samples the
    /// bottom-left texel, matching OBJ texture coordinates.
    pub fn load(path: &Path) -> Result<Self, AssetError> {
        let bytes = std::fs::read(path).map_err(|source| AssetError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::decode(&bytes).map_err(|source| AssetError::Image {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, image::ImageError> {
        let rgba = image::load_from_memory(bytes)?.flipv().to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Self {
            width,
            height,
            pixels: rgba.into_raw(),
        })
    }
}

/// A texture living on the GPU.
#[derive(Debug)]
pub struct TextureAsset {
    pub path: String,
    pub texture: GpuTexture,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

impl TextureAsset {
    pub fn upload(
        gpu: &mut impl GpuBackend,
        path: &str,
        image: &TextureImage,
        format: TextureFormat,
    ) -> Result<Self, GpuError> {
        let texture = gpu.allocate_texture(TextureUpload {
            label: path,
            width: image.width,
            height: image.height,
            format,
            pixels: &image.pixels,
        })?;
        Ok(Self {
            path: path.to_string(),
            texture,
            width: image.width,
            height: image.height,
            format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessBackend;

    fn png_bytes() -> Vec<u8> {
        // 1x2 image: top row red, bottom row blue
        let mut img = image::RgbaImage::new(1, 2);
        img.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
        img.put_pixel(0, 1, image::Rgba([0, 0, 255, 255]));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn decode_flips_rows() {
        let image = TextureImage::decode(&png_bytes()).unwrap();
        assert_eq!((image.width, image.height), (1, 2));
        assert_eq!(&image.pixels[0..4], &[0, 0, 255, 255]);
        assert_eq!(&image.pixels[4..8], &[255, 0, 0, 255]);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = TextureImage::load(Path::new("does/not/exist.dds")).unwrap_err();
        assert!(matches!(err, AssetError::Io { .. }));
    }

    #[test]
    fn load_reports_garbage() {
        let file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        std::fs::write(file.path(), b"definitely not a png").unwrap();
        let err = TextureImage::load(file.path()).unwrap_err();
        assert!(matches!(err, AssetError::Image { .. }));
    }

    #[test]
    fn upload_keeps_format_and_size() {
        let mut gpu = HeadlessBackend::new();
        let image = TextureImage::solid([128, 128, 255, 255]);
        let asset =
            TextureAsset::upload(&mut gpu, "flat_normal", &image, TextureFormat::Rgba8Unorm)
                .unwrap();
        assert_eq!(asset.format, TextureFormat::Rgba8Unorm);
        assert_eq!((asset.width, asset.height), (1, 1));
        assert_eq!(gpu.live_textures(), 1);
    }
}
