use crate::asset::{AssetHandle, AssetKind, AssetPayload, LoadContext};
use crate::assets::ImportContext;
use crate::binary::{read_pod, write_pod};
use crate::codec::AssetCodec;
use crate::compression::{read_stream, write_stream};
use crate::error::{AssetError, AssetResult};
use crate::gpu::{GpuDevice, GpuTexture, TextureDescriptor, TextureFormat};
use crate::type_info::TypeDescriptor;
use bytemuck::{Pod, Zeroable};
use std::any::Any;
use std::fmt;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

pub const TEXTURE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tga", "hdr", "exr"];

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct TextureRecord {
    width: u32,
    height: u32,
    format: u32,
}

/// CPU pixels plus the GPU texture created from them.
pub struct TextureAsset {
    width: u32,
    height: u32,
    format: TextureFormat,
    pixels: Vec<u8>,
    compressed: bool,
    gpu: Option<(GpuTexture, Arc<dyn GpuDevice>)>,
}

crate::asset_type_info!(TextureAsset, "TextureAsset");

impl Default for TextureAsset {
    fn default() -> Self {
        Self { width: 0, height: 0, format: TextureFormat::R8G8B8A8_UNORM, pixels: Vec::new(), compressed: false, gpu: None }
    }
}

impl fmt::Debug for TextureAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextureAsset")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("compressed", &self.compressed)
            .field("gpu", &self.gpu.as_ref().map(|(texture, _)| texture.id()))
            .finish()
    }
}

impl TextureAsset {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Whether saves store the pixels in a compression envelope.
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    pub fn set_compressed(&mut self, compressed: bool) {
        self.compressed = compressed;
    }

    pub fn gpu_texture(&self) -> Option<&GpuTexture> {
        self.gpu.as_ref().map(|(texture, _)| texture)
    }

    /// Replaces the pixel data and re-creates the GPU texture from it.
    pub fn set_data(
        &mut self,
        width: u32,
        height: u32,
        format: TextureFormat,
        pixels: Vec<u8>,
        device: &Arc<dyn GpuDevice>,
    ) -> AssetResult<()> {
        let expected = format.image_size(width, height);
        if pixels.len() != expected {
            return Err(AssetError::FormatMismatch(format!(
                "{width}x{height} {format:?} needs {expected} bytes, got {}",
                pixels.len()
            )));
        }
        self.release_gpu();
        self.width = width;
        self.height = height;
        self.format = format;
        self.pixels = pixels;
        self.materialize(device)
    }

    fn materialize(&mut self, device: &Arc<dyn GpuDevice>) -> AssetResult<()> {
        let descriptor = TextureDescriptor::sampled_2d(self.width, self.height, self.format);
        let texture = device.create_texture(&descriptor, &self.pixels).map_err(|err| AssetError::Gpu(format!("{err:#}")))?;
        log::debug!(target: "texture", "created gpu texture {} ({}x{})", texture.id(), self.width, self.height);
        self.gpu = Some((texture, Arc::clone(device)));
        Ok(())
    }

    fn release_gpu(&mut self) {
        if let Some((texture, device)) = self.gpu.take() {
            device.destroy_texture(&texture);
        }
    }
}

impl AssetPayload for TextureAsset {
    fn asset_type(&self) -> TypeDescriptor {
        TypeDescriptor::of::<TextureAsset>()
    }

    fn serialize(&self, writer: &mut dyn Write) -> AssetResult<()> {
        let expected = self.format.image_size(self.width, self.height);
        if self.pixels.len() != expected {
            return Err(AssetError::FormatMismatch(format!(
                "texture holds {} bytes, {expected} expected",
                self.pixels.len()
            )));
        }
        let record = TextureRecord { width: self.width, height: self.height, format: self.format as u32 };
        write_pod(writer, &record)?;
        write_stream(writer, &self.pixels, self.compressed)
    }

    fn deserialize(&mut self, reader: &mut dyn Read, ctx: &LoadContext<'_>) -> AssetResult<()> {
        let record: TextureRecord = read_pod(reader).map_err(AssetError::from_payload_read)?;
        let format = TextureFormat::from_u32(record.format)
            .ok_or_else(|| AssetError::FormatMismatch(format!("unknown texture format tag {}", record.format)))?;
        let expected = format.image_size(record.width, record.height);
        let (pixels, compressed) = read_stream(reader, expected)?;
        self.compressed = compressed;
        self.set_data(record.width, record.height, format, pixels, ctx.device)
    }

    fn clear_asset_data(&mut self) {
        self.release_gpu();
        self.pixels = Vec::new();
        self.width = 0;
        self.height = 0;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl Drop for TextureAsset {
    fn drop(&mut self) {
        self.release_gpu();
    }
}

#[derive(Default)]
pub struct TextureCodec;

crate::asset_type_info!(TextureCodec, "TextureCodec");

impl AssetCodec for TextureCodec {
    fn descriptor(&self) -> TypeDescriptor {
        TypeDescriptor::of::<TextureCodec>()
    }

    fn asset_type(&self) -> TypeDescriptor {
        TypeDescriptor::of::<TextureAsset>()
    }

    fn extensions(&self) -> Vec<String> {
        TEXTURE_EXTENSIONS.iter().map(|ext| ext.to_string()).collect()
    }

    fn import(&self, source: &Path, ctx: &ImportContext<'_>) -> AssetResult<AssetHandle> {
        let image = image::open(source).map_err(|err| AssetError::decode(source, err))?.to_rgba8();
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(AssetError::decode(source, "image has no pixels"));
        }
        let mut texture = TextureAsset::default();
        texture.set_compressed(ctx.config().compress_payloads);
        texture.set_data(width, height, TextureFormat::R8G8B8A8_UNORM, image.into_raw(), ctx.device())?;
        let asset = ctx.create_asset(AssetKind::Texture(texture));
        asset.set_original_path(source);
        asset.try_save()?;
        Ok(asset)
    }

    fn create_payload(&self) -> AssetKind {
        AssetKind::Texture(TextureAsset::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::HeadlessDevice;

    #[test]
    fn payload_is_record_then_pixels() {
        let headless = Arc::new(HeadlessDevice::new());
        let device: Arc<dyn GpuDevice> = headless.clone();
        let mut texture = TextureAsset::default();
        texture.set_data(1, 2, TextureFormat::R8G8B8A8_UNORM, (0..8).collect(), &device).unwrap();
        let mut bytes = Vec::new();
        texture.serialize(&mut bytes).unwrap();
        assert_eq!(bytes.len(), 12 + 8);
        assert_eq!(&bytes[..4], &1u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &2u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &3u32.to_le_bytes());
        assert_eq!(&bytes[12..], &[0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn compressed_pixels_are_enveloped() {
        let device: Arc<dyn GpuDevice> = Arc::new(HeadlessDevice::new());
        let mut texture = TextureAsset::default();
        texture.set_data(16, 16, TextureFormat::R8G8B8A8_UNORM, vec![0x80; 16 * 16 * 4], &device).unwrap();
        texture.set_compressed(true);
        let mut bytes = Vec::new();
        texture.serialize(&mut bytes).unwrap();
        assert!(bytes.len() < 12 + 64);
        assert_eq!(&bytes[12..16], &crate::compression::MAGIC.to_le_bytes());
    }

    #[test]
    fn gpu_texture_follows_the_payload_lifetime() {
        let headless = Arc::new(HeadlessDevice::new());
        let device: Arc<dyn GpuDevice> = headless.clone();
        let mut texture = TextureAsset::default();
        texture.set_data(2, 1, TextureFormat::R8G8B8A8_UNORM, vec![9; 8], &device).unwrap();
        assert_eq!(headless.live_texture_count(), 1);
        texture.set_data(1, 1, TextureFormat::R8G8B8A8_UNORM, vec![1; 4], &device).unwrap();
        assert_eq!(headless.live_texture_count(), 1);
        texture.clear_asset_data();
        assert_eq!(headless.live_texture_count(), 0);
        assert!(texture.pixels().is_empty());
        assert!(texture.gpu_texture().is_none());
    }

    #[test]
    fn wrong_pixel_count_is_rejected() {
        let device: Arc<dyn GpuDevice> = Arc::new(HeadlessDevice::new());
        let mut texture = TextureAsset::default();
        let err = texture.set_data(2, 2, TextureFormat::R8G8B8A8_UNORM, vec![0; 15], &device).unwrap_err();
        assert!(matches!(err, AssetError::FormatMismatch(_)));
    }
}
