use anyhow::{anyhow, bail, Result};
use bitflags::bitflags;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum TextureFormat {
    R8_UNORM = 1,
    R8G8_UNORM = 2,
    R8G8B8A8_UNORM = 3,
    R8G8B8A8_SRGB = 4,
    B8G8R8A8_UNORM = 5,
    B8G8R8A8_SRGB = 6,
    R16G16B16A16_SFLOAT = 7,
    R32G32B32A32_SFLOAT = 8,
    D16_UNORM = 9,
    D24_UNORM_S8_UINT = 10,
    D32_SFLOAT = 11,
}

impl TextureFormat {
    pub fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            1 => Self::R8_UNORM,
            2 => Self::R8G8_UNORM,
            3 => Self::R8G8B8A8_UNORM,
            4 => Self::R8G8B8A8_SRGB,
            5 => Self::B8G8R8A8_UNORM,
            6 => Self::B8G8R8A8_SRGB,
            7 => Self::R16G16B16A16_SFLOAT,
            8 => Self::R32G32B32A32_SFLOAT,
            9 => Self::D16_UNORM,
            10 => Self::D24_UNORM_S8_UINT,
            11 => Self::D32_SFLOAT,
            _ => return None,
        })
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::R8_UNORM => 1,
            Self::R8G8_UNORM | Self::D16_UNORM => 2,
            Self::R8G8B8A8_UNORM
            | Self::R8G8B8A8_SRGB
            | Self::B8G8R8A8_UNORM
            | Self::B8G8R8A8_SRGB
            | Self::D24_UNORM_S8_UINT
            | Self::D32_SFLOAT => 4,
            Self::R16G16B16A16_SFLOAT => 8,
            Self::R32G32B32A32_SFLOAT => 16,
        }
    }

    pub fn is_depth(self) -> bool {
        matches!(self, Self::D16_UNORM | Self::D24_UNORM_S8_UINT | Self::D32_SFLOAT)
    }

    /// Byte size of a single mip of `width` x `height` texels.
    pub fn image_size(self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_pixel()
    }

    fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            Self::R8_UNORM => wgpu::TextureFormat::R8Unorm,
            Self::R8G8_UNORM => wgpu::TextureFormat::Rg8Unorm,
            Self::R8G8B8A8_UNORM => wgpu::TextureFormat::Rgba8Unorm,
            Self::R8G8B8A8_SRGB => wgpu::TextureFormat::Rgba8UnormSrgb,
            Self::B8G8R8A8_UNORM => wgpu::TextureFormat::Bgra8Unorm,
            Self::B8G8R8A8_SRGB => wgpu::TextureFormat::Bgra8UnormSrgb,
            Self::R16G16B16A16_SFLOAT => wgpu::TextureFormat::Rgba16Float,
            Self::R32G32B32A32_SFLOAT => wgpu::TextureFormat::Rgba32Float,
            Self::D16_UNORM => wgpu::TextureFormat::Depth16Unorm,
            Self::D24_UNORM_S8_UINT => wgpu::TextureFormat::Depth24PlusStencil8,
            Self::D32_SFLOAT => wgpu::TextureFormat::Depth32Float,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        const SAMPLED = 1 << 0;
        const TRANSFER_SRC = 1 << 1;
        const TRANSFER_DST = 1 << 2;
        const COLOR_ATTACHMENT = 1 << 3;
        const DEPTH_STENCIL_ATTACHMENT = 1 << 4;
        const STORAGE = 1 << 5;
    }
}

impl TextureUsage {
    fn to_wgpu(self) -> wgpu::TextureUsages {
        let mut usages = wgpu::TextureUsages::empty();
        if self.contains(Self::SAMPLED) {
            usages |= wgpu::TextureUsages::TEXTURE_BINDING;
        }
        if self.contains(Self::TRANSFER_SRC) {
            usages |= wgpu::TextureUsages::COPY_SRC;
        }
        if self.contains(Self::TRANSFER_DST) {
            usages |= wgpu::TextureUsages::COPY_DST;
        }
        if self.intersects(Self::COLOR_ATTACHMENT | Self::DEPTH_STENCIL_ATTACHMENT) {
            usages |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        if self.contains(Self::STORAGE) {
            usages |= wgpu::TextureUsages::STORAGE_BINDING;
        }
        usages
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureDimension {
    D1,
    D2,
    D3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub dimension: TextureDimension,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub usage: TextureUsage,
}

impl TextureDescriptor {
    /// Single-mip sampled 2D texture that is filled from CPU memory.
    pub fn sampled_2d(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            width,
            height,
            format,
            dimension: TextureDimension::D2,
            mip_levels: 1,
            array_layers: 1,
            usage: TextureUsage::SAMPLED | TextureUsage::TRANSFER_DST,
        }
    }
}

/// Handle to a texture created by a [`GpuDevice`]. Cloning shares the underlying resource.
#[derive(Clone)]
pub struct GpuTexture {
    id: u64,
    descriptor: TextureDescriptor,
    resource: Option<Arc<dyn Any + Send + Sync>>,
}

impl GpuTexture {
    pub fn new(id: u64, descriptor: TextureDescriptor, resource: Option<Arc<dyn Any + Send + Sync>>) -> Self {
        Self { id, descriptor, resource }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    pub fn resource<T: Any>(&self) -> Option<&T> {
        self.resource.as_ref().and_then(|res| res.downcast_ref::<T>())
    }
}

impl fmt::Debug for GpuTexture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuTexture").field("id", &self.id).field("descriptor", &self.descriptor).finish()
    }
}

pub trait GpuDevice: Send + Sync {
    fn create_texture(&self, descriptor: &TextureDescriptor, initial_data: &[u8]) -> Result<GpuTexture>;
    fn destroy_texture(&self, texture: &GpuTexture);
}

fn validate_initial_data(descriptor: &TextureDescriptor, initial_data: &[u8]) -> Result<()> {
    if descriptor.width == 0 || descriptor.height == 0 {
        bail!("texture extent {}x{} is empty", descriptor.width, descriptor.height);
    }
    let expected = descriptor.format.image_size(descriptor.width, descriptor.height);
    if !initial_data.is_empty() && initial_data.len() != expected {
        bail!(
            "initial data is {} bytes, {}x{} {:?} needs {expected}",
            initial_data.len(),
            descriptor.width,
            descriptor.height,
            descriptor.format
        );
    }
    Ok(())
}

/// Device without a GPU; keeps every live texture and its initial bytes in memory.
#[derive(Default)]
pub struct HeadlessDevice {
    next_id: AtomicU64,
    textures: Mutex<HashMap<u64, HeadlessTexture>>,
}

#[derive(Debug, Clone)]
pub struct HeadlessTexture {
    pub descriptor: TextureDescriptor,
    pub data: Vec<u8>,
}

impl HeadlessDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_texture_count(&self) -> usize {
        self.textures.lock().len()
    }

    pub fn texture(&self, id: u64) -> Option<HeadlessTexture> {
        self.textures.lock().get(&id).cloned()
    }
}

impl GpuDevice for HeadlessDevice {
    fn create_texture(&self, descriptor: &TextureDescriptor, initial_data: &[u8]) -> Result<GpuTexture> {
        validate_initial_data(descriptor, initial_data)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.textures.lock().insert(id, HeadlessTexture { descriptor: *descriptor, data: initial_data.to_vec() });
        Ok(GpuTexture::new(id, *descriptor, None))
    }

    fn destroy_texture(&self, texture: &GpuTexture) {
        self.textures.lock().remove(&texture.id());
    }
}

/// wgpu-backed device. The texture resource is a [`WgpuTexture`].
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    next_id: AtomicU64,
}

pub struct WgpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl WgpuDevice {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        Self { device: device.clone(), queue: queue.clone(), next_id: AtomicU64::new(0) }
    }
}

impl GpuDevice for WgpuDevice {
    fn create_texture(&self, descriptor: &TextureDescriptor, initial_data: &[u8]) -> Result<GpuTexture> {
        validate_initial_data(descriptor, initial_data)?;
        let dimension = match descriptor.dimension {
            TextureDimension::D1 => wgpu::TextureDimension::D1,
            TextureDimension::D2 => wgpu::TextureDimension::D2,
            TextureDimension::D3 => wgpu::TextureDimension::D3,
        };
        let size = wgpu::Extent3d {
            width: descriptor.width,
            height: descriptor.height,
            depth_or_array_layers: descriptor.array_layers.max(1),
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Asset Texture"),
            size,
            mip_level_count: descriptor.mip_levels.max(1),
            sample_count: 1,
            dimension,
            format: descriptor.format.to_wgpu(),
            usage: descriptor.usage.to_wgpu(),
            view_formats: &[],
        });
        if !initial_data.is_empty() {
            if descriptor.format.is_depth() {
                return Err(anyhow!("depth format {:?} cannot be filled from CPU data", descriptor.format));
            }
            let bytes_per_row = descriptor.width * descriptor.format.bytes_per_pixel() as u32;
            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                initial_data,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(descriptor.height),
                },
                wgpu::Extent3d { width: descriptor.width, height: descriptor.height, depth_or_array_layers: 1 },
            );
        }
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(GpuTexture::new(id, *descriptor, Some(Arc::new(WgpuTexture { texture, view }))))
    }

    fn destroy_texture(&self, texture: &GpuTexture) {
        if let Some(resource) = texture.resource::<WgpuTexture>() {
            resource.texture.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_tags_round_trip() {
        for value in 1..=11 {
            let format = TextureFormat::from_u32(value).unwrap();
            assert_eq!(format as u32, value);
        }
        assert_eq!(TextureFormat::from_u32(0), None);
        assert_eq!(TextureFormat::R8G8B8A8_UNORM.image_size(2, 3), 24);
        assert_eq!(TextureFormat::R16G16B16A16_SFLOAT.bytes_per_pixel(), 8);
    }

    #[test]
    fn headless_device_tracks_live_textures() {
        let device = HeadlessDevice::new();
        let desc = TextureDescriptor::sampled_2d(1, 1, TextureFormat::R8G8B8A8_UNORM);
        let texture = device.create_texture(&desc, &[1, 2, 3, 4]).unwrap();
        assert_eq!(device.live_texture_count(), 1);
        assert_eq!(device.texture(texture.id()).unwrap().data, vec![1, 2, 3, 4]);
        device.destroy_texture(&texture);
        assert_eq!(device.live_texture_count(), 0);
    }

    #[test]
    fn mismatched_initial_data_is_rejected() {
        let device = HeadlessDevice::new();
        let desc = TextureDescriptor::sampled_2d(2, 2, TextureFormat::R8G8B8A8_UNORM);
        assert!(device.create_texture(&desc, &[0; 15]).is_err());
        assert_eq!(device.live_texture_count(), 0);
    }
}
