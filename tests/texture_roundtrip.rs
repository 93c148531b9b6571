use chasset::assets::texture::TextureAsset;
use chasset::gpu::{GpuDevice, HeadlessDevice, TextureFormat};
use chasset::metadata::METADATA_SIZE;
use chasset::type_info::type_id;
use chasset::{AssetConfig, AssetState, AssetSystem};
use image::{Rgba, RgbaImage};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

const PIXELS: [[u8; 4]; 4] = [[255, 0, 0, 255], [0, 255, 0, 255], [0, 0, 255, 255], [255, 255, 255, 255]];

fn write_checker(path: &Path) {
    let mut img = RgbaImage::new(2, 2);
    for (i, px) in PIXELS.iter().enumerate() {
        img.put_pixel((i % 2) as u32, (i / 2) as u32, Rgba(*px));
    }
    img.save(path).expect("png written");
}

fn system(root: &Path, device: &Arc<HeadlessDevice>) -> AssetSystem {
    let device: Arc<dyn GpuDevice> = device.clone();
    AssetSystem::builder(AssetConfig::with_root(root)).with_device(device).build().expect("asset system")
}

#[test]
fn imported_texture_survives_save_and_load() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("assets");
    let source = dir.path().join("checker.png");
    write_checker(&source);
    let expected: Vec<u8> = PIXELS.iter().flatten().copied().collect();

    let first_device = Arc::new(HeadlessDevice::new());
    let (uuid, saved_metadata) = {
        let system = system(&root, &first_device);
        let asset = system.manager().import_asset(&source, "textures").expect("import succeeds");
        assert_eq!(asset.state(), AssetState::Loaded);
        assert_eq!(asset.asset_type(), type_id::<TextureAsset>());
        assert_eq!(asset.metadata().original_path(), source.to_string_lossy());
        assert_eq!(asset.metadata().asset_path(), "textures/checker.chAss");

        let texture = asset.texture().expect("texture payload");
        assert_eq!((texture.width(), texture.height()), (2, 2));
        assert_eq!(texture.pixels(), expected.as_slice());
        let gpu = texture.gpu_texture().expect("materialized");
        assert_eq!(first_device.texture(gpu.id()).unwrap().data, expected);
        (asset.uuid(), asset.metadata())
    };
    assert_eq!(first_device.live_texture_count(), 0);

    let file = root.join("textures").join("checker.chAss");
    assert_eq!(fs::metadata(&file).unwrap().len() as usize, METADATA_SIZE + 4 + 12 + expected.len());

    let device = Arc::new(HeadlessDevice::new());
    let system = system(&root, &device);
    assert_eq!(system.manager().scan(), 1);
    let asset = system.manager().get(uuid).expect("registered by scan");
    assert_eq!(asset.state(), AssetState::Unloaded);
    assert!(system.manager().load(&asset));
    assert_eq!(asset.state(), AssetState::Loaded);
    assert_eq!(asset.metadata(), saved_metadata);

    let texture = asset.texture().unwrap();
    assert_eq!(texture.format(), TextureFormat::R8G8B8A8_UNORM);
    assert_eq!(texture.pixels(), expected.as_slice());
    let gpu = texture.gpu_texture().unwrap();
    let descriptor = gpu.descriptor();
    assert_eq!((descriptor.width, descriptor.height), (2, 2));
    assert_eq!(descriptor.format, TextureFormat::R8G8B8A8_UNORM);
    assert_eq!(descriptor.mip_levels, 1);
    assert_eq!(device.texture(gpu.id()).unwrap().data, expected);
    drop(texture);

    assert!(asset.unload());
    assert_eq!(asset.state(), AssetState::Unloaded);
    assert_eq!(device.live_texture_count(), 0);
    assert!(asset.texture().unwrap().pixels().is_empty());
    assert!(system.manager().load(&asset));
    assert_eq!(asset.texture().unwrap().pixels(), expected.as_slice());
}

#[test]
fn truncated_pixels_fail_the_load() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("assets");
    let source = dir.path().join("checker.png");
    write_checker(&source);
    let device = Arc::new(HeadlessDevice::new());

    let uuid = system(&root, &device).manager().import_asset(&source, "").unwrap().uuid();
    let file = root.join("checker.chAss");
    let bytes = fs::read(&file).unwrap();
    fs::write(&file, &bytes[..bytes.len() - 1]).unwrap();

    let system = system(&root, &device);
    system.manager().scan();
    let asset = system.manager().get(uuid).unwrap();
    assert!(!system.manager().load(&asset));
    assert!(asset.is_failed());
    assert_eq!(device.live_texture_count(), 0);

    fs::write(&file, &bytes).unwrap();
    assert!(!system.manager().load(&asset), "failed assets stay failed until unloaded");
    assert!(asset.unload());
    assert!(system.manager().load(&asset));
    assert_eq!(device.live_texture_count(), 1);
}

#[test]
fn undecodable_images_are_rejected() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("broken.png");
    fs::write(&source, b"definitely not a png").unwrap();
    let device = Arc::new(HeadlessDevice::new());
    let system = system(&dir.path().join("assets"), &device);
    assert!(system.manager().import_asset(&source, "").is_none());
    assert!(system.manager().is_empty());
    assert!(!dir.path().join("assets").join("broken.chAss").exists());
}

#[test]
fn compressed_textures_are_smaller_and_reload() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("assets");
    let source = dir.path().join("sky.png");
    RgbaImage::from_pixel(32, 32, Rgba([40, 90, 200, 255])).save(&source).unwrap();

    let device = Arc::new(HeadlessDevice::new());
    let config = AssetConfig { compress_payloads: true, ..AssetConfig::with_root(&root) };
    let uuid = {
        let dyn_device: Arc<dyn GpuDevice> = device.clone();
        let system = AssetSystem::builder(config).with_device(dyn_device).build().unwrap();
        let asset = system.manager().import_asset(&source, "").expect("import succeeds");
        assert!(asset.texture().unwrap().is_compressed());
        asset.uuid()
    };
    let file = root.join("sky.chAss");
    let len = fs::metadata(&file).unwrap().len() as usize;
    assert!(len < METADATA_SIZE + 4 + 12 + 32 * 32 * 4 / 8, "{len} bytes on disk");

    let system = system(&root, &device);
    system.manager().scan();
    let asset = system.manager().load_by_id(uuid).expect("compressed texture loads");
    let texture = asset.texture().unwrap();
    assert!(texture.is_compressed());
    assert_eq!((texture.width(), texture.height()), (32, 32));
    assert!(texture.pixels().chunks_exact(4).all(|px| px == [40, 90, 200, 255]));
    drop(texture);

    assert!(asset.try_save().is_ok());
    assert_eq!(fs::metadata(&file).unwrap().len() as usize, len);
}
