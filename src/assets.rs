use crate::asset::{read_metadata, Asset, AssetHandle, AssetKind, AssetResolver, LoadContext};
use crate::asset_id::AssetUuid;
use crate::codec::CodecRegistry;
use crate::config::AssetConfig;
use crate::error::{AssetError, AssetResult};
use crate::gpu::GpuDevice;
use crate::metadata::AssetMetadata;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

mod fbx;
pub mod model;
pub mod scene;
pub(crate) mod sources;
pub mod texture;

pub const ASSET_EXTENSION: &str = "chAss";

/// Everything a codec needs to build and save one imported asset.
pub struct ImportContext<'a> {
    name: String,
    asset_path: String,
    file_path: PathBuf,
    device: &'a Arc<dyn GpuDevice>,
    config: &'a AssetConfig,
}

impl<'a> ImportContext<'a> {
    pub fn new(
        name: impl Into<String>,
        asset_path: impl Into<String>,
        file_path: PathBuf,
        device: &'a Arc<dyn GpuDevice>,
        config: &'a AssetConfig,
    ) -> Self {
        Self { name: name.into(), asset_path: asset_path.into(), file_path, device, config }
    }

    /// Unique asset name, also the file stem of the output.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Output path relative to the asset root, `/`-separated.
    pub fn asset_path(&self) -> &str {
        &self.asset_path
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn device(&self) -> &Arc<dyn GpuDevice> {
        self.device
    }

    pub fn config(&self) -> &AssetConfig {
        self.config
    }

    /// Wraps `payload` in a fresh, populated asset at this context's location.
    pub fn create_asset(&self, payload: AssetKind) -> AssetHandle {
        let mut metadata =
            AssetMetadata::new(AssetUuid::new_random(), payload.payload().asset_type(), &self.name, &self.asset_path);
        metadata.set_engine_version(&self.config.engine_version);
        let asset = Asset::new(metadata, self.file_path.clone(), payload);
        asset.mark_populated();
        asset
    }
}

/// Project-level registry of assets under one asset root.
pub struct AssetManager {
    root: PathBuf,
    config: AssetConfig,
    codecs: Arc<CodecRegistry>,
    device: Arc<dyn GpuDevice>,
    assets: RwLock<HashMap<AssetUuid, AssetHandle>>,
    import_lock: Mutex<()>,
}

impl AssetManager {
    pub fn new(config: AssetConfig, codecs: Arc<CodecRegistry>, device: Arc<dyn GpuDevice>) -> Self {
        Self {
            root: config.asset_root.clone(),
            config,
            codecs,
            device,
            assets: RwLock::new(HashMap::new()),
            import_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &AssetConfig {
        &self.config
    }

    pub fn codecs(&self) -> &Arc<CodecRegistry> {
        &self.codecs
    }

    pub fn device(&self) -> &Arc<dyn GpuDevice> {
        &self.device
    }

    /// Imports `source` into `destination` (relative to the asset root). Errors are logged.
    pub fn import_asset(&self, source: impl AsRef<Path>, destination: impl AsRef<Path>) -> Option<AssetHandle> {
        let source = source.as_ref();
        match self.try_import(source, destination.as_ref()) {
            Ok(asset) => Some(asset),
            Err(err) => {
                log::error!(target: "assets", "import of '{}' failed: {err}", source.display());
                None
            }
        }
    }

    pub fn try_import(&self, source: &Path, destination: &Path) -> AssetResult<AssetHandle> {
        if !source.is_file() {
            return Err(AssetError::NotFound(format!("source file '{}'", source.display())));
        }
        let destination = self.relative_destination(destination)?;
        let base = source
            .file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|stem| !stem.is_empty())
            .ok_or_else(|| AssetError::InvalidArgument(format!("'{}' has no usable file name", source.display())))?;

        let _guard = self.import_lock.lock();
        let (name, asset_path, file_path) = self.unique_location(&destination, base);
        let codec = self.codecs.codec_for_path(source).ok_or_else(|| {
            AssetError::NotFound(format!("codec for extension of '{}'", source.display()))
        })?;
        let ctx = ImportContext::new(name, asset_path, file_path, &self.device, &self.config);
        let asset = codec.import(source, &ctx)?;
        log::info!(
            target: "assets",
            "imported '{}' as {} ({})",
            source.display(),
            ctx.asset_path(),
            codec.asset_type().name()
        );
        self.insert(Arc::clone(&asset));
        Ok(asset)
    }

    /// Creates, saves and registers an asset that has no source file, such as a scene.
    pub fn create_asset(&self, name: &str, destination: impl AsRef<Path>, payload: AssetKind) -> AssetResult<AssetHandle> {
        if name.is_empty() {
            return Err(AssetError::InvalidArgument("asset name is empty".to_string()));
        }
        let destination = self.relative_destination(destination.as_ref())?;
        let _guard = self.import_lock.lock();
        let (name, asset_path, file_path) = self.unique_location(&destination, name);
        let ctx = ImportContext::new(name, asset_path, file_path, &self.device, &self.config);
        let asset = ctx.create_asset(payload);
        asset.try_save()?;
        self.insert(Arc::clone(&asset));
        Ok(asset)
    }

    /// Registers an existing asset file without loading its payload.
    pub fn open_asset(&self, path: impl AsRef<Path>) -> AssetResult<AssetHandle> {
        let path = path.as_ref();
        let metadata = read_metadata(path)?;
        if let Some(existing) = self.get(metadata.uuid()) {
            return Ok(existing);
        }
        let codec = self.codecs.codec_for_asset_type(metadata.asset_type()).ok_or_else(|| {
            AssetError::NotFound(format!("codec for asset type '{}' ({})", metadata.type_name(), metadata.asset_type()))
        })?;
        let asset = Asset::on_disk(metadata, path.to_path_buf(), codec.create_payload());
        self.insert(Arc::clone(&asset));
        Ok(asset)
    }

    /// Registers every asset file under the root. Returns the number of newly registered assets.
    pub fn scan(&self) -> usize {
        let mut registered = 0;
        for entry in WalkDir::new(&self.root).sort_by_file_name().into_iter().filter_map(|entry| entry.ok()) {
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().and_then(|ext| ext.to_str()) != Some(ASSET_EXTENSION) {
                continue;
            }
            let known = self.assets.read().values().any(|asset| asset.file_path() == path);
            if known {
                continue;
            }
            match self.open_asset(path) {
                Ok(_) => registered += 1,
                Err(err) => log::warn!(target: "assets", "skipping '{}': {err}", path.display()),
            }
        }
        log::debug!(target: "assets", "scan of '{}' registered {registered} assets", self.root.display());
        registered
    }

    pub fn get(&self, uuid: AssetUuid) -> Option<AssetHandle> {
        self.assets.read().get(&uuid).cloned()
    }

    pub fn find_by_name(&self, name: &str) -> Option<AssetHandle> {
        self.assets.read().values().find(|asset| asset.name() == name).cloned()
    }

    pub fn assets(&self) -> Vec<AssetHandle> {
        let mut assets: Vec<AssetHandle> = self.assets.read().values().cloned().collect();
        assets.sort_by_key(|asset| asset.metadata().asset_path());
        assets
    }

    pub fn len(&self) -> usize {
        self.assets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.read().is_empty()
    }

    pub fn load(&self, asset: &Asset) -> bool {
        let ctx = LoadContext { resolver: self, device: &self.device };
        asset.load(&ctx)
    }

    pub fn load_by_id(&self, uuid: AssetUuid) -> Option<AssetHandle> {
        let asset = self.get(uuid)?;
        self.load(&asset).then_some(asset)
    }

    pub fn unload(&self, asset: &Asset) -> bool {
        asset.unload()
    }

    pub fn save(&self, asset: &Asset) -> bool {
        asset.save()
    }

    /// Forgets an asset; its file stays on disk.
    pub fn remove(&self, uuid: AssetUuid) -> Option<AssetHandle> {
        self.assets.write().remove(&uuid)
    }

    /// Unloads every loaded asset whose advisory ref count is zero.
    pub fn unload_unused(&self) -> usize {
        let candidates: Vec<AssetHandle> = self
            .assets
            .read()
            .values()
            .filter(|asset| asset.is_loaded() && asset.ref_count() == 0)
            .cloned()
            .collect();
        candidates.iter().filter(|asset| asset.unload()).count()
    }

    fn insert(&self, asset: AssetHandle) {
        self.assets.write().insert(asset.uuid(), asset);
    }

    fn relative_destination(&self, destination: &Path) -> AssetResult<PathBuf> {
        let relative = if destination.is_absolute() {
            destination.strip_prefix(&self.root).map(Path::to_path_buf).map_err(|_| {
                AssetError::InvalidArgument(format!(
                    "destination '{}' is outside the asset root '{}'",
                    destination.display(),
                    self.root.display()
                ))
            })?
        } else {
            destination.to_path_buf()
        };
        if !relative.components().all(|component| matches!(component, Component::Normal(_) | Component::CurDir)) {
            return Err(AssetError::InvalidArgument(format!(
                "destination '{}' is not relative to the asset root",
                destination.display()
            )));
        }
        Ok(relative)
    }

    /// First free `base.chAss`, `base_1.chAss`, `base_2.chAss`, ... in `destination`.
    fn unique_location(&self, destination: &Path, base: &str) -> (String, String, PathBuf) {
        let dir = self.root.join(destination);
        let live_paths: Vec<PathBuf> = self.assets.read().values().map(|asset| asset.file_path()).collect();
        let mut suffix = 0usize;
        loop {
            let name = if suffix == 0 { base.to_string() } else { format!("{base}_{suffix}") };
            let file_name = format!("{name}.{ASSET_EXTENSION}");
            let file_path = dir.join(&file_name);
            if !file_path.exists() && !live_paths.contains(&file_path) {
                let asset_path = relative_asset_path(destination, &file_name);
                return (name, asset_path, file_path);
            }
            suffix += 1;
        }
    }
}

impl AssetResolver for AssetManager {
    fn resolve(&self, uuid: AssetUuid) -> Option<AssetHandle> {
        self.get(uuid)
    }
}

fn relative_asset_path(destination: &Path, file_name: &str) -> String {
    let mut parts: Vec<String> = destination
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    parts.push(file_name.to_string());
    parts.join("/")
}
