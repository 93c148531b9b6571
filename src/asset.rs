use crate::asset_id::AssetUuid;
use crate::assets::model::ModelAsset;
use crate::assets::scene::SceneAsset;
use crate::assets::texture::TextureAsset;
use crate::binary::{read_pod, read_u32, write_pod, write_u32};
use crate::error::{AssetError, AssetResult};
use crate::gpu::GpuDevice;
use crate::metadata::AssetMetadata;
use crate::type_info::TypeDescriptor;
use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::any::Any;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

pub type AssetHandle = Arc<Asset>;
pub type WeakAssetHandle = Weak<Asset>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AssetState {
    /// Built in memory and never loaded from disk.
    None = 0,
    Loading = 1,
    Loaded = 2,
    Unloading = 3,
    Unloaded = 4,
    Failed = 5,
}

impl AssetState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::None,
            1 => Self::Loading,
            2 => Self::Loaded,
            3 => Self::Unloading,
            4 => Self::Unloaded,
            5 => Self::Failed,
            other => panic!("asset state byte {other} is corrupt"),
        }
    }

    pub fn can_transition_to(self, next: AssetState) -> bool {
        use AssetState::*;
        matches!(
            (self, next),
            (None, Loading)
                | (None, Loaded)
                | (None, Unloading)
                | (Unloaded, Loading)
                | (Loading, Loaded)
                | (Loading, Failed)
                | (Loaded, Unloading)
                | (Failed, Unloading)
                | (Unloading, Unloaded)
        )
    }
}

/// Type-specific half of an asset: the payload that follows the envelope on disk.
pub trait AssetPayload: Any + Send + Sync {
    fn asset_type(&self) -> TypeDescriptor;
    fn serialize(&self, writer: &mut dyn Write) -> AssetResult<()>;
    fn deserialize(&mut self, reader: &mut dyn Read, ctx: &LoadContext<'_>) -> AssetResult<()>;
    /// Drops CPU-side data and any GPU resources the payload owns.
    fn clear_asset_data(&mut self);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

pub enum AssetKind {
    Texture(TextureAsset),
    Model(ModelAsset),
    Scene(SceneAsset),
    Custom(Box<dyn AssetPayload>),
}

impl AssetKind {
    pub fn payload(&self) -> &dyn AssetPayload {
        match self {
            Self::Texture(texture) => texture,
            Self::Model(model) => model,
            Self::Scene(scene) => scene,
            Self::Custom(custom) => custom.as_ref(),
        }
    }

    pub fn payload_mut(&mut self) -> &mut dyn AssetPayload {
        match self {
            Self::Texture(texture) => texture,
            Self::Model(model) => model,
            Self::Scene(scene) => scene,
            Self::Custom(custom) => custom.as_mut(),
        }
    }

    pub fn as_texture(&self) -> Option<&TextureAsset> {
        match self {
            Self::Texture(texture) => Some(texture),
            _ => None,
        }
    }

    pub fn as_texture_mut(&mut self) -> Option<&mut TextureAsset> {
        match self {
            Self::Texture(texture) => Some(texture),
            _ => None,
        }
    }

    pub fn as_model(&self) -> Option<&ModelAsset> {
        match self {
            Self::Model(model) => Some(model),
            _ => None,
        }
    }

    pub fn as_model_mut(&mut self) -> Option<&mut ModelAsset> {
        match self {
            Self::Model(model) => Some(model),
            _ => None,
        }
    }

    pub fn as_custom<T: AssetPayload>(&self) -> Option<&T> {
        match self {
            Self::Custom(custom) => custom.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }
}

pub trait AssetResolver {
    fn resolve(&self, uuid: AssetUuid) -> Option<AssetHandle>;
}

pub struct LoadContext<'a> {
    pub resolver: &'a dyn AssetResolver,
    pub device: &'a Arc<dyn GpuDevice>,
}

struct AssetHeader {
    metadata: AssetMetadata,
    references: Vec<AssetUuid>,
    file_path: PathBuf,
}

/// Shared asset record: envelope data, lifecycle state, advisory ref count and payload.
///
/// The state lives outside the locks so a recursive load can observe `Loading` on an asset
/// further up the reference chain without blocking on it.
pub struct Asset {
    header: RwLock<AssetHeader>,
    state: AtomicU8,
    ref_count: AtomicU32,
    payload: RwLock<AssetKind>,
}

impl std::fmt::Debug for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Asset").field("file_path", &self.header.read().file_path).finish_non_exhaustive()
    }
}

impl Asset {
    /// An asset populated in memory (state `None`), typically by an importer.
    pub fn new(metadata: AssetMetadata, file_path: PathBuf, payload: AssetKind) -> AssetHandle {
        Self::with_state(metadata, file_path, payload, AssetState::None)
    }

    /// An asset known from its file on disk; its payload is empty until [`Asset::load`].
    pub fn on_disk(metadata: AssetMetadata, file_path: PathBuf, payload: AssetKind) -> AssetHandle {
        Self::with_state(metadata, file_path, payload, AssetState::Unloaded)
    }

    fn with_state(metadata: AssetMetadata, file_path: PathBuf, payload: AssetKind, state: AssetState) -> AssetHandle {
        Arc::new(Self {
            header: RwLock::new(AssetHeader { metadata, references: Vec::new(), file_path }),
            state: AtomicU8::new(state as u8),
            ref_count: AtomicU32::new(0),
            payload: RwLock::new(payload),
        })
    }

    pub fn uuid(&self) -> AssetUuid {
        self.header.read().metadata.uuid()
    }

    pub fn name(&self) -> String {
        self.header.read().metadata.name()
    }

    pub fn asset_type(&self) -> AssetUuid {
        self.header.read().metadata.asset_type()
    }

    pub fn metadata(&self) -> AssetMetadata {
        self.header.read().metadata
    }

    pub fn file_path(&self) -> PathBuf {
        self.header.read().file_path.clone()
    }

    pub fn set_original_path(&self, path: &Path) {
        self.header.write().metadata.set_original_path(&path.to_string_lossy());
    }

    pub fn references(&self) -> Vec<AssetUuid> {
        self.header.read().references.clone()
    }

    pub fn add_reference(&self, uuid: AssetUuid) {
        let mut header = self.header.write();
        if !header.references.contains(&uuid) {
            header.references.push(uuid);
        }
    }

    pub fn remove_reference(&self, uuid: AssetUuid) -> bool {
        let mut header = self.header.write();
        let before = header.references.len();
        header.references.retain(|r| *r != uuid);
        header.references.len() != before
    }

    pub fn state(&self) -> AssetState {
        AssetState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.state(), AssetState::Loaded | AssetState::None)
    }

    pub fn is_failed(&self) -> bool {
        self.state() == AssetState::Failed
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count.load(Ordering::Acquire)
    }

    pub fn acquire(&self) -> u32 {
        self.ref_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrements the advisory count; returns `false` if it was already zero.
    pub fn release(&self) -> bool {
        self.ref_count.fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| count.checked_sub(1)).is_ok()
    }

    pub fn payload(&self) -> RwLockReadGuard<'_, AssetKind> {
        self.payload.read()
    }

    pub fn payload_mut(&self) -> RwLockWriteGuard<'_, AssetKind> {
        self.payload.write()
    }

    pub fn texture(&self) -> Option<MappedRwLockReadGuard<'_, TextureAsset>> {
        RwLockReadGuard::try_map(self.payload.read(), |kind| kind.as_texture()).ok()
    }

    pub fn texture_mut(&self) -> Option<MappedRwLockWriteGuard<'_, TextureAsset>> {
        RwLockWriteGuard::try_map(self.payload.write(), |kind| kind.as_texture_mut()).ok()
    }

    pub fn model(&self) -> Option<MappedRwLockReadGuard<'_, ModelAsset>> {
        RwLockReadGuard::try_map(self.payload.read(), |kind| kind.as_model()).ok()
    }

    pub fn model_mut(&self) -> Option<MappedRwLockWriteGuard<'_, ModelAsset>> {
        RwLockWriteGuard::try_map(self.payload.write(), |kind| kind.as_model_mut()).ok()
    }

    /// Marks an importer-built asset as holding live data.
    pub fn mark_populated(&self) {
        self.transition(AssetState::None, AssetState::Loaded);
    }

    /// Moves `from -> to`, aborting on a transition the lifecycle does not allow.
    fn transition(&self, from: AssetState, to: AssetState) {
        assert!(from.can_transition_to(to), "illegal asset state transition {from:?} -> {to:?}");
        if let Err(actual) = self.state.compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
        {
            panic!("illegal asset state transition {:?} -> {to:?}", AssetState::from_u8(actual));
        }
    }

    pub fn save(&self) -> bool {
        match self.try_save() {
            Ok(()) => true,
            Err(err) => {
                log::error!(target: "assets", "failed to save asset '{}': {err}", self.name());
                false
            }
        }
    }

    pub fn try_save(&self) -> AssetResult<()> {
        let state = self.state();
        if !matches!(state, AssetState::None | AssetState::Loaded) {
            return Err(AssetError::InvalidArgument(format!(
                "asset '{}' holds no data to save (state {state:?})",
                self.name()
            )));
        }
        let (metadata, references, path) = {
            let mut header = self.header.write();
            header.metadata.validate()?;
            header.metadata.stamp_creation_time();
            (header.metadata, header.references.clone(), header.file_path.clone())
        };
        let mut bytes = Vec::new();
        write_pod(&mut bytes, &metadata)?;
        write_u32(&mut bytes, references.len() as u32)?;
        for reference in &references {
            bytes.write_all(&reference.to_bytes())?;
        }
        self.payload.read().payload().serialize(&mut bytes)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        replace_file(&path, &bytes)?;
        log::debug!(target: "assets", "saved '{}' to {}", metadata.name(), path.display());
        Ok(())
    }

    /// Loads the asset and, first, every asset it references.
    ///
    /// Returns immediately for assets that are loaded or already loading; a failed asset stays
    /// failed until [`Asset::unload`] is called.
    pub fn load(&self, ctx: &LoadContext<'_>) -> bool {
        loop {
            let current = self.state();
            match current {
                AssetState::Loaded | AssetState::Loading => return true,
                AssetState::Failed => {
                    log::warn!(target: "assets", "asset '{}' previously failed; unload it before retrying", self.name());
                    return false;
                }
                AssetState::Unloading => return false,
                AssetState::None | AssetState::Unloaded => {}
            }
            if self
                .state
                .compare_exchange(current as u8, AssetState::Loading as u8, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }
        match self.load_from_disk(ctx) {
            Ok(()) => {
                self.transition(AssetState::Loading, AssetState::Loaded);
                true
            }
            Err(err) => {
                log::error!(target: "assets", "failed to load '{}': {err}", self.file_path().display());
                self.transition(AssetState::Loading, AssetState::Failed);
                false
            }
        }
    }

    fn load_from_disk(&self, ctx: &LoadContext<'_>) -> AssetResult<()> {
        let path = self.file_path();
        let mut reader = BufReader::new(File::open(&path)?);
        let metadata: AssetMetadata = read_pod(&mut reader)?;
        metadata.validate()?;
        let expected = self.metadata();
        if metadata.uuid() != expected.uuid() {
            return Err(AssetError::FormatMismatch(format!(
                "file holds asset {} but {} was expected",
                metadata.uuid(),
                expected.uuid()
            )));
        }
        let payload_type = self.payload.read().payload().asset_type();
        if metadata.asset_type() != payload_type.id() {
            return Err(AssetError::FormatMismatch(format!(
                "file holds a '{}' asset, payload is '{}'",
                metadata.type_name(),
                payload_type.name()
            )));
        }

        let count = read_u32(&mut reader)? as usize;
        let mut references = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            references.push(AssetUuid::from_bytes(read_pod::<[u8; 16]>(&mut reader)?));
        }
        {
            let mut header = self.header.write();
            header.metadata = metadata;
            header.references = references.clone();
        }

        for uuid in references {
            let dependency = ctx
                .resolver
                .resolve(uuid)
                .ok_or_else(|| AssetError::NotFound(format!("referenced asset {uuid}")))?;
            if !dependency.load(ctx) {
                log::warn!(target: "assets", "referenced asset {uuid} of '{}' failed to load", metadata.name());
            }
        }

        self.payload.write().payload_mut().deserialize(&mut reader, ctx)
    }

    /// Releases payload data and the reference list. Idempotent once unloaded.
    pub fn unload(&self) -> bool {
        loop {
            let current = self.state();
            match current {
                AssetState::Unloaded | AssetState::Unloading => return true,
                AssetState::Loading => {
                    log::warn!(target: "assets", "asset '{}' is loading and cannot be unloaded", self.name());
                    return false;
                }
                AssetState::None | AssetState::Loaded | AssetState::Failed => {}
            }
            if self
                .state
                .compare_exchange(current as u8, AssetState::Unloading as u8, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }
        self.payload.write().payload_mut().clear_asset_data();
        self.header.write().references.clear();
        self.transition(AssetState::Unloading, AssetState::Unloaded);
        true
    }
}

/// Writes `bytes` next to `path` and renames the result over it, so a failed write never
/// leaves a partial asset file behind.
fn replace_file(path: &Path, bytes: &[u8]) -> AssetResult<()> {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".tmp");
    let staging = PathBuf::from(staging);
    let written = File::create(&staging).and_then(|file| {
        let mut writer = BufWriter::new(file);
        writer.write_all(bytes)?;
        writer.into_inner().map_err(|err| err.into_error())?.sync_all()
    });
    if let Err(err) = written.and_then(|()| fs::rename(&staging, path)) {
        let _ = fs::remove_file(&staging);
        return Err(err.into());
    }
    Ok(())
}

/// Reads only the metadata record at the start of an asset file.
pub fn read_metadata(path: &Path) -> AssetResult<AssetMetadata> {
    let mut reader = BufReader::new(File::open(path)?);
    let metadata: AssetMetadata = read_pod(&mut reader)?;
    metadata.validate()?;
    Ok(metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATES: [AssetState; 6] = [
        AssetState::None,
        AssetState::Loading,
        AssetState::Loaded,
        AssetState::Unloading,
        AssetState::Unloaded,
        AssetState::Failed,
    ];

    #[test]
    fn only_lifecycle_edges_are_legal() {
        let legal = [
            (AssetState::Unloaded, AssetState::Loading),
            (AssetState::Loading, AssetState::Loaded),
            (AssetState::Loading, AssetState::Failed),
            (AssetState::Loaded, AssetState::Unloading),
            (AssetState::Unloading, AssetState::Unloaded),
            (AssetState::Failed, AssetState::Unloading),
            (AssetState::None, AssetState::Loading),
            (AssetState::None, AssetState::Loaded),
            (AssetState::None, AssetState::Unloading),
        ];
        for from in STATES {
            for to in STATES {
                assert_eq!(from.can_transition_to(to), legal.contains(&(from, to)), "{from:?} -> {to:?}");
            }
        }
    }

    #[test]
    fn state_bytes_round_trip() {
        for state in STATES {
            assert_eq!(AssetState::from_u8(state as u8), state);
        }
    }
}
