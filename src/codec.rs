use crate::asset::{AssetHandle, AssetKind};
use crate::asset_id::AssetUuid;
use crate::assets::ImportContext;
use crate::error::{AssetError, AssetResult};
use crate::type_info::TypeDescriptor;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

/// Turns source files of a family of extensions into assets of one type.
pub trait AssetCodec: Send + Sync {
    /// Identity of the codec class itself; keys the registry.
    fn descriptor(&self) -> TypeDescriptor;

    /// Type of the assets this codec produces.
    fn asset_type(&self) -> TypeDescriptor;

    fn extensions(&self) -> Vec<String>;

    /// Builds a populated asset from `source` and saves it to the location in `ctx`.
    fn import(&self, source: &Path, ctx: &ImportContext<'_>) -> AssetResult<AssetHandle>;

    /// Empty payload for an asset of [`AssetCodec::asset_type`] that is about to be loaded.
    fn create_payload(&self) -> AssetKind;
}

/// Lower-case ASCII with any leading `*` or `.` removed.
pub fn normalize_extension(ext: &str) -> String {
    ext.trim_start_matches(['*', '.']).to_ascii_lowercase()
}

/// Codec lookup by extension, codec type and produced asset type.
///
/// Filled during start-up and read-only afterwards; share it as `Arc<CodecRegistry>` once frozen.
#[derive(Default)]
pub struct CodecRegistry {
    codecs: BTreeMap<AssetUuid, Arc<dyn AssetCodec>>,
    by_extension: HashMap<String, AssetUuid>,
    by_asset_type: HashMap<AssetUuid, AssetUuid>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<C: AssetCodec + Default + 'static>(&mut self) -> AssetResult<AssetUuid> {
        self.register_codec(Box::new(C::default()))
    }

    /// Adds a codec. Extensions already claimed by another codec move to this one.
    pub fn register_codec(&mut self, codec: Box<dyn AssetCodec>) -> AssetResult<AssetUuid> {
        let descriptor = codec.descriptor();
        if !descriptor.is_known() {
            return Err(AssetError::InvalidArgument(format!(
                "codec '{}' has no type identity",
                descriptor.name()
            )));
        }
        let id = descriptor.id();
        let codec: Arc<dyn AssetCodec> = Arc::from(codec);
        if self.codecs.contains_key(&id) {
            log::warn!(target: "codec", "codec '{}' registered twice; replacing", descriptor.name());
            self.forget(id);
        }
        for ext in codec.extensions() {
            let ext = normalize_extension(&ext);
            if ext.is_empty() {
                continue;
            }
            if let Some(previous) = self.by_extension.insert(ext.clone(), id) {
                if previous != id {
                    log::debug!(target: "codec", "extension '{ext}' now handled by '{}'", descriptor.name());
                }
            }
        }
        self.by_asset_type.insert(codec.asset_type().id(), id);
        self.codecs.insert(id, codec);
        log::info!(target: "codec", "registered codec '{}'", descriptor.name());
        Ok(id)
    }

    pub fn unregister(&mut self, codec_id: AssetUuid) -> bool {
        if !self.codecs.contains_key(&codec_id) {
            return false;
        }
        self.forget(codec_id);
        true
    }

    fn forget(&mut self, codec_id: AssetUuid) {
        self.codecs.remove(&codec_id);
        self.by_extension.retain(|_, id| *id != codec_id);
        self.by_asset_type.retain(|_, id| *id != codec_id);
    }

    pub fn codec_for_extension(&self, ext: &str) -> Option<Arc<dyn AssetCodec>> {
        let id = self.by_extension.get(&normalize_extension(ext))?;
        self.codecs.get(id).cloned()
    }

    pub fn codec_for_path(&self, path: &Path) -> Option<Arc<dyn AssetCodec>> {
        let ext = path.extension()?.to_str()?;
        self.codec_for_extension(ext)
    }

    pub fn codec_for_type(&self, codec_id: AssetUuid) -> Option<Arc<dyn AssetCodec>> {
        self.codecs.get(&codec_id).cloned()
    }

    pub fn codec_for_asset_type(&self, asset_type: AssetUuid) -> Option<Arc<dyn AssetCodec>> {
        let id = self.by_asset_type.get(&asset_type)?;
        self.codecs.get(id).cloned()
    }

    /// Every codec, ordered by codec type id.
    pub fn all_codecs(&self) -> Vec<Arc<dyn AssetCodec>> {
        self.codecs.values().cloned().collect()
    }

    pub fn codec_ids(&self) -> Vec<AssetUuid> {
        self.codecs.keys().copied().collect()
    }

    /// Registered extensions, sorted.
    pub fn extensions(&self) -> Vec<String> {
        let mut extensions: Vec<String> = self.by_extension.keys().cloned().collect();
        extensions.sort();
        extensions
    }

    pub fn len(&self) -> usize {
        self.codecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codecs.is_empty()
    }
}
