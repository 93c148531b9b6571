use crate::asset::{AssetHandle, AssetKind, AssetPayload, LoadContext};
use crate::assets::ImportContext;
use crate::codec::AssetCodec;
use crate::error::{AssetError, AssetResult};
use crate::type_info::TypeDescriptor;
use std::any::Any;
use std::io::{Read, Write};
use std::path::Path;

/// Scene placeholder. It shares the asset envelope and carries no payload bytes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SceneAsset;

crate::asset_type_info!(SceneAsset, "SceneAsset");

impl AssetPayload for SceneAsset {
    fn asset_type(&self) -> TypeDescriptor {
        TypeDescriptor::of::<SceneAsset>()
    }

    fn serialize(&self, _writer: &mut dyn Write) -> AssetResult<()> {
        Ok(())
    }

    fn deserialize(&mut self, _reader: &mut dyn Read, _ctx: &LoadContext<'_>) -> AssetResult<()> {
        Ok(())
    }

    fn clear_asset_data(&mut self) {}

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Scenes are authored, not imported; the codec only maps the asset type to a payload.
#[derive(Default)]
pub struct SceneCodec;

crate::asset_type_info!(SceneCodec, "SceneCodec");

impl AssetCodec for SceneCodec {
    fn descriptor(&self) -> TypeDescriptor {
        TypeDescriptor::of::<SceneCodec>()
    }

    fn asset_type(&self) -> TypeDescriptor {
        TypeDescriptor::of::<SceneAsset>()
    }

    fn extensions(&self) -> Vec<String> {
        Vec::new()
    }

    fn import(&self, source: &Path, _ctx: &ImportContext<'_>) -> AssetResult<AssetHandle> {
        Err(AssetError::InvalidArgument(format!("scenes cannot be imported from '{}'", source.display())))
    }

    fn create_payload(&self) -> AssetKind {
        AssetKind::Scene(SceneAsset)
    }
}
