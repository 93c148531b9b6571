use crate::asset_id::AssetUuid;
use crate::error::{AssetError, AssetResult};
use crate::type_info::TypeDescriptor;
use bytemuck::{Pod, Zeroable};
use std::path::{Component, Path};
use std::time::{SystemTime, UNIX_EPOCH};

pub const TYPE_NAME_LEN: usize = 32;
pub const ENGINE_VERSION_LEN: usize = 16;
pub const NAME_LEN: usize = 64;
pub const PATH_LEN: usize = 256;

/// On-disk description of one asset. Layout is fixed; strings are NUL-padded.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct AssetMetadata {
    uuid: [u8; 16],
    asset_type: [u8; 16],
    creation_time: u64,
    type_name: [u8; TYPE_NAME_LEN],
    engine_version: [u8; ENGINE_VERSION_LEN],
    name: [u8; NAME_LEN],
    original_path: [u8; PATH_LEN],
    asset_path: [u8; PATH_LEN],
}

pub const METADATA_SIZE: usize = std::mem::size_of::<AssetMetadata>();

const _: () = assert!(METADATA_SIZE == 664);
const _: () = assert!(METADATA_SIZE % 8 == 0);

impl AssetMetadata {
    pub fn new(uuid: AssetUuid, asset_type: TypeDescriptor, name: &str, asset_path: &str) -> Self {
        let mut metadata = Self::zeroed();
        metadata.uuid = uuid.to_bytes();
        metadata.asset_type = asset_type.id().to_bytes();
        write_fixed(&mut metadata.type_name, asset_type.name());
        write_fixed(&mut metadata.engine_version, env!("CARGO_PKG_VERSION"));
        write_fixed(&mut metadata.name, name);
        write_fixed(&mut metadata.asset_path, asset_path);
        metadata
    }

    pub fn uuid(&self) -> AssetUuid {
        AssetUuid::from_bytes(self.uuid)
    }

    pub fn asset_type(&self) -> AssetUuid {
        AssetUuid::from_bytes(self.asset_type)
    }

    pub fn creation_time(&self) -> u64 {
        self.creation_time
    }

    pub fn type_name(&self) -> String {
        read_fixed(&self.type_name)
    }

    pub fn engine_version(&self) -> String {
        read_fixed(&self.engine_version)
    }

    pub fn name(&self) -> String {
        read_fixed(&self.name)
    }

    pub fn original_path(&self) -> String {
        read_fixed(&self.original_path)
    }

    pub fn asset_path(&self) -> String {
        read_fixed(&self.asset_path)
    }

    pub fn set_engine_version(&mut self, version: &str) {
        write_fixed(&mut self.engine_version, version);
    }

    pub fn set_name(&mut self, name: &str) {
        write_fixed(&mut self.name, name);
    }

    pub fn set_original_path(&mut self, path: &str) {
        if path.len() >= PATH_LEN {
            log::warn!(target: "assets", "original path '{path}' exceeds {} bytes and was truncated", PATH_LEN - 1);
        }
        write_fixed(&mut self.original_path, path);
    }

    pub fn set_asset_path(&mut self, path: &str) {
        write_fixed(&mut self.asset_path, path);
    }

    /// Stamps the creation time on first save only.
    pub fn stamp_creation_time(&mut self) {
        if self.creation_time == 0 {
            self.creation_time = epoch_ticks();
        }
    }

    pub fn validate(&self) -> AssetResult<()> {
        if self.uuid().is_null() {
            return Err(AssetError::InvalidArgument("asset uuid is null".to_string()));
        }
        if self.name().is_empty() {
            return Err(AssetError::InvalidArgument(format!("asset {} has an empty name", self.uuid())));
        }
        let asset_path = self.asset_path();
        if !is_resolvable_asset_path(&asset_path) {
            return Err(AssetError::InvalidArgument(format!(
                "asset {} has unresolvable asset path '{asset_path}'",
                self.uuid()
            )));
        }
        Ok(())
    }
}

impl PartialEq for AssetMetadata {
    fn eq(&self, other: &Self) -> bool {
        bytemuck::bytes_of(self) == bytemuck::bytes_of(other)
    }
}

impl Eq for AssetMetadata {}

impl std::fmt::Debug for AssetMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetMetadata")
            .field("uuid", &self.uuid())
            .field("asset_type", &self.asset_type())
            .field("type_name", &self.type_name())
            .field("name", &self.name())
            .field("asset_path", &self.asset_path())
            .finish()
    }
}

/// True for a non-empty relative path that stays under the asset root.
pub fn is_resolvable_asset_path(path: &str) -> bool {
    if path.is_empty() {
        return false;
    }
    Path::new(path).components().all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

/// 100ns ticks since the unix epoch.
pub fn epoch_ticks() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| (d.as_nanos() / 100) as u64).unwrap_or(0)
}

/// Copies `value` into `field`, truncating on a char boundary so a terminating NUL always fits.
fn write_fixed(field: &mut [u8], value: &str) {
    field.fill(0);
    let mut end = value.len().min(field.len() - 1);
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    field[..end].copy_from_slice(&value.as_bytes()[..end]);
}

fn read_fixed(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}
