pub mod asset;
pub mod asset_id;
pub mod assets;
pub mod binary;
pub mod codec;
pub mod compression;
pub mod config;
pub mod error;
pub mod gpu;
pub mod mesh;
pub mod metadata;
pub mod model;
pub mod plugins;
pub mod system;
pub mod type_info;

pub use asset::{Asset, AssetHandle, AssetKind, AssetPayload, AssetResolver, AssetState, LoadContext};
pub use asset_id::AssetUuid;
pub use assets::{AssetManager, ImportContext};
pub use codec::{AssetCodec, CodecRegistry};
pub use config::AssetConfig;
pub use error::{AssetError, AssetResult};
pub use metadata::AssetMetadata;
pub use system::{AssetSystem, AssetSystemBuilder};
pub use type_info::{TypeDescriptor, TypeInfo};
