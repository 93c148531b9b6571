use chasset::asset::{AssetHandle, AssetKind, AssetPayload, LoadContext};
use chasset::assets::model::ModelAsset;
use chasset::assets::scene::SceneAsset;
use chasset::assets::texture::TextureAsset;
use chasset::binary::{read_bytes, read_u32, write_u32};
use chasset::plugins::{library_file_name, PluginLoader};
use chasset::system::register_builtin_codecs;
use chasset::type_info::{type_id, TypeDescriptor};
use chasset::{
    AssetCodec, AssetConfig, AssetError, AssetResult, AssetSystem, AssetUuid, CodecRegistry, ImportContext,
};
use std::any::Any;
use std::env;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tempfile::tempdir;

/// Plain-text note stored verbatim.
#[derive(Debug, Default)]
struct NoteAsset {
    text: String,
}

chasset::asset_type_info!(NoteAsset, "NoteAsset");

impl AssetPayload for NoteAsset {
    fn asset_type(&self) -> TypeDescriptor {
        TypeDescriptor::of::<NoteAsset>()
    }

    fn serialize(&self, writer: &mut dyn Write) -> AssetResult<()> {
        write_u32(writer, self.text.len() as u32)?;
        writer.write_all(self.text.as_bytes())?;
        Ok(())
    }

    fn deserialize(&mut self, reader: &mut dyn Read, _ctx: &LoadContext<'_>) -> AssetResult<()> {
        let len = read_u32(reader).map_err(AssetError::from_payload_read)? as usize;
        let bytes = read_bytes(reader, len).map_err(AssetError::from_payload_read)?;
        self.text = String::from_utf8(bytes).map_err(|err| AssetError::FormatMismatch(err.to_string()))?;
        Ok(())
    }

    fn clear_asset_data(&mut self) {
        self.text.clear();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Default)]
struct NoteCodec;

chasset::asset_type_info!(NoteCodec, "NoteCodec");

impl AssetCodec for NoteCodec {
    fn descriptor(&self) -> TypeDescriptor {
        TypeDescriptor::of::<NoteCodec>()
    }

    fn asset_type(&self) -> TypeDescriptor {
        TypeDescriptor::of::<NoteAsset>()
    }

    fn extensions(&self) -> Vec<String> {
        vec!["note".to_string(), ".TXT".to_string()]
    }

    fn import(&self, source: &Path, ctx: &ImportContext<'_>) -> AssetResult<AssetHandle> {
        let text = fs::read_to_string(source)?;
        let asset = ctx.create_asset(AssetKind::Custom(Box::new(NoteAsset { text })));
        asset.set_original_path(source);
        asset.try_save()?;
        Ok(asset)
    }

    fn create_payload(&self) -> AssetKind {
        AssetKind::Custom(Box::<NoteAsset>::default())
    }
}

fn load_notes(registry: &mut CodecRegistry) {
    registry.register::<NoteCodec>().expect("note codec registers");
}

fn note_system(root: &Path) -> AssetSystem {
    AssetSystem::builder(AssetConfig::with_root(root))
        .without_builtin_codecs()
        .with_static_plugin("notes", load_notes)
        .build()
        .expect("asset system")
}

#[test]
fn static_plugin_registers_its_codec() {
    let dir = tempdir().unwrap();
    let system = note_system(dir.path());
    let codecs = system.codecs();

    assert_eq!(codecs.all_codecs().len(), 1);
    let by_extension = codecs.codec_for_extension("note").expect("note codec by extension");
    let by_type = codecs.codec_for_type(type_id::<NoteCodec>()).expect("note codec by type");
    assert!(Arc::ptr_eq(&by_extension, &by_type));
    assert!(codecs.codec_for_extension("*.txt").is_some());
    assert!(codecs.codec_for_extension("png").is_none());
    assert_eq!(codecs.extensions(), vec!["note".to_string(), "txt".to_string()]);

    let record = system.plugins().plugin("notes").expect("plugin recorded");
    assert_eq!(record.codecs, vec![type_id::<NoteCodec>()]);
}

#[test]
fn plugin_payloads_save_and_reload() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("assets");
    let source = dir.path().join("readme.note");
    fs::write(&source, "hello from a plugin").unwrap();

    let uuid = {
        let system = note_system(&root);
        let asset = system.manager().import_asset(&source, "docs").expect("import succeeds");
        assert_eq!(asset.asset_type(), type_id::<NoteAsset>());
        asset.uuid()
    };

    let system = note_system(&root);
    system.manager().scan();
    let asset = system.manager().load_by_id(uuid).expect("reload succeeds");
    let payload = asset.payload();
    let note = payload.as_custom::<NoteAsset>().expect("note payload");
    assert_eq!(note.text, "hello from a plugin");
}

#[test]
fn unloading_a_plugin_removes_its_codecs() {
    let mut registry = CodecRegistry::new();
    let mut loader = PluginLoader::new();
    register_builtin_codecs(&mut registry).unwrap();
    let added = loader.load_static("notes", load_notes, &mut registry).unwrap();
    assert_eq!(added, vec![type_id::<NoteCodec>()]);
    assert_eq!(registry.len(), 4);
    assert!(loader.load_static("notes", load_notes, &mut registry).is_err());

    assert!(loader.unload("notes", &mut registry));
    assert_eq!(registry.len(), 3);
    assert!(registry.codec_for_extension("note").is_none());
    assert!(registry.codec_for_extension("png").is_some());
    assert!(!loader.unload("notes", &mut registry));
}

#[test]
fn codec_lookups_agree_for_builtins() {
    let dir = tempdir().unwrap();
    let system = AssetSystem::builder(AssetConfig::with_root(dir.path())).build().unwrap();
    let codecs = system.codecs();
    for codec in codecs.all_codecs() {
        let by_type = codecs.codec_for_type(codec.descriptor().id()).expect("codec by type");
        assert!(Arc::ptr_eq(&codec, &by_type));
        for ext in codec.extensions() {
            let by_extension = codecs.codec_for_extension(&ext).expect("codec by extension");
            assert!(Arc::ptr_eq(&codec, &by_extension), "{ext}");
        }
    }
    for (asset_type, ext) in [
        (type_id::<TextureAsset>(), Some("png")),
        (type_id::<ModelAsset>(), Some("gltf")),
        (type_id::<SceneAsset>(), None),
    ] {
        let codec = codecs.codec_for_asset_type(asset_type).expect("codec by asset type");
        if let Some(ext) = ext {
            assert!(Arc::ptr_eq(&codec, &codecs.codec_for_extension(ext).unwrap()));
        }
    }
    assert!(codecs.codec_for_type(AssetUuid::from_name("NoSuchCodec")).is_none());
}

fn build_xyz_plugin() -> PathBuf {
    let project_root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let plugin_dir = project_root.join("plugins").join("xyz_codec");
    let cargo = env::var("CARGO").unwrap_or_else(|_| "cargo".to_string());
    let file_name = format!("{}xyz_codec{}", env::consts::DLL_PREFIX, env::consts::DLL_SUFFIX);
    let artifact = plugin_dir.join("target").join("debug").join(file_name);
    if !artifact.exists() {
        let status = Command::new(&cargo)
            .args(["build", "--offline"])
            .current_dir(&plugin_dir)
            .status()
            .expect("cargo build xyz_codec");
        assert!(status.success(), "building xyz_codec plugin failed");
    }
    assert!(artifact.exists(), "xyz_codec plugin artifact missing at {}", artifact.display());
    artifact
}

#[test]
#[ignore = "builds the xyz_codec plugin with cargo"]
fn dynamic_plugin_is_loaded_from_the_plugin_directory() {
    let artifact = build_xyz_plugin();
    let dir = tempdir().unwrap();
    let plugin_dir = dir.path().join("plugins");
    fs::create_dir_all(&plugin_dir).unwrap();
    fs::copy(&artifact, plugin_dir.join(library_file_name("xyz_codec"))).unwrap();
    let source = dir.path().join("cloud.xyz");
    fs::write(&source, "# two points\n0 0 0\n1 2 3\n").unwrap();

    let config = AssetConfig { plugins: vec!["xyz_codec".to_string()], ..AssetConfig::with_root(dir.path().join("assets")) };
    let system = AssetSystem::builder(config)
        .without_builtin_codecs()
        .with_plugin_dir(&plugin_dir)
        .build()
        .unwrap();
    assert_eq!(system.codecs().len(), 1);
    let codec = system.codecs().codec_for_extension("xyz").expect("xyz codec");
    assert!(Arc::ptr_eq(&codec, &system.codecs().codec_for_type(AssetUuid::from_name("XyzCodec")).unwrap()));
    let record = system.plugins().plugin("xyz_codec").expect("plugin recorded");
    assert_eq!(record.codecs.len(), 1);

    let asset = system.manager().import_asset(&source, "").expect("import through plugin");
    assert_eq!(asset.asset_type(), AssetUuid::from_name("XyzAsset"));
    assert!(asset.unload());
    assert!(system.manager().load(&asset));
    assert_eq!(fs::metadata(asset.file_path()).unwrap().len(), 664 + 4 + 4 + 2 * 12);
}
