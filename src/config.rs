use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelImportConfig {
    /// Convert right-handed sources (glTF, OBJ) to the engine's left-handed frame.
    #[serde(default = "ModelImportConfig::default_enabled")]
    pub left_handed: bool,
    /// Normalize texture coordinates to a top-left origin.
    #[serde(default = "ModelImportConfig::default_enabled")]
    pub flip_uvs: bool,
    #[serde(default = "ModelImportConfig::default_enabled")]
    pub join_identical_vertices: bool,
    #[serde(default = "ModelImportConfig::default_enabled")]
    pub generate_smooth_normals: bool,
    /// Share byte-identical meshes between nodes even when the source lists them separately.
    #[serde(default)]
    pub deduplicate_content: bool,
}

impl ModelImportConfig {
    const fn default_enabled() -> bool {
        true
    }
}

impl Default for ModelImportConfig {
    fn default() -> Self {
        Self {
            left_handed: true,
            flip_uvs: true,
            join_identical_vertices: true,
            generate_smooth_normals: true,
            deduplicate_content: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetConfig {
    #[serde(default = "AssetConfig::default_asset_root")]
    pub asset_root: PathBuf,
    #[serde(default)]
    pub plugin_dir: Option<PathBuf>,
    /// Plugins to load from `plugin_dir` by name; empty loads every library in the directory.
    #[serde(default)]
    pub plugins: Vec<String>,
    /// Store texture pixels and mesh streams in CHZP envelopes.
    #[serde(default)]
    pub compress_payloads: bool,
    #[serde(default = "AssetConfig::default_engine_version")]
    pub engine_version: String,
    #[serde(default)]
    pub model: ModelImportConfig,
}

#[derive(Debug, Clone, Default)]
pub struct AssetConfigOverrides {
    pub asset_root: Option<PathBuf>,
    pub plugin_dir: Option<PathBuf>,
}

impl AssetConfig {
    fn default_asset_root() -> PathBuf {
        PathBuf::from("assets")
    }

    fn default_engine_version() -> String {
        env!("CARGO_PKG_VERSION").to_string()
    }

    pub fn with_root(asset_root: impl Into<PathBuf>) -> Self {
        Self { asset_root: asset_root.into(), ..Self::default() }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).with_context(|| format!("Failed to read asset config {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse asset config {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                log::warn!(target: "assets", "config load error: {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_vec_pretty(self).context("Failed to serialize asset config")?;
        fs::write(path, json).with_context(|| format!("Failed to write asset config {}", path.display()))
    }

    pub fn apply_overrides(&mut self, overrides: &AssetConfigOverrides) {
        if let Some(root) = &overrides.asset_root {
            self.asset_root = root.clone();
        }
        if let Some(dir) = &overrides.plugin_dir {
            self.plugin_dir = Some(dir.clone());
        }
    }
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            asset_root: Self::default_asset_root(),
            plugin_dir: None,
            plugins: Vec::new(),
            compress_payloads: false,
            engine_version: Self::default_engine_version(),
            model: ModelImportConfig::default(),
        }
    }
}

impl AssetConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.asset_root.is_none() && self.plugin_dir.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let cfg: AssetConfig = serde_json::from_str(r#"{ "model": { "flip_uvs": false } }"#).unwrap();
        assert_eq!(cfg.asset_root, PathBuf::from("assets"));
        assert_eq!(cfg.plugin_dir, None);
        assert_eq!(cfg.engine_version, env!("CARGO_PKG_VERSION"));
        assert!(!cfg.model.flip_uvs);
        assert!(cfg.model.left_handed);
        assert!(!cfg.model.deduplicate_content);
        assert!(cfg.plugins.is_empty());
        assert!(!cfg.compress_payloads);
    }

    #[test]
    fn config_files_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("assets.json");
        let mut cfg = AssetConfig::with_root("content");
        cfg.plugin_dir = Some(PathBuf::from("plugins"));
        cfg.plugins = vec!["xyz_codec".to_string()];
        cfg.compress_payloads = true;
        cfg.save(&path).unwrap();
        assert_eq!(AssetConfig::load(&path).unwrap(), cfg);
    }

    #[test]
    fn unreadable_config_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AssetConfig::load_or_default(dir.path().join("missing.json"));
        assert_eq!(cfg, AssetConfig::default());
    }

    #[test]
    fn overrides_replace_paths() {
        let mut cfg = AssetConfig::default();
        let overrides = AssetConfigOverrides { asset_root: Some(PathBuf::from("/tmp/root")), plugin_dir: None };
        assert!(!overrides.is_empty());
        cfg.apply_overrides(&overrides);
        assert_eq!(cfg.asset_root, PathBuf::from("/tmp/root"));
        assert!(cfg.plugin_dir.is_none());
    }
}
