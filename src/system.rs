use crate::assets::model::ModelCodec;
use crate::assets::scene::SceneCodec;
use crate::assets::texture::TextureCodec;
use crate::assets::AssetManager;
use crate::codec::CodecRegistry;
use crate::config::AssetConfig;
use crate::gpu::{GpuDevice, HeadlessDevice};
use crate::plugins::{PluginLoader, StaticPluginEntry};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// Registers the codecs that ship with the crate.
pub fn register_builtin_codecs(registry: &mut CodecRegistry) -> Result<()> {
    registry.register::<TextureCodec>().context("registering texture codec")?;
    registry.register::<ModelCodec>().context("registering model codec")?;
    registry.register::<SceneCodec>().context("registering scene codec")?;
    Ok(())
}

pub struct AssetSystemBuilder {
    config: AssetConfig,
    device: Option<Arc<dyn GpuDevice>>,
    builtin_codecs: bool,
    static_plugins: Vec<(String, StaticPluginEntry)>,
    plugin_dir: Option<PathBuf>,
}

impl AssetSystemBuilder {
    pub fn new(config: AssetConfig) -> Self {
        let plugin_dir = config.plugin_dir.clone();
        Self { config, device: None, builtin_codecs: true, static_plugins: Vec::new(), plugin_dir }
    }

    pub fn with_device(mut self, device: Arc<dyn GpuDevice>) -> Self {
        self.device = Some(device);
        self
    }

    /// Starts from an empty registry; only plugins contribute codecs.
    pub fn without_builtin_codecs(mut self) -> Self {
        self.builtin_codecs = false;
        self
    }

    pub fn with_static_plugin(mut self, name: impl Into<String>, entry: StaticPluginEntry) -> Self {
        self.static_plugins.push((name.into(), entry));
        self
    }

    pub fn with_plugin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plugin_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> Result<AssetSystem> {
        let mut registry = CodecRegistry::new();
        if self.builtin_codecs {
            register_builtin_codecs(&mut registry)?;
        }
        let mut plugins = PluginLoader::new();
        for (name, entry) in &self.static_plugins {
            plugins
                .load_static(name, *entry, &mut registry)
                .with_context(|| format!("running static plugin '{name}'"))?;
        }
        if let Some(dir) = &self.plugin_dir {
            let loaded = if self.config.plugins.is_empty() {
                plugins.load_directory(dir, &mut registry)?
            } else {
                let mut loaded = Vec::new();
                for name in &self.config.plugins {
                    match plugins.load_named(dir, name, &mut registry) {
                        Ok(name) => loaded.push(name),
                        Err(err) => log::warn!(target: "plugin", "skipping plugin '{name}': {err:?}"),
                    }
                }
                loaded
            };
            log::info!(target: "plugin", "loaded {} plugin(s) from '{}'", loaded.len(), dir.display());
        }
        let device = self.device.unwrap_or_else(|| Arc::new(HeadlessDevice::new()));
        let manager = AssetManager::new(self.config, Arc::new(registry), device);
        log::info!(
            target: "assets",
            "asset system ready: root '{}', {} codec(s)",
            manager.root().display(),
            manager.codecs().len()
        );
        Ok(AssetSystem { manager, plugins })
    }
}

/// Owns the asset manager and the plugin libraries its codecs come from.
pub struct AssetSystem {
    // Dropped first: assets and codecs may run code from plugin libraries.
    manager: AssetManager,
    plugins: PluginLoader,
}

impl AssetSystem {
    pub fn builder(config: AssetConfig) -> AssetSystemBuilder {
        AssetSystemBuilder::new(config)
    }

    pub fn manager(&self) -> &AssetManager {
        &self.manager
    }

    pub fn codecs(&self) -> &CodecRegistry {
        self.manager.codecs()
    }

    pub fn plugins(&self) -> &PluginLoader {
        &self.plugins
    }
}
