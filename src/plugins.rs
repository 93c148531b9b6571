use crate::asset_id::AssetUuid;
use crate::codec::CodecRegistry;
use anyhow::{anyhow, Context, Result};
use libloading::Library;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::env::consts::{DLL_EXTENSION, DLL_PREFIX, DLL_SUFFIX};
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const PLUGIN_ENTRY_SYMBOL: &[u8] = b"loadPlugin\0";

/// Exported by every plugin library. The registry pointer is only valid for the duration of the call.
pub type PluginEntryFn = unsafe extern "C-unwind" fn(registry: *mut CodecRegistry);

/// Compile-time equivalent of [`PluginEntryFn`].
pub type StaticPluginEntry = fn(&mut CodecRegistry);

/// Platform file name of a plugin library; debug builds carry a `d` suffix.
pub fn library_file_name(name: &str) -> String {
    let debug_suffix = if cfg!(debug_assertions) { "d" } else { "" };
    format!("{DLL_PREFIX}{name}{debug_suffix}{DLL_SUFFIX}")
}

/// Plugin name of a library file: the inverse of [`library_file_name`].
pub fn canonical_library_name(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    let stem = file_name.strip_suffix(DLL_SUFFIX)?;
    let stem = stem.strip_prefix(DLL_PREFIX).unwrap_or(stem);
    let stem = if cfg!(debug_assertions) {
        stem.strip_suffix('d').filter(|name| !name.is_empty()).unwrap_or(stem)
    } else {
        stem
    };
    (!stem.is_empty()).then(|| stem.to_string())
}

/// Keeps loaded libraries alive, one per canonical name.
#[derive(Default)]
pub struct LibraryManager {
    libraries: HashMap<String, (PathBuf, Arc<Library>)>,
}

impl LibraryManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `path` unless a library with the same canonical name is already held.
    /// The flag is `true` when the library was newly loaded.
    pub fn load(&mut self, path: &Path) -> Result<(String, Arc<Library>, bool)> {
        let name = canonical_library_name(path)
            .ok_or_else(|| anyhow!("'{}' is not a {DLL_EXTENSION} library", path.display()))?;
        if let Some((_, library)) = self.libraries.get(&name) {
            return Ok((name, Arc::clone(library), false));
        }
        let absolute = fs::canonicalize(path).with_context(|| format!("resolving plugin path '{}'", path.display()))?;
        let library = unsafe {
            Library::new(&absolute).with_context(|| format!("loading plugin library '{}'", absolute.display()))?
        };
        let library = Arc::new(library);
        self.libraries.insert(name.clone(), (absolute, Arc::clone(&library)));
        Ok((name, library, true))
    }

    pub fn get(&self, name: &str) -> Option<Arc<Library>> {
        self.libraries.get(name).map(|(_, library)| Arc::clone(library))
    }

    pub fn path(&self, name: &str) -> Option<&Path> {
        self.libraries.get(name).map(|(path, _)| path.as_path())
    }

    /// Drops the manager's handle; the library unloads once no other handle remains.
    pub fn unload(&mut self, name: &str) -> bool {
        self.libraries.remove(name).is_some()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.libraries.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginOrigin {
    Static,
    Dynamic(PathBuf),
}

#[derive(Debug, Clone)]
pub struct PluginRecord {
    pub name: String,
    pub origin: PluginOrigin,
    pub codecs: Vec<AssetUuid>,
}

/// Runs plugin entry points against a codec registry and remembers what each one added.
#[derive(Default)]
pub struct PluginLoader {
    plugins: Vec<PluginRecord>,
    libraries: LibraryManager,
}

impl PluginLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load_static(
        &mut self,
        name: &str,
        entry: StaticPluginEntry,
        registry: &mut CodecRegistry,
    ) -> Result<Vec<AssetUuid>> {
        if self.plugin(name).is_some() {
            return Err(anyhow!("plugin '{name}' is already loaded"));
        }
        let codecs = run_entry(name, registry, |registry| entry(registry))?;
        self.record(name, PluginOrigin::Static, codecs.clone());
        Ok(codecs)
    }

    /// Loads one shared library and calls its `loadPlugin` export.
    pub fn load_library(&mut self, path: &Path, registry: &mut CodecRegistry) -> Result<String> {
        let (name, library, fresh) = self.libraries.load(path)?;
        if !fresh {
            log::debug!(target: "plugin", "library '{name}' already loaded");
            return Ok(name);
        }
        let entry: PluginEntryFn = match unsafe { library.get::<PluginEntryFn>(PLUGIN_ENTRY_SYMBOL) } {
            Ok(symbol) => *symbol,
            Err(err) => {
                self.libraries.unload(&name);
                return Err(anyhow!(err)
                    .context(format!("resolving 'loadPlugin' in plugin '{}'", path.display())));
            }
        };
        let codecs = match run_entry(&name, registry, |registry| unsafe { entry(registry as *mut CodecRegistry) }) {
            Ok(codecs) => codecs,
            Err(err) => {
                self.libraries.unload(&name);
                return Err(err);
            }
        };
        let origin = PluginOrigin::Dynamic(self.libraries.path(&name).map(Path::to_path_buf).unwrap_or_default());
        self.record(&name, origin, codecs);
        Ok(name)
    }

    /// Loads the plugin called `name` from `dir`, using the platform file naming of [`library_file_name`].
    pub fn load_named(&mut self, dir: &Path, name: &str, registry: &mut CodecRegistry) -> Result<String> {
        let path = dir.join(library_file_name(name));
        if !path.is_file() {
            return Err(anyhow!("plugin '{name}' not found at '{}'", path.display()));
        }
        self.load_library(&path, registry)
    }

    /// Loads every shared library in `dir`, in file-name order. Failures are logged and skipped.
    pub fn load_directory(&mut self, dir: &Path, registry: &mut CodecRegistry) -> Result<Vec<String>> {
        if !dir.is_dir() {
            log::debug!(target: "plugin", "plugin directory '{}' does not exist", dir.display());
            return Ok(Vec::new());
        }
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("reading plugin directory '{}'", dir.display()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().and_then(|ext| ext.to_str()) == Some(DLL_EXTENSION))
            .collect();
        paths.sort();

        let mut loaded = Vec::new();
        for path in paths {
            match self.load_library(&path, registry) {
                Ok(name) => loaded.push(name),
                Err(err) => log::warn!(target: "plugin", "failed to load '{}': {err:?}", path.display()),
            }
        }
        Ok(loaded)
    }

    /// Unregisters the plugin's codecs, then releases its library.
    pub fn unload(&mut self, name: &str, registry: &mut CodecRegistry) -> bool {
        let Some(position) = self.plugins.iter().position(|plugin| plugin.name == name) else {
            return false;
        };
        let record = self.plugins.remove(position);
        for codec in &record.codecs {
            registry.unregister(*codec);
        }
        if matches!(record.origin, PluginOrigin::Dynamic(_)) {
            self.libraries.unload(name);
        }
        log::info!(target: "plugin", "unloaded plugin '{name}'");
        true
    }

    pub fn plugin(&self, name: &str) -> Option<&PluginRecord> {
        self.plugins.iter().find(|plugin| plugin.name == name)
    }

    pub fn plugins(&self) -> &[PluginRecord] {
        &self.plugins
    }

    pub fn libraries(&self) -> &LibraryManager {
        &self.libraries
    }

    fn record(&mut self, name: &str, origin: PluginOrigin, codecs: Vec<AssetUuid>) {
        log::info!(target: "plugin", "plugin '{name}' registered {} codec(s)", codecs.len());
        self.plugins.push(PluginRecord { name: name.to_string(), origin, codecs });
    }
}

/// Calls a plugin entry, converting panics into errors, and returns the codecs it added.
fn run_entry(
    name: &str,
    registry: &mut CodecRegistry,
    entry: impl FnOnce(&mut CodecRegistry),
) -> Result<Vec<AssetUuid>> {
    let before: HashSet<AssetUuid> = registry.codec_ids().into_iter().collect();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| entry(&mut *registry)));
    let added: Vec<AssetUuid> = registry.codec_ids().into_iter().filter(|id| !before.contains(id)).collect();
    if let Err(payload) = outcome {
        // Codecs registered before the panic may live in the library that is about to be dropped.
        for codec in &added {
            registry.unregister(*codec);
        }
        return Err(anyhow!("plugin '{name}' panicked during registration: {}", panic_message(&*payload)));
    }
    if added.is_empty() {
        log::warn!(target: "plugin", "plugin '{name}' did not register any codec");
    }
    Ok(added)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
