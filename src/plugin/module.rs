//! Plugin module
//!
//! A [`PluginModule`] is one loaded script unit: guid identity, storage
//! folders, an isolated namespace, a content hash driving reloads, and an
//! arena of tracked allocations released on cleanup.
//!
//! Script code sees a `PLUGIN` table in its scope before any of it runs:
//!
//! ```rhai
//! print(PLUGIN.guid);
//! print(PLUGIN.config_folder_path);
//! let me = PLUGIN.this;
//! ```

use std::path::{Path, PathBuf};

use rhai::{Dynamic, Engine, ImmutableString, Map, Scope};
use tracing::{error, info};

use crate::config::RuntimeConfig;
use crate::plugin::arena::ModuleArena;
use crate::plugin::directory;
use crate::plugin::manifest::Manifest;
use crate::plugin::paths::ModuleFolders;
use crate::util::hash::content_digest;

/// name of the per-module namespace table injected into every scope
pub const PLUGIN_TABLE: &str = "PLUGIN";

/// name of the flat shared lookup table when no prefix is configured
pub const MODS_TABLE: &str = "mods";

/// result of loading and running a module's script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadResult {
    Success,
    FailedToLoad,
}

/// static description of a plugin on disk
#[derive(Debug, Clone)]
pub struct ModuleInfo {
    /// process-unique identity; the plugin folder name
    pub guid: String,
    /// script entry point
    pub script_path: PathBuf,
    /// parsed manifest
    pub manifest: Manifest,
    /// per-purpose storage folders
    pub folders: ModuleFolders,
}

/// opaque handle a script holds to recover its module identity
#[derive(Debug, Clone)]
pub struct ModuleHandle {
    guid: ImmutableString,
}

impl ModuleHandle {
    pub(crate) fn new(guid: impl Into<ImmutableString>) -> Self {
        Self { guid: guid.into() }
    }

    /// guid of the module this handle refers to
    pub fn guid(&self) -> &str {
        &self.guid
    }
}

/// one loaded script unit
pub struct PluginModule {
    info: ModuleInfo,
    /// isolated bindings for this module's script
    scope: Scope<'static>,
    /// the injected per-module namespace table
    plugin_table: Map,
    /// digest of the script source at last load
    content_hash: String,
    /// buffers owned by this module, released on cleanup
    arena: ModuleArena,
}

impl PluginModule {
    /// build a module with its namespace wired up
    ///
    /// the `PLUGIN` table (guid, storage paths, self-handle) is injected
    /// here, before any script code can run, so scripts may assume those
    /// fields always exist.
    pub fn new(info: ModuleInfo) -> Self {
        let mut table = Map::new();
        table.insert("guid".into(), info.guid.as_str().into());
        table.insert(
            "config_folder_path".into(),
            path_string(&info.folders.config).into(),
        );
        table.insert(
            "data_folder_path".into(),
            path_string(&info.folders.data).into(),
        );
        table.insert(
            "plugin_folder_path".into(),
            path_string(&info.folders.plugins).into(),
        );
        table.insert(
            "this".into(),
            Dynamic::from(ModuleHandle::new(info.guid.as_str())),
        );

        let mut scope = Scope::new();
        scope.push_constant(PLUGIN_TABLE, table.clone());

        Self {
            info,
            scope,
            plugin_table: table,
            content_hash: String::new(),
            arena: ModuleArena::new(),
        }
    }

    /// execute the module's script inside its namespace
    ///
    /// failures are confined: they are logged with the guid and surfaced as
    /// [`LoadResult::FailedToLoad`], and the module stays out of the
    /// directory. on success the exported namespace is registered under the
    /// module's guid.
    pub fn load_and_run(&mut self, engine: &Engine, config: &RuntimeConfig) -> LoadResult {
        let source = match std::fs::read_to_string(&self.info.script_path) {
            Ok(source) => source,
            Err(e) => {
                error!("{} failed to load: {e}", self.info.guid);
                return LoadResult::FailedToLoad;
            }
        };

        self.content_hash = content_digest(source.as_bytes());
        self.expose_shared_table(config);

        let ast = match engine.compile(&source) {
            Ok(ast) => ast,
            Err(e) => {
                error!("{} failed to load: {e}", self.info.guid);
                return LoadResult::FailedToLoad;
            }
        };

        if let Err(e) = engine.run_ast_with_scope(&mut self.scope, &ast) {
            error!("{} failed to load: {e}", self.info.guid);
            return LoadResult::FailedToLoad;
        }

        info!("loaded {}", self.info.guid);
        directory::register(&self.info.guid, self.exported_namespace(config));

        LoadResult::Success
    }

    /// compare and replace the stored source hash
    ///
    /// returns whether the hash differed, which is the loader's signal that
    /// the script changed on disk and the module should be reloaded.
    pub fn update_source_hash(&mut self, new_hash: &str) -> bool {
        let changed = self.content_hash != new_hash;
        self.content_hash = new_hash.to_string();
        changed
    }

    /// release every tracked buffer and tear the namespace down
    ///
    /// idempotent: a second call finds the arena already empty. also runs
    /// on drop.
    pub fn cleanup(&mut self) {
        self.arena.reset();
        self.scope.clear();
    }

    /// guid assigned at construction
    pub fn guid(&self) -> &str {
        &self.info.guid
    }

    /// script entry-point location
    pub fn path(&self) -> &Path {
        &self.info.script_path
    }

    /// parsed manifest
    pub fn manifest(&self) -> &Manifest {
        &self.info.manifest
    }

    /// static module description
    pub fn info(&self) -> &ModuleInfo {
        &self.info
    }

    /// digest of the script source at last load
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// the injected per-module namespace table
    pub fn namespace(&self) -> &Map {
        &self.plugin_table
    }

    /// this module's allocation arena
    pub fn arena_mut(&mut self) -> &mut ModuleArena {
        &mut self.arena
    }

    /// make previously loaded modules visible to this script
    fn expose_shared_table(&mut self, config: &RuntimeConfig) {
        let mods = directory::snapshot();

        match &config.api_namespace {
            Some(prefix) => {
                let mut outer = Map::new();
                outer.insert(MODS_TABLE.into(), Dynamic::from(mods));
                self.scope.push_constant(prefix.clone(), outer);
            }
            None => {
                self.scope.push_constant(MODS_TABLE, mods);
            }
        }
    }

    /// snapshot of this module's namespace for the directory
    ///
    /// the `PLUGIN` table plus every top-level script binding, minus the
    /// shared lookup table itself.
    pub(crate) fn exported_namespace(&self, config: &RuntimeConfig) -> Map {
        let shared_name = config.api_namespace.as_deref().unwrap_or(MODS_TABLE);

        let mut ns = Map::new();
        ns.insert(PLUGIN_TABLE.into(), Dynamic::from(self.plugin_table.clone()));

        for (name, _, value) in self.scope.iter() {
            if name == PLUGIN_TABLE || name == shared_name {
                continue;
            }
            ns.insert(name.into(), value);
        }

        ns
    }
}

impl Drop for PluginModule {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// guid bound in a namespace context, if any
pub fn guid_from_context(ctx: Option<&Map>) -> Option<String> {
    ctx.and_then(|table| table.get("guid"))
        .cloned()
        .and_then(|guid| guid.try_cast::<String>())
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::paths::module_folders;

    fn test_info(guid: &str) -> ModuleInfo {
        let root = Path::new("/tmp/shade-test-root");
        ModuleInfo {
            guid: guid.to_string(),
            script_path: root.join("plugins").join(guid).join("main.rhai"),
            manifest: Manifest::host(guid),
            folders: module_folders(root, guid),
        }
    }

    #[test]
    fn test_namespace_populated_before_run() {
        let module = PluginModule::new(test_info("module.test.alpha"));

        let table = module.namespace();
        assert_eq!(
            table.get("guid").unwrap().clone().try_cast::<String>().unwrap(),
            "module.test.alpha"
        );
        assert!(table.contains_key("config_folder_path"));
        assert!(table.contains_key("data_folder_path"));
        assert!(table.contains_key("plugin_folder_path"));

        let handle = table
            .get("this")
            .unwrap()
            .clone()
            .try_cast::<ModuleHandle>()
            .unwrap();
        assert_eq!(handle.guid(), "module.test.alpha");
    }

    #[test]
    fn test_guid_is_immutable_after_construction() {
        let module = PluginModule::new(test_info("module.test.fixed"));
        assert_eq!(module.guid(), "module.test.fixed");
    }

    #[test]
    fn test_update_source_hash_signal() {
        let mut module = PluginModule::new(test_info("module.test.hash"));

        assert!(module.update_source_hash("H1"));
        assert!(!module.update_source_hash("H1"));
        assert!(module.update_source_hash("H2"));
        assert_eq!(module.content_hash(), "H2");
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        let mut module = PluginModule::new(test_info("module.test.cleanup"));

        module.arena_mut().alloc(64);
        module.arena_mut().alloc(16);
        assert_eq!(module.arena_mut().block_count(), 2);

        module.cleanup();
        assert!(module.arena_mut().is_empty());

        module.cleanup();
        assert!(module.arena_mut().is_empty());
    }

    #[test]
    fn test_guid_from_context() {
        let module = PluginModule::new(test_info("module.test.ctx"));

        assert_eq!(
            guid_from_context(Some(module.namespace())).as_deref(),
            Some("module.test.ctx")
        );
        assert!(guid_from_context(None).is_none());
        assert!(guid_from_context(Some(&Map::new())).is_none());
    }

    #[test]
    fn test_failed_load_reports_and_skips_registration() {
        let mut module = PluginModule::new(test_info("module.test.missing-script"));
        let engine = Engine::new();
        let config = RuntimeConfig::default();

        // no file on disk at the script path
        assert_eq!(
            module.load_and_run(&engine, &config),
            LoadResult::FailedToLoad
        );
        assert!(directory::lookup("module.test.missing-script").is_none());
    }
}
