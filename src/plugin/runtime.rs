//! Script runtime and plugin loader
//!
//! Owns the script engine, the fallback module, and every loaded plugin.
//! All loading and directory mutation happens on the thread driving this
//! runtime; scripts and detours only read.

use std::path::PathBuf;

use rhai::{Dynamic, Engine, ImmutableString, Map};
use tracing::{info, warn};

use crate::config::RuntimeConfig;
use crate::error::Result;
use crate::plugin::directory;
use crate::plugin::manifest::Manifest;
use crate::plugin::module::{self, LoadResult, ModuleHandle, ModuleInfo, PluginModule};
use crate::plugin::paths::{self, module_folders};
use crate::util::hash::content_digest;

/// script entry-point file inside each plugin folder
pub const ENTRY_POINT: &str = "main.rhai";

/// manifest file inside each plugin folder
pub const MANIFEST_FILE: &str = "manifest.json";

/// the plugin runtime: engine, fallback module, and loaded plugins
pub struct ScriptRuntime {
    engine: Engine,
    config: RuntimeConfig,
    root: PathBuf,
    /// host-owned module that identity resolution falls back to
    fallback: PluginModule,
    /// successfully loaded plugin modules, in load order
    modules: Vec<PluginModule>,
}

impl ScriptRuntime {
    /// build a runtime rooted at an explicit project folder
    pub fn new(config: RuntimeConfig, root: PathBuf) -> Self {
        directory::init();

        let mut engine = Engine::new();
        register_host_api(&mut engine, &config);

        let fallback_info = ModuleInfo {
            guid: config.fallback_guid.clone(),
            script_path: root
                .join("plugins")
                .join(&config.fallback_guid)
                .join(ENTRY_POINT),
            manifest: Manifest::host(&config.fallback_guid),
            folders: module_folders(&root, &config.fallback_guid),
        };
        let fallback = PluginModule::new(fallback_info);

        // the fallback module is host-owned: no script runs, but it is
        // discoverable like any other module
        directory::register(fallback.guid(), fallback.exported_namespace(&config));

        Self {
            engine,
            config,
            root,
            fallback,
            modules: Vec::new(),
        }
    }

    /// build a runtime, resolving the project root from the configuration
    pub fn from_config(config: RuntimeConfig) -> Result<Self> {
        let root = paths::project_root(&config.project_name)?;
        Ok(Self::new(config, root))
    }

    /// scan the plugins folder for loadable modules
    ///
    /// a loadable module is a folder holding both a manifest and a script
    /// entry point. invalid plugins are reported and skipped; they never
    /// abort the sweep.
    pub fn discover(&self) -> Vec<ModuleInfo> {
        let plugins_dir = self.root.join("plugins");

        let entries = match std::fs::read_dir(&plugins_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("cannot read plugins folder {}: {e}", plugins_dir.display());
                return Vec::new();
            }
        };

        let mut found = Vec::new();

        for entry in entries.flatten() {
            let folder = entry.path();
            if !folder.is_dir() {
                continue;
            }

            let guid = entry.file_name().to_string_lossy().into_owned();
            if guid == self.config.fallback_guid {
                continue;
            }

            let script_path = folder.join(ENTRY_POINT);
            if !script_path.is_file() {
                continue;
            }

            let manifest = match Manifest::from_file(&folder.join(MANIFEST_FILE)) {
                Ok(manifest) => manifest,
                Err(e) => {
                    warn!("skipping {guid}: {e}");
                    continue;
                }
            };

            found.push(ModuleInfo {
                guid: guid.clone(),
                script_path,
                manifest,
                folders: module_folders(&self.root, &guid),
            });
        }

        // deterministic load order
        found.sort_by(|a, b| a.guid.cmp(&b.guid));
        found
    }

    /// construct and run one module; keeps it when the script succeeds
    pub fn load(&mut self, info: ModuleInfo) -> LoadResult {
        if let Err(e) = info.folders.ensure() {
            warn!("{}: storage folders unavailable: {e}", info.guid);
        }

        let mut module = PluginModule::new(info);
        let result = module.load_and_run(&self.engine, &self.config);

        if result == LoadResult::Success {
            self.modules.push(module);
        }

        result
    }

    /// discover and load every plugin, returning per-module results
    pub fn load_all(&mut self) -> Vec<(String, LoadResult)> {
        let mut results = Vec::new();

        for info in self.discover() {
            let guid = info.guid.clone();
            let result = self.load(info);
            results.push((guid, result));
        }

        info!(
            "loaded {}/{} plugins",
            results
                .iter()
                .filter(|(_, r)| *r == LoadResult::Success)
                .count(),
            results.len()
        );

        results
    }

    /// re-hash a module's script and update its stored hash
    ///
    /// returns `Some(true)` when the source changed since last load, which
    /// signals that the module should be reloaded. `None` when the guid is
    /// unknown or the script is unreadable.
    pub fn check_source_changed(&mut self, guid: &str) -> Option<bool> {
        let module = self.modules.iter_mut().find(|m| m.guid() == guid)?;
        let source = std::fs::read(module.path()).ok()?;
        Some(module.update_source_hash(&content_digest(&source)))
    }

    /// tear a module down and load it again from disk
    ///
    /// the fresh module re-registers under the same guid, replacing the
    /// directory entry.
    pub fn reload(&mut self, guid: &str) -> Option<LoadResult> {
        let index = self.modules.iter().position(|m| m.guid() == guid)?;

        // replacing the module object; cleanup runs on drop
        let old = self.modules.remove(index);
        let info = old.info().clone();
        drop(old);

        Some(self.load(info))
    }

    /// look up a loaded module by guid
    pub fn module(&self, guid: &str) -> Option<&PluginModule> {
        self.modules.iter().find(|m| m.guid() == guid)
    }

    /// loaded modules in load order
    pub fn modules(&self) -> &[PluginModule] {
        &self.modules
    }

    /// the host-owned fallback module
    pub fn fallback(&self) -> &PluginModule {
        &self.fallback
    }

    /// guid of the namespace currently executing
    ///
    /// never fails: an unbound or missing context resolves to the fallback
    /// module's guid.
    pub fn guid_from_context(&self, ctx: Option<&Map>) -> String {
        module::guid_from_context(ctx).unwrap_or_else(|| self.fallback.guid().to_string())
    }

    /// module owning the namespace currently executing
    ///
    /// never fails: an unbound or unknown context resolves to the fallback
    /// module.
    pub fn module_from_context(&self, ctx: Option<&Map>) -> &PluginModule {
        let guid = self.guid_from_context(ctx);
        self.modules
            .iter()
            .find(|m| m.guid() == guid)
            .unwrap_or(&self.fallback)
    }

    /// the shared script engine
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// the runtime configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// the project root folder
    pub fn root(&self) -> &PathBuf {
        &self.root
    }
}

/// host functions every script can call
fn register_host_api(engine: &mut Engine, config: &RuntimeConfig) {
    engine.register_type_with_name::<ModuleHandle>("ModuleHandle");
    engine.register_get("guid", |handle: &mut ModuleHandle| {
        ImmutableString::from(handle.guid())
    });

    // cross-module lookup; () when the guid is unknown
    engine.register_fn("mods", |guid: &str| -> Dynamic {
        directory::lookup(guid)
            .map(Dynamic::from)
            .unwrap_or(Dynamic::UNIT)
    });

    // explicit-context identity recovery, fallback-resolved
    let fallback_guid = config.fallback_guid.clone();
    engine.register_fn("current_guid", move |ctx: Map| -> ImmutableString {
        ctx.get("guid")
            .cloned()
            .and_then(|guid| guid.try_cast::<ImmutableString>())
            .unwrap_or_else(|| fallback_guid.as_str().into())
    });

    let fallback_guid = config.fallback_guid.clone();
    engine.register_fn("current_module", move |ctx: Map| -> ModuleHandle {
        let guid = ctx
            .get("guid")
            .cloned()
            .and_then(|guid| guid.try_cast::<ImmutableString>())
            .unwrap_or_else(|| fallback_guid.as_str().into());
        ModuleHandle::new(guid)
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn temp_root(tag: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("shade-rt-{}-{tag}", std::process::id()));
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(root.join("plugins")).unwrap();
        root
    }

    fn write_plugin(root: &Path, guid: &str, script: &str) {
        let folder = root.join("plugins").join(guid);
        fs::create_dir_all(&folder).unwrap();
        fs::write(
            folder.join(MANIFEST_FILE),
            format!(r#"{{"name": "{guid}", "version_number": "1.0.0"}}"#),
        )
        .unwrap();
        fs::write(folder.join(ENTRY_POINT), script).unwrap();
    }

    fn runtime_at(tag: &str) -> (ScriptRuntime, PathBuf) {
        let root = temp_root(tag);
        let runtime = ScriptRuntime::new(RuntimeConfig::default(), root.clone());
        (runtime, root)
    }

    #[test]
    fn test_load_success_registers_namespace() {
        let (mut runtime, root) = runtime_at("load-ok");
        write_plugin(
            root.as_path(),
            "rt.test.alpha",
            r#"let greeting = "hi from " + PLUGIN.guid;"#,
        );

        let results = runtime.load_all();
        assert_eq!(
            results,
            vec![("rt.test.alpha".to_string(), LoadResult::Success)]
        );

        let ns = directory::lookup("rt.test.alpha").unwrap();
        let greeting = ns
            .get("greeting")
            .unwrap()
            .clone()
            .try_cast::<String>()
            .unwrap();
        assert_eq!(greeting, "hi from rt.test.alpha");
    }

    #[test]
    fn test_load_failure_leaves_module_unregistered() {
        let (mut runtime, root) = runtime_at("load-bad");
        write_plugin(
            root.as_path(),
            "rt.test.broken",
            "let = nonsense ;;;",
        );
        write_plugin(
            root.as_path(),
            "rt.test.healthy",
            "let x = 1;",
        );

        let results = runtime.load_all();

        // isolation: the broken plugin fails alone, the healthy one loads
        assert!(results.contains(&("rt.test.broken".to_string(), LoadResult::FailedToLoad)));
        assert!(results.contains(&("rt.test.healthy".to_string(), LoadResult::Success)));
        assert!(directory::lookup("rt.test.broken").is_none());
        assert!(directory::lookup("rt.test.healthy").is_some());
    }

    #[test]
    fn test_cross_module_lookup() {
        let (mut runtime, root) = runtime_at("cross");
        write_plugin(
            root.as_path(),
            "rt.test.xa-first",
            "let secret = 41;",
        );
        write_plugin(
            root.as_path(),
            "rt.test.xb-second",
            r#"
                let other = mods("rt.test.xa-first");
                let stolen = other.secret + 1;
            "#,
        );

        let results = runtime.load_all();
        assert!(results.iter().all(|(_, r)| *r == LoadResult::Success));

        let ns = directory::lookup("rt.test.xb-second").unwrap();
        assert_eq!(ns.get("stolen").unwrap().as_int().unwrap(), 42);
    }

    #[test]
    fn test_namespace_isolation() {
        let (mut runtime, root) = runtime_at("isolation");
        write_plugin(
            root.as_path(),
            "rt.test.iso-a",
            "let value = 10;",
        );
        write_plugin(
            root.as_path(),
            "rt.test.iso-b",
            "let value = 20;",
        );

        runtime.load_all();

        let a = directory::lookup("rt.test.iso-a").unwrap();
        let b = directory::lookup("rt.test.iso-b").unwrap();
        assert_eq!(a.get("value").unwrap().as_int().unwrap(), 10);
        assert_eq!(b.get("value").unwrap().as_int().unwrap(), 20);
    }

    #[test]
    fn test_reload_cycle() {
        let (mut runtime, root) = runtime_at("reload");
        write_plugin(root.as_path(), "rt.test.hot", "let version = 1;");

        runtime.load_all();

        // unchanged source reports no change
        assert_eq!(runtime.check_source_changed("rt.test.hot"), Some(false));

        // rewrite the script; the hash now differs
        write_plugin(root.as_path(), "rt.test.hot", "let version = 2;");
        assert_eq!(runtime.check_source_changed("rt.test.hot"), Some(true));

        assert_eq!(runtime.reload("rt.test.hot"), Some(LoadResult::Success));

        let ns = directory::lookup("rt.test.hot").unwrap();
        assert_eq!(ns.get("version").unwrap().as_int().unwrap(), 2);
    }

    #[test]
    fn test_fallback_resolution() {
        let (runtime, _root) = runtime_at("fallback");

        assert_eq!(runtime.guid_from_context(None), "shade-core");
        assert_eq!(runtime.guid_from_context(Some(&Map::new())), "shade-core");
        assert_eq!(runtime.module_from_context(None).guid(), "shade-core");
    }

    #[test]
    fn test_context_resolution_finds_module() {
        let (mut runtime, root) = runtime_at("ctx");
        write_plugin(root.as_path(), "rt.test.ctx", "let x = 1;");
        runtime.load_all();

        let table = runtime.module("rt.test.ctx").unwrap().namespace().clone();
        assert_eq!(runtime.guid_from_context(Some(&table)), "rt.test.ctx");
        assert_eq!(
            runtime.module_from_context(Some(&table)).guid(),
            "rt.test.ctx"
        );
    }

    #[test]
    fn test_script_identity_recovery() {
        let (mut runtime, root) = runtime_at("identity");
        write_plugin(
            root.as_path(),
            "rt.test.whoami",
            r#"
                let my_guid = current_guid(PLUGIN);
                let my_handle_guid = current_module(PLUGIN).guid;
            "#,
        );

        let results = runtime.load_all();
        assert!(results.iter().all(|(_, r)| *r == LoadResult::Success));

        let ns = directory::lookup("rt.test.whoami").unwrap();
        assert_eq!(
            ns.get("my_guid").unwrap().clone().try_cast::<String>().unwrap(),
            "rt.test.whoami"
        );
        assert_eq!(
            ns.get("my_handle_guid")
                .unwrap()
                .clone()
                .try_cast::<String>()
                .unwrap(),
            "rt.test.whoami"
        );
    }

    #[test]
    fn test_api_namespace_prefix() {
        let config = RuntimeConfig {
            api_namespace: Some("shade_api".to_string()),
            ..RuntimeConfig::default()
        };
        let root = temp_root("prefix");
        let mut runtime = ScriptRuntime::new(config, root.clone());
        write_plugin(
            root.as_path(),
            "rt.test.prefixed",
            r#"
                let table = shade_api.mods;
                let sees_fallback = "shade-core" in table;
            "#,
        );

        let results = runtime.load_all();
        assert!(results.iter().all(|(_, r)| *r == LoadResult::Success));

        let ns = directory::lookup("rt.test.prefixed").unwrap();
        assert!(ns.get("sees_fallback").unwrap().as_bool().unwrap());
    }

    #[test]
    fn test_fallback_module_is_discoverable() {
        let (_runtime, _root) = runtime_at("fb-dir");
        let ns = directory::lookup("shade-core").unwrap();
        assert!(ns.contains_key(module::PLUGIN_TABLE));
    }
}
