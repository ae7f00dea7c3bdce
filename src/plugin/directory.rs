//! Process-wide module directory
//!
//! Maps plugin guid to the module's exported namespace. One entry per guid;
//! entries appear only after a module's load succeeds, so no half-built
//! module is ever discoverable. There is no remove operation: reload
//! replaces the module object and re-registers under the same guid.
//!
//! All mutation happens on the loader thread; the mutex only arbitrates
//! concurrent readers (detours resolving cross-module lookups).

use std::collections::HashMap;
use std::sync::Mutex;

use rhai::{Dynamic, Map};

/// process-wide directory singleton
static DIRECTORY: Mutex<Option<ModuleDirectory>> = Mutex::new(None);

/// guid -> exported namespace mapping
#[derive(Default)]
pub struct ModuleDirectory {
    by_guid: HashMap<String, Map>,
}

impl ModuleDirectory {
    /// create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// insert or overwrite the entry for a guid
    pub fn register(&mut self, guid: &str, namespace: Map) {
        self.by_guid.insert(guid.to_string(), namespace);
    }

    /// look up a namespace by guid
    pub fn lookup(&self, guid: &str) -> Option<&Map> {
        self.by_guid.get(guid)
    }

    /// whether a guid is registered
    pub fn contains(&self, guid: &str) -> bool {
        self.by_guid.contains_key(guid)
    }

    /// number of registered modules
    pub fn count(&self) -> usize {
        self.by_guid.len()
    }

    /// guid -> namespace map as a script value
    pub fn as_map(&self) -> Map {
        self.by_guid
            .iter()
            .map(|(guid, ns)| (guid.as_str().into(), Dynamic::from(ns.clone())))
            .collect()
    }
}

/// ensure the process-wide directory exists
pub fn init() {
    let mut guard = DIRECTORY.lock().unwrap();
    if guard.is_none() {
        *guard = Some(ModuleDirectory::new());
    }
}

/// execute a function with the process-wide directory
pub fn with_directory<F, R>(f: F) -> R
where
    F: FnOnce(&mut ModuleDirectory) -> R,
{
    let mut guard = DIRECTORY.lock().unwrap();
    let directory = guard.get_or_insert_with(ModuleDirectory::new);
    f(directory)
}

/// register a namespace under a guid in the process-wide directory
pub fn register(guid: &str, namespace: Map) {
    with_directory(|directory| directory.register(guid, namespace));
}

/// look up a namespace by guid in the process-wide directory
pub fn lookup(guid: &str) -> Option<Map> {
    with_directory(|directory| directory.lookup(guid).cloned())
}

/// snapshot of the whole directory as a script value
pub fn snapshot() -> Map {
    with_directory(|directory| directory.as_map())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn namespace_with(key: &str, value: i64) -> Map {
        let mut ns = Map::new();
        ns.insert(key.into(), Dynamic::from(value));
        ns
    }

    #[test]
    fn test_register_and_lookup() {
        register("dir.test.alpha", namespace_with("x", 1));

        let ns = lookup("dir.test.alpha").unwrap();
        assert_eq!(ns.get("x").unwrap().as_int().unwrap(), 1);
        assert!(lookup("dir.test.missing").is_none());
    }

    #[test]
    fn test_entries_are_isolated() {
        register("dir.test.one", namespace_with("value", 10));
        register("dir.test.two", namespace_with("value", 20));

        let one = lookup("dir.test.one").unwrap();
        let two = lookup("dir.test.two").unwrap();

        assert_eq!(one.get("value").unwrap().as_int().unwrap(), 10);
        assert_eq!(two.get("value").unwrap().as_int().unwrap(), 20);
    }

    #[test]
    fn test_reregister_overwrites() {
        register("dir.test.reload", namespace_with("v", 1));
        register("dir.test.reload", namespace_with("v", 2));

        let ns = lookup("dir.test.reload").unwrap();
        assert_eq!(ns.get("v").unwrap().as_int().unwrap(), 2);
    }

    #[test]
    fn test_snapshot_contains_guids() {
        register("dir.test.snap", namespace_with("v", 3));

        let snap = snapshot();
        assert!(snap.contains_key("dir.test.snap"));
    }
}
