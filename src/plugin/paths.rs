//! Storage path derivation
//!
//! The project root holds three sibling trees, each keyed by plugin guid:
//! `config/<guid>` for user-editable persistent data, `plugins_data/<guid>`
//! for persistent data the user should not touch, and `plugins/<guid>` for
//! the plugin sources themselves.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{Result, ShadeError};

/// environment variable overriding the project root location
pub const ROOT_ENV_VAR: &str = "SHADE_ROOT_FOLDER";

/// resolve the project root folder, creating it if needed
///
/// the environment variable takes precedence; otherwise the root lives next
/// to the host executable.
pub fn project_root(project_name: &str) -> Result<PathBuf> {
    if let Ok(override_root) = std::env::var(ROOT_ENV_VAR) {
        let root = PathBuf::from(override_root).join(project_name);
        ensure_dir(&root)?;
        info!("root folder set through env variable: {}", root.display());
        return Ok(root);
    }

    let exe = std::env::current_exe().map_err(|e| ShadeError::Io {
        path: PathBuf::from("."),
        reason: e.to_string(),
    })?;

    let root = exe
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(project_name);
    ensure_dir(&root)?;
    info!("root folder set through default: {}", root.display());

    Ok(root)
}

/// per-module storage locations derived from the project root and guid
#[derive(Debug, Clone)]
pub struct ModuleFolders {
    /// user-editable persistent data: `config/<guid>`
    pub config: PathBuf,
    /// persistent data hidden from the user: `plugins_data/<guid>`
    pub data: PathBuf,
    /// plugin sources: `plugins/<guid>`
    pub plugins: PathBuf,
}

impl ModuleFolders {
    /// create all three folders if missing
    pub fn ensure(&self) -> Result<()> {
        ensure_dir(&self.config)?;
        ensure_dir(&self.data)?;
        ensure_dir(&self.plugins)
    }
}

/// derive a module's folders; does not touch the filesystem
pub fn module_folders(root: &Path, guid: &str) -> ModuleFolders {
    ModuleFolders {
        config: root.join("config").join(guid),
        data: root.join("plugins_data").join(guid),
        plugins: root.join("plugins").join(guid),
    }
}

fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| ShadeError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_folders_layout() {
        let folders = module_folders(Path::new("/opt/game/shade"), "author-mod");

        assert_eq!(
            folders.config,
            Path::new("/opt/game/shade/config/author-mod")
        );
        assert_eq!(
            folders.data,
            Path::new("/opt/game/shade/plugins_data/author-mod")
        );
        assert_eq!(
            folders.plugins,
            Path::new("/opt/game/shade/plugins/author-mod")
        );
    }

    #[test]
    fn test_folders_differ_per_guid() {
        let root = Path::new("/tmp/shade");
        let a = module_folders(root, "author-a");
        let b = module_folders(root, "author-b");
        assert_ne!(a.config, b.config);
        assert_ne!(a.data, b.data);
    }
}
