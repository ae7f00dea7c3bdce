//! Unified error types for shade-rs

use core::fmt;
use std::path::PathBuf;

/// all errors that can occur in shade-rs
#[derive(Debug)]
pub enum ShadeError {
    // === hook installation ===
    /// hook has no target bound, or the target address is null
    NullTarget { name: String },

    /// this hook object already holds an installed patch for the target
    AlreadyInstalled { name: String, target: usize },

    /// another hook in the registry already owns the target
    TargetAlreadyHooked { target: usize },

    /// operation requires an installed hook
    NotInstalled { name: String },

    /// failed to find an instruction boundary in the target prologue
    BoundaryNotFound { address: usize, reason: String },

    /// a prologue instruction could not be moved into the trampoline
    RelocationFailed { offset: usize, reason: String },

    // === memory ===
    /// executable memory allocation failed
    AllocationFailed { size: usize },

    /// failed to change memory protection
    ProtectionChangeFailed { address: usize, size: usize },

    /// memory write operation failed
    WriteFailed { address: usize, size: usize },

    /// memory read operation failed
    ReadFailed { address: usize, size: usize },

    /// null pointer where non-null expected
    NullPointer { context: &'static str },

    /// underlying OS API returned an error
    OsError { code: i32, context: &'static str },

    // === plugins ===
    /// plugin manifest missing or malformed
    ManifestInvalid { path: PathBuf, reason: String },

    /// filesystem operation on a plugin path failed
    Io { path: PathBuf, reason: String },
}

impl fmt::Display for ShadeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NullTarget { name } => {
                write!(f, "hook '{name}' has no valid target address")
            }
            Self::AlreadyInstalled { name, target } => {
                write!(f, "hook '{name}' is already installed at {target:#x}")
            }
            Self::TargetAlreadyHooked { target } => {
                write!(f, "target {target:#x} is already owned by another hook")
            }
            Self::NotInstalled { name } => {
                write!(f, "hook '{name}' is not installed")
            }
            Self::BoundaryNotFound { address, reason } => {
                write!(f, "no instruction boundary at {address:#x}: {reason}")
            }
            Self::RelocationFailed { offset, reason } => {
                write!(f, "relocation failed at prologue offset {offset:#x}: {reason}")
            }
            Self::AllocationFailed { size } => {
                write!(f, "failed to allocate {size} bytes of executable memory")
            }
            Self::ProtectionChangeFailed { address, size } => {
                write!(
                    f,
                    "failed to change protection for {size} bytes at {address:#x}"
                )
            }
            Self::WriteFailed { address, size } => {
                write!(f, "failed to write {size} bytes at {address:#x}")
            }
            Self::ReadFailed { address, size } => {
                write!(f, "failed to read {size} bytes at {address:#x}")
            }
            Self::NullPointer { context } => {
                write!(f, "unexpected null pointer in {context}")
            }
            Self::OsError { code, context } => {
                write!(f, "OS error {code:#x} in {context}")
            }
            Self::ManifestInvalid { path, reason } => {
                write!(f, "invalid manifest {}: {reason}", path.display())
            }
            Self::Io { path, reason } => {
                write!(f, "io error on {}: {reason}", path.display())
            }
        }
    }
}

impl std::error::Error for ShadeError {}

/// result type alias using ShadeError
pub type Result<T> = std::result::Result<T, ShadeError>;
