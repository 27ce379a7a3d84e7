//! In-memory inode-indexed virtual filesystem.
//!
//! Owns the inode table, resolves paths, and enforces POSIX-style ownership
//! and permission semantics on mutating operations. Higher
//! layers (the shell kernel, the command library) call through here rather
//! than touching inodes directly.

pub mod file;
mod glob;
mod ops;
mod path;
mod perm;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::debug;

pub use file::{DeviceKind, Inode, InodeId, Mode, Time, Type};
pub use ops::FindCriteria;
pub use path::normalise;
pub use perm::{format_permissions, Access};

/// Result of [`Vfs`] operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Maximum length of a single path component.
pub const MAX_NAME_LEN: usize = 255;

/// Bound on symlink chases during path resolution.
pub const MAX_SYMLINK_DEPTH: u32 = 20;

/// The inode id of the filesystem root.
pub const ROOT_ID: InodeId = 1;

/// [`Vfs`] errors, matching the POSIX error kinds the utilities report.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    /// Operation requires ownership or root and the caller has neither.
    Permission,
    /// Mode bits deny the requested access.
    Access,
    /// No such file or directory.
    NoEntry,
    /// Intermediate path component is not a directory.
    NotDir,
    /// Operation requires a non-directory target but found one.
    IsDir,
    /// Name already exists where a fresh name was required.
    Exist,
    /// Directory is not empty.
    NotEmpty,
    /// Symlink resolution exceeded [`MAX_SYMLINK_DEPTH`].
    Loop,
    /// Name component exceeds [`MAX_NAME_LEN`].
    NameTooLong,
    /// Target of a hard link must be a non-directory file.
    InvalidArgument,
    /// Target is not a character device / not a symlink, depending on call site.
    BadType,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Error::Permission => "Operation not permitted",
            Error::Access => "Permission denied",
            Error::NoEntry => "No such file or directory",
            Error::NotDir => "Not a directory",
            Error::IsDir => "Is a directory",
            Error::Exist => "File exists",
            Error::NotEmpty => "Directory not empty",
            Error::Loop => "Too many levels of symbolic links",
            Error::NameTooLong => "File name too long",
            Error::InvalidArgument => "Invalid argument",
            Error::BadType => "Invalid type for operation",
        };
        f.write_str(s)
    }
}

/// The virtual filesystem: a flat inode table keyed by monotonically
/// allocated id, with directories holding name -> id maps.
pub struct Vfs {
    inodes: DashMap<InodeId, Inode>,
    next_id: AtomicU64,
}

impl Vfs {
    /// Builds an empty filesystem containing only the root directory.
    pub fn new_empty(root_uid: u32, root_gid: u32) -> Self {
        let vfs = Vfs { inodes: DashMap::new(), next_id: AtomicU64::new(ROOT_ID) };
        let root = vfs.alloc_inode(Type::Directory, Mode::new(0o755), root_uid, root_gid);
        debug_assert_eq!(root, ROOT_ID);
        vfs
    }

    fn alloc_id(&self) -> InodeId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Allocates a fresh inode of the given type, returning its id. Link
    /// count starts at the convention for the type: 2 for directories (`.`
    /// plus the parent's entry), 1 otherwise.
    pub(crate) fn alloc_inode(&self, file_type: Type, mode: Mode, uid: u32, gid: u32) -> InodeId {
        let id = self.alloc_id();
        let now = self.now();
        let link_count = if file_type == Type::Directory { 2 } else { 1 };
        let inode = Inode {
            id,
            file_type,
            mode,
            uid,
            gid,
            content: Vec::new(),
            symlink_target: None,
            children: BTreeMap::new(),
            device: None,
            link_count,
            mtime: now,
            atime: now,
            ctime: now,
        };
        debug!(inode = id, ?file_type, "inode allocated");
        self.inodes.insert(id, inode);
        id
    }

    /// Frees an inode once its link count has reached zero.
    pub(crate) fn free_inode(&self, id: InodeId) {
        debug!(inode = id, "inode freed");
        self.inodes.remove(&id);
    }

    pub(crate) fn now(&self) -> Time {
        use std::time::{SystemTime, UNIX_EPOCH};
        let secs =
            SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0) as i64;
        Time { seconds: secs }
    }

    /// Returns a clone of the inode with the given id, if live.
    pub fn inode(&self, id: InodeId) -> Option<Inode> {
        self.inodes.get(&id).map(|r| r.clone())
    }

    /// Mutates an inode in place through `f`, if it is live.
    pub(crate) fn with_inode_mut<R>(&self, id: InodeId, f: impl FnOnce(&mut Inode) -> R) -> Option<R> {
        self.inodes.get_mut(&id).map(|mut r| f(&mut r))
    }

    pub fn inode_count(&self) -> usize {
        self.inodes.len()
    }
}
