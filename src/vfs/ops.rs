//! Mutating and reading operations over the inode table" table).

use tracing::debug;

use super::file::{DeviceKind, InodeId, Mode, Time, Type};
use super::{Error, Inode, Result, Vfs, MAX_NAME_LEN};

/// Default file creation mode before umask is applied.
const DEFAULT_FILE_MODE: u32 = 0o666;
/// Default directory creation mode before umask is applied.
const DEFAULT_DIR_MODE: u32 = 0o777;

fn dev_size(kind: DeviceKind) -> usize {
    match kind {
        DeviceKind::Zero | DeviceKind::Urandom => 1024,
        DeviceKind::Null => 0,
    }
}

/// A deterministic placeholder PRNG so `/dev/urandom` reads are reproducible
/// across a run without pulling in an actual CSPRNG.
fn pseudo_random_bytes(seed: u64, len: usize) -> Vec<u8> {
    let mut state = seed ^ 0x9E3779B97F4A7C15;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        out.push((state & 0xFF) as u8);
    }
    out
}

impl Vfs {
    fn validate_name(name: &str) -> Result<()> {
        if name.is_empty() || name.len() > MAX_NAME_LEN || name.contains('/') {
            return Err(Error::NameTooLong);
        }
        Ok(())
    }

    fn link_name(&self, parent: InodeId, name: &str, child: InodeId) -> Result<()> {
        self.with_inode_mut(parent, |p| {
            p.children.insert(name.to_string(), child);
        })
        .ok_or(Error::NoEntry)
    }

    fn unlink_name(&self, parent: InodeId, name: &str) -> Option<InodeId> {
        self.with_inode_mut(parent, |p| p.children.remove(name)).flatten()
    }

    /// `touch(path)`: updates atime/mtime, creating an empty file with
    /// `0o666 & ~umask` permissions if absent.
    pub fn touch(&self, path: &str, cwd: &str, uid: u32, gid: u32, umask: u32) -> Result<InodeId> {
        let normalised = super::normalise(path, cwd);
        match self.resolve(&normalised, true) {
            Ok(id) => {
                let now = self.now();
                self.with_inode_mut(id, |i| {
                    i.atime = now;
                    i.mtime = now;
                });
                Ok(id)
            }
            Err(Error::NoEntry) => {
                let (parent, name) = self.resolve_parent(&normalised)?;
                Self::validate_name(&name)?;
                let mode = Mode::new(DEFAULT_FILE_MODE & !umask);
                let id = self.alloc_inode(Type::File, mode, uid, gid);
                self.link_name(parent, &name, id)?;
                debug!(path = %normalised, "touch created file");
                Ok(id)
            }
            Err(e) => Err(e),
        }
    }

    /// `readFile(path)`: content for regular files; fixed semantics for the
    /// three modelled character devices.
    pub fn read_file(&self, path: &str, cwd: &str) -> Result<Vec<u8>> {
        let id = self.resolve(&super::normalise(path, cwd), true)?;
        let inode = self.inode(id).ok_or(Error::NoEntry)?;
        match inode.file_type {
            Type::File => Ok(inode.content.clone()),
            Type::CharDevice => match inode.device {
                Some(DeviceKind::Null) => Ok(Vec::new()),
                Some(DeviceKind::Zero) => Ok(vec![0u8; dev_size(DeviceKind::Zero)]),
                Some(DeviceKind::Urandom) => Ok(pseudo_random_bytes(id, dev_size(DeviceKind::Urandom))),
                None => Err(Error::BadType),
            },
            _ => Err(Error::IsDir),
        }
    }

    /// `writeFile(path, bytes, append)`: creates or updates a file;
    /// `/dev/null` silently discards.
    pub fn write_file(
        &self,
        path: &str,
        bytes: &[u8],
        append: bool,
        cwd: &str,
        uid: u32,
        gid: u32,
        umask: u32,
    ) -> Result<()> {
        let normalised = super::normalise(path, cwd);
        let id = match self.resolve(&normalised, true) {
            Ok(id) => id,
            Err(Error::NoEntry) => self.touch(&normalised, "/", uid, gid, umask)?,
            Err(e) => return Err(e),
        };

        let inode = self.inode(id).ok_or(Error::NoEntry)?;
        match inode.file_type {
            Type::CharDevice if inode.device == Some(DeviceKind::Null) => Ok(()),
            Type::CharDevice => Err(Error::Permission),
            Type::File => {
                let now = self.now();
                self.with_inode_mut(id, |i| {
                    if append {
                        i.content.extend_from_slice(bytes);
                    } else {
                        i.content = bytes.to_vec();
                    }
                    i.mtime = now;
                });
                Ok(())
            }
            _ => Err(Error::IsDir),
        }
    }

    /// `mkdir(path, perms)`: parent must exist and be a directory; fails on
    /// name collision.
    pub fn mkdir(&self, path: &str, perms: Option<u32>, cwd: &str, uid: u32, gid: u32, umask: u32) -> Result<InodeId> {
        let normalised = super::normalise(path, cwd);
        let (parent, name) = self.resolve_parent(&normalised)?;
        Self::validate_name(&name)?;

        let parent_inode = self.inode(parent).ok_or(Error::NoEntry)?;
        if parent_inode.children.contains_key(&name) {
            return Err(Error::Exist);
        }

        let mode = Mode::new(perms.unwrap_or(DEFAULT_DIR_MODE) & !umask);
        let id = self.alloc_inode(Type::Directory, mode, uid, gid);
        self.link_name(parent, &name, id)?;
        self.with_inode_mut(parent, |p| p.link_count += 1);
        Ok(id)
    }

    /// `mkdirp(path, perms)`: creates all missing ancestors, idempotent if
    /// the target already exists as a directory.
    pub fn mkdirp(&self, path: &str, perms: Option<u32>, cwd: &str, uid: u32, gid: u32, umask: u32) -> Result<InodeId> {
        let normalised = super::normalise(path, cwd);
        let comps: Vec<&str> = normalised.split('/').filter(|s| !s.is_empty()).collect();

        let mut current = super::ROOT_ID;
        let mut built = String::new();
        for comp in comps {
            built.push('/');
            built.push_str(comp);
            current = match self.mkdir(&built, perms, "/", uid, gid, umask) {
                Ok(id) => id,
                Err(Error::Exist) => {
                    let id = self.resolve(&built, true)?;
                    let inode = self.inode(id).ok_or(Error::NoEntry)?;
                    if !inode.is_dir() {
                        return Err(Error::NotDir);
                    }
                    id
                }
                Err(e) => return Err(e),
            };
        }
        Ok(current)
    }

    /// `rmdir(path)`: removes an empty directory.
    pub fn rmdir(&self, path: &str, cwd: &str) -> Result<()> {
        let normalised = super::normalise(path, cwd);
        let id = self.resolve(&normalised, false)?;
        let inode = self.inode(id).ok_or(Error::NoEntry)?;
        if !inode.is_dir() {
            return Err(Error::NotDir);
        }
        let real_children = inode.children.keys().filter(|k| *k != "." && *k != "..").count();
        if real_children > 0 {
            return Err(Error::NotEmpty);
        }

        let (parent, name) = self.resolve_parent(&normalised)?;
        self.unlink_name(parent, &name);
        self.with_inode_mut(parent, |p| p.link_count = p.link_count.saturating_sub(1));
        self.free_inode(id);
        Ok(())
    }

    /// Removes a single non-directory entry, for the non-recursive `rm`.
    pub fn remove_file(&self, path: &str, cwd: &str) -> Result<()> {
        let normalised = super::normalise(path, cwd);
        let id = self.resolve(&normalised, false)?;
        let inode = self.inode(id).ok_or(Error::NoEntry)?;
        if inode.is_dir() {
            return Err(Error::IsDir);
        }
        let (parent, name) = self.resolve_parent(&normalised)?;
        self.unlink_name(parent, &name);
        self.decrement_and_maybe_free(id);
        Ok(())
    }

    /// `rmrf(path)`: recursive post-order deletion, freeing inodes as link
    /// counts reach zero.
    pub fn rmrf(&self, path: &str, cwd: &str) -> Result<()> {
        let normalised = super::normalise(path, cwd);
        let id = self.resolve(&normalised, false)?;
        self.remove_tree(id);

        if normalised != "/" {
            let (parent, name) = self.resolve_parent(&normalised)?;
            if let Some(removed) = self.unlink_name(parent, &name) {
                let is_dir =
                    self.inode(removed).map(|i| i.is_dir()).unwrap_or(false);
                if is_dir {
                    self.with_inode_mut(parent, |p| p.link_count = p.link_count.saturating_sub(1));
                }
                self.decrement_and_maybe_free(removed);
            }
        }
        Ok(())
    }

    fn remove_tree(&self, id: InodeId) {
        let Some(inode) = self.inode(id) else { return };
        if inode.is_dir() {
            let children: Vec<InodeId> = inode
                .children
                .iter()
                .filter(|(k, _)| *k != "." && *k != "..")
                .map(|(_, v)| *v)
                .collect();
            for child in children {
                self.remove_tree(child);
                self.decrement_and_maybe_free(child);
            }
        }
    }

    fn decrement_and_maybe_free(&self, id: InodeId) {
        let remaining = self.with_inode_mut(id, |i| {
            i.link_count = i.link_count.saturating_sub(1);
            i.link_count
        });
        if remaining == Some(0) {
            self.free_inode(id);
        }
    }

    /// `rename(src, dst)`: if `dst` is an existing directory, moves `src`
    /// into it under its own name; otherwise replaces any existing
    /// non-directory at `dst`.
    pub fn rename(&self, src: &str, dst: &str, cwd: &str) -> Result<()> {
        let src_norm = super::normalise(src, cwd);
        let dst_norm = super::normalise(dst, cwd);

        let src_id = self.resolve(&src_norm, false)?;
        let (src_parent, src_name) = self.resolve_parent(&src_norm)?;

        let (dst_parent, dst_name) = match self.resolve(&dst_norm, false) {
            Ok(existing) => {
                let existing_inode = self.inode(existing).ok_or(Error::NoEntry)?;
                if existing_inode.is_dir() {
                    (existing, src_name.clone())
                } else {
                    let moving_inode = self.inode(src_id).ok_or(Error::NoEntry)?;
                    if moving_inode.is_dir() {
                        return Err(Error::NotDir);
                    }
                    let (p, n) = self.resolve_parent(&dst_norm)?;
                    self.unlink_name(p, &n);
                    self.decrement_and_maybe_free(existing);
                    (p, n)
                }
            }
            Err(Error::NoEntry) => self.resolve_parent(&dst_norm)?,
            Err(e) => return Err(e),
        };

        self.unlink_name(src_parent, &src_name);
        self.link_name(dst_parent, &dst_name, src_id)?;

        if src_parent != dst_parent {
            let moving_is_dir = self.inode(src_id).map(|i| i.is_dir()).unwrap_or(false);
            if moving_is_dir {
                self.with_inode_mut(src_parent, |p| p.link_count = p.link_count.saturating_sub(1));
                self.with_inode_mut(dst_parent, |p| p.link_count += 1);
            }
        }

        let now = self.now();
        self.with_inode_mut(src_id, |i| i.ctime = now);
        Ok(())
    }

    /// `createSymlink(path, target)`: stores the target string, mode `0o777`.
    pub fn create_symlink(&self, path: &str, target: &str, cwd: &str, uid: u32, gid: u32) -> Result<InodeId> {
        let normalised = super::normalise(path, cwd);
        let (parent, name) = self.resolve_parent(&normalised)?;
        Self::validate_name(&name)?;

        let parent_inode = self.inode(parent).ok_or(Error::NoEntry)?;
        if parent_inode.children.contains_key(&name) {
            return Err(Error::Exist);
        }

        let id = self.alloc_inode(Type::Symlink, Mode::new(0o777), uid, gid);
        self.with_inode_mut(id, |i| i.symlink_target = Some(target.to_string()));
        self.link_name(parent, &name, id)?;
        Ok(id)
    }

    /// `createHardLink(path, target)`: target must be a non-directory file;
    /// adds a name and increments the target's link count.
    pub fn create_hard_link(&self, path: &str, target: &str, cwd: &str) -> Result<InodeId> {
        let target_norm = super::normalise(target, cwd);
        let target_id = self.resolve(&target_norm, true)?;
        let target_inode = self.inode(target_id).ok_or(Error::NoEntry)?;
        if target_inode.is_dir() {
            return Err(Error::IsDir);
        }

        let normalised = super::normalise(path, cwd);
        let (parent, name) = self.resolve_parent(&normalised)?;
        Self::validate_name(&name)?;
        let parent_inode = self.inode(parent).ok_or(Error::NoEntry)?;
        if parent_inode.children.contains_key(&name) {
            return Err(Error::Exist);
        }

        self.link_name(parent, &name, target_id)?;
        self.with_inode_mut(target_id, |i| i.link_count += 1);
        Ok(target_id)
    }

    /// `chmod`: updates mode and ctime. `recursive` walks directories
    /// depth-first.
    pub fn chmod(&self, path: &str, mode: u32, recursive: bool, cwd: &str) -> Result<()> {
        let id = self.resolve(&super::normalise(path, cwd), false)?;
        self.chmod_id(id, mode, recursive)
    }

    fn chmod_id(&self, id: InodeId, mode: u32, recursive: bool) -> Result<()> {
        let now = self.now();
        self.with_inode_mut(id, |i| {
            i.mode = Mode::new(mode);
            i.ctime = now;
        })
        .ok_or(Error::NoEntry)?;

        if recursive {
            if let Some(inode) = self.inode(id) {
                if inode.is_dir() {
                    let children: Vec<InodeId> = inode
                        .children
                        .iter()
                        .filter(|(k, _)| *k != "." && *k != "..")
                        .map(|(_, v)| *v)
                        .collect();
                    for child in children {
                        self.chmod_id(child, mode, recursive)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// `chown`/`chgrp`: updates owner uid and/or gid and ctime.
    pub fn chown(&self, path: &str, uid: Option<u32>, gid: Option<u32>, recursive: bool, cwd: &str) -> Result<()> {
        let id = self.resolve(&super::normalise(path, cwd), false)?;
        self.chown_id(id, uid, gid, recursive)
    }

    fn chown_id(&self, id: InodeId, uid: Option<u32>, gid: Option<u32>, recursive: bool) -> Result<()> {
        let now = self.now();
        self.with_inode_mut(id, |i| {
            if let Some(u) = uid {
                i.uid = u;
            }
            if let Some(g) = gid {
                i.gid = g;
            }
            i.ctime = now;
        })
        .ok_or(Error::NoEntry)?;

        if recursive {
            if let Some(inode) = self.inode(id) {
                if inode.is_dir() {
                    let children: Vec<InodeId> = inode
                        .children
                        .iter()
                        .filter(|(k, _)| *k != "." && *k != "..")
                        .map(|(_, v)| *v)
                        .collect();
                    for child in children {
                        self.chown_id(child, uid, gid, recursive)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Creates a character device inode with fixed read/write semantics.
    pub fn create_char_dev(&self, path: &str, kind: DeviceKind, mode: u32, cwd: &str, uid: u32, gid: u32) -> Result<InodeId> {
        let normalised = super::normalise(path, cwd);
        let (parent, name) = self.resolve_parent(&normalised)?;
        let id = self.alloc_inode(Type::CharDevice, Mode::new(mode), uid, gid);
        self.with_inode_mut(id, |i| i.device = Some(kind));
        self.link_name(parent, &name, id)?;
        Ok(id)
    }

    /// Creates a FIFO inode.
    pub fn create_fifo(&self, path: &str, mode: u32, cwd: &str, uid: u32, gid: u32) -> Result<InodeId> {
        let normalised = super::normalise(path, cwd);
        let (parent, name) = self.resolve_parent(&normalised)?;
        let id = self.alloc_inode(Type::Fifo, Mode::new(mode), uid, gid);
        self.link_name(parent, &name, id)?;
        Ok(id)
    }

    /// Lists `(name, child_id)` pairs for a directory, excluding `.`/`..`.
    pub fn list_dir(&self, path: &str, cwd: &str) -> Result<Vec<(String, InodeId)>> {
        let id = self.resolve(&super::normalise(path, cwd), true)?;
        let inode = self.inode(id).ok_or(Error::NoEntry)?;
        if !inode.is_dir() {
            return Err(Error::NotDir);
        }
        Ok(inode
            .children
            .iter()
            .filter(|(k, _)| *k != "." && *k != "..")
            .map(|(k, v)| (k.clone(), *v))
            .collect())
    }

    pub(crate) fn path_of(&self, target: InodeId) -> Option<String> {
        if target == super::ROOT_ID {
            return Some("/".to_string());
        }
        self.find_path_from(super::ROOT_ID, target, String::new())
    }

    fn find_path_from(&self, dir: InodeId, target: InodeId, prefix: String) -> Option<String> {
        let inode = self.inode(dir)?;
        for (name, child_id) in inode.children.iter() {
            if name == "." || name == ".." {
                continue;
            }
            let candidate = format!("{prefix}/{name}");
            if *child_id == target {
                return Some(candidate);
            }
            if let Some(found) = self.find_path_from(*child_id, target, candidate) {
                return Some(found);
            }
        }
        None
    }

    /// Current time accessor used by commands that need a synthetic
    /// "now" outside an inode mutation (`stat`, `ls -l` date formatting).
    pub fn clock_now(&self) -> Time {
        self.now()
    }

    /// `find(start, criteria)`: recursive descent from `start`, returning
    /// every path for which every populated criterion in `criteria` holds
    /// (as a conjunction).
    pub fn find(&self, start: &str, criteria: &FindCriteria, cwd: &str) -> Result<Vec<String>> {
        let start_id = self.resolve(&super::normalise(start, cwd), true)?;
        let start_path = self.path_of(start_id).unwrap_or_else(|| "/".to_string());
        let mut out = Vec::new();
        self.find_walk(start_id, &start_path, criteria, &mut out);
        out.sort();
        Ok(out)
    }

    fn find_walk(&self, id: InodeId, path: &str, criteria: &FindCriteria, out: &mut Vec<String>) {
        let Some(inode) = self.inode(id) else { return };
        if self.find_matches(&inode, path, criteria) {
            out.push(path.to_string());
        }
        if inode.is_dir() {
            for (name, child_id) in inode.children.iter() {
                if name == "." || name == ".." {
                    continue;
                }
                let child_path = if path == "/" { format!("/{name}") } else { format!("{path}/{name}") };
                self.find_walk(*child_id, &child_path, criteria, out);
            }
        }
    }

    fn find_matches(&self, inode: &Inode, path: &str, criteria: &FindCriteria) -> bool {
        if let Some(pattern) = &criteria.name_glob {
            let base = path.rsplit('/').next().unwrap_or(path);
            if !super::glob::match_component(pattern, base) {
                return false;
            }
        }
        if let Some(file_type) = criteria.file_type {
            if inode.file_type != file_type {
                return false;
            }
        }
        if let Some(empty) = criteria.empty {
            let is_empty = match inode.file_type {
                Type::Directory => inode.children.keys().all(|k| k == "." || k == ".."),
                Type::File => inode.content.is_empty(),
                _ => false,
            };
            if is_empty != empty {
                return false;
            }
        }
        if let Some(uid) = criteria.uid {
            if inode.uid != uid {
                return false;
            }
        }
        if let Some(gid) = criteria.gid {
            if inode.gid != gid {
                return false;
            }
        }
        if let Some((min, max)) = criteria.mtime_window {
            if inode.mtime.seconds < min || inode.mtime.seconds > max {
                return false;
            }
        }
        true
    }
}

/// Conjunction of `find` selection criteria; `None` fields are unconstrained.
#[derive(Debug, Clone, Default)]
pub struct FindCriteria {
    pub name_glob: Option<String>,
    pub file_type: Option<Type>,
    pub empty: Option<bool>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub mtime_window: Option<(i64, i64)>,
}
