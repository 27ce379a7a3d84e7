//! Permission checks and the `ls -l`-style mode formatter.

use super::file::{Inode, Mode, Type};

/// Access classes checked against a mode word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    Execute,
}

/// Reports whether `uid`/`gid` (root bypasses everything except the
/// directory-execute check) may perform `access` on
/// `inode`.
pub fn check(inode: &Inode, uid: u32, gid: u32, access: Access) -> bool {
    let triple = if uid == inode.uid {
        inode.mode.owner()
    } else if gid == inode.gid {
        inode.mode.group()
    } else {
        inode.mode.other()
    };

    let bit = match access {
        Access::Read => 0o4,
        Access::Write => 0o2,
        Access::Execute => 0o1,
    };

    if uid == 0 {
        // Root bypasses all checks except execute-bit checks on directories.
        if access == Access::Execute && inode.file_type == Type::Directory {
            return owner_group_other_any_execute(inode.mode);
        }
        return true;
    }

    triple & bit != 0
}

fn owner_group_other_any_execute(mode: Mode) -> bool {
    mode.owner() & 0o1 != 0 || mode.group() & 0o1 != 0 || mode.other() & 0o1 != 0
}

impl super::Vfs {
    /// Resolves `path` and verifies `uid`/`gid` may perform `access` on
    /// it, following symlinks.
    pub fn check_access(
        &self,
        path: &str,
        cwd: &str,
        uid: u32,
        gid: u32,
        access: Access,
    ) -> super::Result<()> {
        let id = self.resolve(&super::normalise(path, cwd), true)?;
        let inode = self.inode(id).ok_or(super::Error::NoEntry)?;
        if check(&inode, uid, gid, access) {
            Ok(())
        } else {
            Err(super::Error::Access)
        }
    }
}

/// Formats the 10-character `ls -l` permission string: type char, then
/// three rwx triples, with setuid/setgid/sticky replacing the matching
/// execute bit with `s`/`s`/`t` (uppercased when the execute bit itself is
/// clear).
pub fn format_permissions(inode: &Inode) -> String {
    let type_char = match inode.file_type {
        Type::File => '-',
        Type::Directory => 'd',
        Type::Symlink => 'l',
        Type::Fifo => 'p',
        Type::CharDevice => 'c',
    };

    let mode = inode.mode;
    let mut s = String::with_capacity(10);
    s.push(type_char);

    s.push_str(&triple(mode.owner(), mode.has_setuid(), 's', 'S'));
    s.push_str(&triple(mode.group(), mode.has_setgid(), 's', 'S'));
    s.push_str(&triple(mode.other(), mode.has_sticky(), 't', 'T'));
    s
}

fn triple(bits: u32, special: bool, exec_set_char: char, exec_clear_char: char) -> String {
    let r = if bits & 0o4 != 0 { 'r' } else { '-' };
    let w = if bits & 0o2 != 0 { 'w' } else { '-' };
    let has_exec = bits & 0o1 != 0;
    let x = if special {
        if has_exec {
            exec_set_char
        } else {
            exec_clear_char
        }
    } else if has_exec {
        'x'
    } else {
        '-'
    };
    format!("{r}{w}{x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::file::Time;
    use std::collections::BTreeMap;

    fn sample(mode: u32, file_type: Type) -> Inode {
        Inode {
            id: 1,
            file_type,
            mode: Mode::new(mode),
            uid: 0,
            gid: 0,
            content: Vec::new(),
            symlink_target: None,
            children: BTreeMap::new(),
            device: None,
            link_count: 1,
            mtime: Time::epoch(),
            atime: Time::epoch(),
            ctime: Time::epoch(),
        }
    }

    #[test]
    fn formats_plain_file() {
        assert_eq!(format_permissions(&sample(0o644, Type::File)), "-rw-r--r--");
    }

    #[test]
    fn formats_setuid_with_lowercase_s_when_exec_set() {
        assert_eq!(format_permissions(&sample(0o4755, Type::File)), "-rwsr-xr-x");
    }

    #[test]
    fn formats_setuid_with_uppercase_s_when_exec_clear() {
        assert_eq!(format_permissions(&sample(0o4644, Type::File)), "-rwSr--r--");
    }

    #[test]
    fn formats_sticky_tmp_directory() {
        assert_eq!(format_permissions(&sample(0o1777, Type::Directory)), "drwxrwxrwt");
    }
}
