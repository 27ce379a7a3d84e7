//! Path normalisation and resolution.

use super::file::{InodeId, Type};
use super::{Error, Result, Vfs, MAX_SYMLINK_DEPTH, ROOT_ID};

/// Normalises `path` against `cwd`: relative paths are prefixed with `cwd`,
/// `.` segments are dropped, `..` pops the last resolved segment (never
/// climbing above `/`). The result always begins with `/`.
pub fn normalise(path: &str, cwd: &str) -> String {
    let absolute = if path.starts_with('/') { path.to_string() } else { format!("{cwd}/{path}") };

    let mut stack: Vec<&str> = Vec::new();
    for segment in absolute.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }

    if stack.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", stack.join("/"))
    }
}

/// Splits a normalised absolute path into its components.
fn components(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

impl Vfs {
    /// Resolves an absolute, normalised path to an inode id, walking from
    /// the root. When `follow_symlinks` is set, a symlink encountered along
    /// the way (including as the final component) is chased, recursively
    /// relative to its containing directory, bounded by [`MAX_SYMLINK_DEPTH`].
    pub fn resolve(&self, path: &str, follow_symlinks: bool) -> Result<InodeId> {
        self.resolve_depth(path, follow_symlinks, 0)
    }

    fn resolve_depth(&self, path: &str, follow_symlinks: bool, depth: u32) -> Result<InodeId> {
        if depth > MAX_SYMLINK_DEPTH {
            return Err(Error::Loop);
        }

        let comps = components(path);
        let mut current = ROOT_ID;

        for (i, name) in comps.iter().enumerate() {
            let is_last = i + 1 == comps.len();
            let inode = self.inode(current).ok_or(Error::NoEntry)?;
            if !inode.is_dir() {
                return Err(Error::NotDir);
            }
            let child_id = *inode.children.get(*name).ok_or(Error::NoEntry)?;

            let child = self.inode(child_id).ok_or(Error::NoEntry)?;
            if child.file_type == Type::Symlink && (follow_symlinks || !is_last) {
                let target = child.symlink_target.clone().unwrap_or_default();
                let parent_path = format!("/{}", comps[..i].join("/"));
                let resolved_target = normalise(&target, &parent_path);
                current = self.resolve_depth(&resolved_target, true, depth + 1)?;
            } else {
                current = child_id;
            }
        }

        Ok(current)
    }

    /// Resolves the parent directory and final-component name of `path`,
    /// without requiring the final component to exist.
    pub fn resolve_parent(&self, path: &str) -> Result<(InodeId, String)> {
        let comps = components(path);
        let name = comps.last().ok_or(Error::InvalidArgument)?.to_string();
        let parent_path = format!("/{}", comps[..comps.len() - 1].join("/"));
        let parent_id = self.resolve(&parent_path, true)?;
        let parent = self.inode(parent_id).ok_or(Error::NoEntry)?;
        if !parent.is_dir() {
            return Err(Error::NotDir);
        }
        Ok((parent_id, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalise_collapses_dot_and_dotdot() {
        assert_eq!(normalise("/a/./b/../c", "/"), "/a/c");
        assert_eq!(normalise("../../x", "/a/b"), "/x");
        assert_eq!(normalise("c", "/a/b"), "/a/b/c");
        assert_eq!(normalise("/", "/a"), "/");
    }

    #[test]
    fn normalise_never_climbs_above_root() {
        assert_eq!(normalise("../../..", "/"), "/");
    }
}
