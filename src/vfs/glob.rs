//! Single-component glob matching (`*`, `?`; no `[...]`, no `**`) and
//! path-pattern expansion.

use super::Vfs;

/// Matches a single path component `name` against `pattern`: `*` matches any
/// run of characters, `?` matches exactly one, everything else is literal.
pub fn match_component(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    matches(&p, &n)
}

fn matches(p: &[char], n: &[char]) -> bool {
    match p.first() {
        None => n.is_empty(),
        Some('*') => matches(&p[1..], n) || (!n.is_empty() && matches(p, &n[1..])),
        Some('?') => !n.is_empty() && matches(&p[1..], &n[1..]),
        Some(c) => n.first() == Some(c) && matches(&p[1..], &n[1..]),
    }
}

impl Vfs {
    /// Expands `*`/`?` per path component of `pattern` (resolved against
    /// `cwd`), returning every matching absolute path. A pattern containing
    /// no wildcard characters that does not match anything is returned
    /// unchanged (the literal-passthrough convention shells use).
    pub fn glob_expand(&self, pattern: &str, cwd: &str) -> Vec<String> {
        let has_wildcard = pattern.contains('*') || pattern.contains('?');
        if !has_wildcard {
            return vec![pattern.to_string()];
        }

        let absolute =
            if pattern.starts_with('/') { pattern.to_string() } else { format!("{cwd}/{pattern}") };
        let comps: Vec<&str> = absolute.split('/').filter(|s| !s.is_empty()).collect();

        let mut results = self.expand_components(super::ROOT_ID, &comps, String::new());
        if results.is_empty() {
            return vec![pattern.to_string()];
        }
        results.sort();
        results
    }

    fn expand_components(&self, dir_id: super::InodeId, comps: &[&str], prefix: String) -> Vec<String> {
        let Some(first) = comps.first() else {
            return vec![if prefix.is_empty() { "/".to_string() } else { prefix }];
        };

        let Some(dir) = self.inode(dir_id) else {
            return Vec::new();
        };
        if !dir.is_dir() {
            return Vec::new();
        }

        let mut out = Vec::new();
        for (name, child_id) in dir.children.iter() {
            if name == "." || name == ".." {
                continue;
            }
            if match_component(first, name) {
                let next_prefix = format!("{prefix}/{name}");
                out.extend(self.expand_components(*child_id, &comps[1..], next_prefix));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_matches_any_run() {
        assert!(match_component("*.txt", "a.txt"));
        assert!(match_component("*", ""));
        assert!(!match_component("*.txt", "a.rs"));
    }

    #[test]
    fn question_matches_exactly_one() {
        assert!(match_component("a?c", "abc"));
        assert!(!match_component("a?c", "ac"));
        assert!(!match_component("a?c", "abbc"));
    }
}
