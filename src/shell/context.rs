//! `ShellContext`: the state every command handler and the executor share.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::commands::IpNetworkContext;
use crate::usergroup::UserGroupManager;
use crate::vfs::Vfs;

/// A saved caller context, pushed by `su`/`sudo` and popped by `exit`.
#[derive(Debug, Clone)]
pub struct SuFrame {
    pub user: String,
    pub uid: u32,
    pub gid: u32,
    pub cwd: String,
    pub umask: u32,
    /// `true` for a frame pushed by `sudo` rather than `su`; used by the
    /// "sudo su" unwind fix.
    pub from_sudo: bool,
}

/// `(vfs, userMgr, cwd, umask, uid, gid)` plus executor-local state.
pub struct ShellContext {
    pub vfs: Arc<Vfs>,
    pub users: Arc<UserGroupManager>,
    pub network: Box<dyn IpNetworkContext + Send + Sync>,
    pub cwd: String,
    pub umask: u32,
    pub uid: u32,
    pub gid: u32,
    pub user: String,
    pub env: BTreeMap<String, String>,
    pub su_stack: Vec<SuFrame>,
    pub last_exit: i32,
}

impl ShellContext {
    pub fn new(
        vfs: Arc<Vfs>,
        users: Arc<UserGroupManager>,
        network: Box<dyn IpNetworkContext + Send + Sync>,
    ) -> Self {
        let mut env = BTreeMap::new();
        env.insert("HOME".to_string(), "/root".to_string());
        env.insert("USER".to_string(), "root".to_string());
        env.insert("SHELL".to_string(), "/bin/sh".to_string());
        env.insert("PATH".to_string(), "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin".to_string());
        ShellContext {
            vfs,
            users,
            network,
            cwd: "/root".to_string(),
            umask: 0o022,
            uid: 0,
            gid: 0,
            user: "root".to_string(),
            env,
            su_stack: Vec::new(),
            last_exit: 0,
        }
    }

    pub fn is_root(&self) -> bool {
        self.uid == 0
    }

    /// Expands `$VAR` and `${VAR}` occurrences in `text`; unknown variables
    /// are left unexpanded.
    pub fn expand_vars(&self, text: &str) -> String {
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::new();
        let mut i = 0;
        while i < chars.len() {
            if chars[i] == '$' && i + 1 < chars.len() {
                if chars[i + 1] == '?' {
                    out.push_str(&self.last_exit.to_string());
                    i += 2;
                    continue;
                }
                if chars[i + 1] == '{' {
                    if let Some(end) = chars[i + 2..].iter().position(|&c| c == '}') {
                        let name: String = chars[i + 2..i + 2 + end].iter().collect();
                        if let Some(val) = self.lookup_var(&name) {
                            out.push_str(&val);
                        } else {
                            out.push_str(&format!("${{{name}}}"));
                        }
                        i = i + 2 + end + 1;
                        continue;
                    }
                } else if chars[i + 1].is_ascii_alphabetic() || chars[i + 1] == '_' {
                    let mut end = i + 1;
                    while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
                        end += 1;
                    }
                    let name: String = chars[i + 1..end].iter().collect();
                    if let Some(val) = self.lookup_var(&name) {
                        out.push_str(&val);
                    } else {
                        out.push('$');
                        out.push_str(&name);
                    }
                    i = end;
                    continue;
                }
            }
            out.push(chars[i]);
            i += 1;
        }
        out
    }

    fn lookup_var(&self, name: &str) -> Option<String> {
        match name {
            "?" => Some(self.last_exit.to_string()),
            "PWD" => Some(self.cwd.clone()),
            _ => self.env.get(name).cloned(),
        }
    }
}
