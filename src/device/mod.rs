//! One virtual host: the VFS, user database, journal, shell and OSPF
//! engine wired together behind `execute`/`getCompletions`.

mod bootfs;
pub mod netstate;

use std::sync::Arc;

use tracing::info;

use crate::config::{self, DeviceConfig};
use crate::journal::{Facility, JournalManager, Severity, ADM_GID};
use crate::ospf::clock::{Clock, RealClock};
use crate::ospf::{InterfaceSettings, NetworkType, OspfEngine};
use crate::shell::{self, ShellContext};
use crate::usergroup::{self, UserGroupManager};
use crate::vfs::{self, Vfs};

pub use netstate::{NetAdapter, NetState};

/// Fatal boot errors abort device construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootError {
    Vfs(vfs::Error),
    Config(config::Error),
    Users(usergroup::Error),
}

impl std::fmt::Display for BootError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BootError::Vfs(e) => write!(f, "filesystem initialisation failed: {e}"),
            BootError::Config(e) => write!(f, "bad device configuration: {e}"),
            BootError::Users(e) => write!(f, "account initialisation failed: {e}"),
        }
    }
}

impl From<vfs::Error> for BootError {
    fn from(e: vfs::Error) -> Self {
        BootError::Vfs(e)
    }
}

impl From<config::Error> for BootError {
    fn from(e: config::Error) -> Self {
        BootError::Config(e)
    }
}

impl From<usergroup::Error> for BootError {
    fn from(e: usergroup::Error) -> Self {
        BootError::Users(e)
    }
}

/// Groups every Debian-flavoured base system already has, seeded before
/// the first unprivileged account.
const BASE_GROUPS: &[(&str, u32)] = &[
    ("daemon", 1),
    ("bin", 2),
    ("sys", 3),
    ("adm", ADM_GID),
    ("tty", 5),
    ("users", 100),
    ("nogroup", 65534),
];

pub struct Device {
    hostname: String,
    vfs: Arc<Vfs>,
    users: Arc<UserGroupManager>,
    journal: Arc<JournalManager>,
    net: Arc<NetState>,
    ospf: Arc<OspfEngine>,
    shell: ShellContext,
}

impl Device {
    /// Boots with the wall clock driving OSPF timers.
    pub fn boot(config: DeviceConfig) -> Result<Device, BootError> {
        Self::boot_with_clock(config, Arc::new(RealClock::new()))
    }

    /// Boots against an explicit clock; tests pass a
    /// [`crate::ospf::VirtualClock`] for deterministic timer behaviour.
    pub fn boot_with_clock(
        config: DeviceConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Device, BootError> {
        let version = config.ospf_version()?;

        let vfs = Arc::new(Vfs::new_empty(0, 0));
        bootfs::seed_filesystem(&vfs, &config.hostname)?;

        let users = Arc::new(UserGroupManager::bootstrap());
        for (name, gid) in BASE_GROUPS {
            users.add_group(name, Some(*gid))?;
        }
        let default_user = users.add_user(&config.default_user, None, None, None, None, None)?;
        users.add_to_group(&config.default_user, "sudo")?;
        let home = default_user.home.clone();
        vfs.mkdirp(&home, Some(0o755), "/", default_user.uid, default_user.primary_gid, 0o022)?;
        for dotfile in [".bashrc", ".bash_logout", ".profile"] {
            vfs.touch(&format!("{home}/{dotfile}"), "/", default_user.uid, default_user.primary_gid, 0o022)?;
        }
        usergroup::sync(&users, &vfs);

        let journal = Arc::new(JournalManager::new(vfs.clone(), &config.hostname));
        journal.record(Facility::Boot, Severity::Info, "devsim core booted");
        journal.record(Facility::Kern, Severity::Info, "random: crng init done");

        let net = Arc::new(NetState::new());
        let ospf = Arc::new(OspfEngine::new(version, config.router_id, clock));
        for iface_config in &config.interfaces {
            let (address, prefix_len) = iface_config.parse_address()?;
            net.add_interface(&iface_config.name, address, prefix_len);

            let mut settings =
                InterfaceSettings::new(&iface_config.name, address, prefix_len, iface_config.area);
            settings.cost = iface_config.cost;
            settings.priority = iface_config.priority;
            settings.passive = iface_config.passive;
            if iface_config.point_to_point {
                settings.network_type = NetworkType::PointToPoint;
            }
            // Interface names are unique in NetState, so the only add
            // error is a duplicate name in the config; keep the first.
            if ospf.add_interface(settings).is_ok() {
                let _ = ospf.activate_interface(&iface_config.name);
            }
            journal.record(
                Facility::Kern,
                Severity::Info,
                &format!("{}: link becomes ready", iface_config.name),
            );
        }

        let adapter = NetAdapter::new(net.clone(), ospf.clone(), journal.clone());
        let shell = ShellContext::new(vfs.clone(), users.clone(), Box::new(adapter));

        info!(hostname = %config.hostname, router_id = %ospf.router_id(), "device booted");
        Ok(Device {
            hostname: config.hostname,
            vfs,
            users,
            journal,
            net,
            ospf,
            shell,
        })
    }

    /// `LinuxCommandExecutor::execute(input) -> string`.
    pub fn execute(&mut self, input: &str) -> String {
        for line in input.lines() {
            let trimmed = line.trim_start();
            if trimmed.starts_with("sudo ") || trimmed == "sudo" {
                self.journal.record(
                    Facility::Auth,
                    Severity::Info,
                    &format!(
                        "sudo: {} : TTY=pts/0 ; PWD={} ; COMMAND={}",
                        self.shell.user,
                        self.shell.cwd,
                        trimmed.trim_start_matches("sudo").trim_start()
                    ),
                );
            } else if trimmed.starts_with("su ") || trimmed == "su" {
                self.journal.record(
                    Facility::Auth,
                    Severity::Info,
                    &format!("su: (to root) {} on pts/0", self.shell.user),
                );
            }
        }
        shell::execute(&mut self.shell, input)
    }

    /// `getCompletions(partial) -> [string]`.
    pub fn completions(&self, line: &str) -> Vec<String> {
        shell::completions(&self.shell, line)
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn vfs(&self) -> Arc<Vfs> {
        self.vfs.clone()
    }

    pub fn users(&self) -> Arc<UserGroupManager> {
        self.users.clone()
    }

    pub fn journal(&self) -> Arc<JournalManager> {
        self.journal.clone()
    }

    pub fn net(&self) -> Arc<NetState> {
        self.net.clone()
    }

    pub fn ospf(&self) -> Arc<OspfEngine> {
        self.ospf.clone()
    }

    /// Stops the routing engine and records the shutdown.
    pub fn shutdown(&self) {
        self.journal.record(Facility::Boot, Severity::Info, "reached target shutdown");
        self.ospf.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booted() -> Device {
        Device::boot(DeviceConfig::default()).expect("device boots")
    }

    #[test]
    fn boot_materialises_etc_passwd() {
        let device = booted();
        let passwd =
            String::from_utf8(device.vfs().read_file("/etc/passwd", "/").unwrap()).unwrap();
        assert!(passwd.starts_with("root:x:0:0:"));
        assert!(passwd.contains("admin:x:1000:1000:"));
    }

    #[test]
    fn default_user_lands_on_uid_1000_with_home() {
        let mut device = booted();
        let out = device.execute("id admin");
        assert!(out.starts_with("uid=1000(admin) gid=1000(admin)"));
        let out = device.execute("ls -a /home/admin");
        assert!(out.contains(".bashrc"));
        assert!(out.contains(".profile"));
    }

    #[test]
    fn completions_offer_commands_then_paths() {
        let device = booted();
        let commands = device.completions("ch");
        assert!(commands.contains(&"chmod".to_string()));
        assert!(commands.contains(&"chown".to_string()));

        let paths = device.completions("ls /et");
        assert_eq!(paths, vec!["/etc/".to_string()]);
    }

    #[test]
    fn sudo_lines_reach_auth_log() {
        let mut device = booted();
        device.execute("sudo whoami");
        let auth =
            String::from_utf8(device.vfs().read_file("/var/log/auth.log", "/").unwrap()).unwrap();
        assert!(auth.contains("COMMAND=whoami"));
    }
}
