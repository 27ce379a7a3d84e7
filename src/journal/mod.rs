//! The log/journal manager: an independent sink that appends syslog-style
//! lines into the VFS-backed files under `/var/log`.

use std::sync::Arc;
use std::sync::Mutex;

use tracing::{debug, info, warn};

use crate::timefmt;
use crate::vfs::Vfs;

/// Group owning the log files, per the stock Debian `adm` group.
pub const ADM_GID: u32 = 4;

/// Which log file a record lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Facility {
    Syslog,
    Auth,
    Kern,
    Boot,
}

impl Facility {
    pub fn path(self) -> &'static str {
        match self {
            Facility::Syslog => "/var/log/syslog",
            Facility::Auth => "/var/log/auth.log",
            Facility::Kern => "/var/log/kern.log",
            Facility::Boot => "/var/log/boot.log",
        }
    }

    /// The process tag written into the line.
    fn tag(self) -> &'static str {
        match self {
            Facility::Syslog => "devsim",
            Facility::Auth => "auth",
            Facility::Kern => "kernel",
            Facility::Boot => "boot",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
}

/// Appends formatted records into the journal files. Construction seeds
/// `/var/log` and the four files, mode `0o640`, owned `root:adm`.
pub struct JournalManager {
    vfs: Arc<Vfs>,
    hostname: Mutex<String>,
}

impl JournalManager {
    pub fn new(vfs: Arc<Vfs>, hostname: &str) -> Self {
        let _ = vfs.mkdirp("/var/log", Some(0o755), "/", 0, 0, 0);
        for facility in [Facility::Syslog, Facility::Auth, Facility::Kern, Facility::Boot] {
            let path = facility.path();
            let _ = vfs.touch(path, "/", 0, ADM_GID, 0);
            let _ = vfs.chmod(path, 0o640, false, "/");
            let _ = vfs.chown(path, Some(0), Some(ADM_GID), false, "/");
        }
        JournalManager { vfs, hostname: Mutex::new(hostname.to_string()) }
    }

    pub fn set_hostname(&self, hostname: &str) {
        *self.hostname.lock().unwrap() = hostname.to_string();
    }

    /// `record(facility, severity, message)`: appends one LF-terminated
    /// syslog-style line.
    pub fn record(&self, facility: Facility, severity: Severity, message: &str) {
        match severity {
            Severity::Debug => debug!(target: "journal", facility = facility.tag(), message),
            Severity::Info | Severity::Notice => {
                info!(target: "journal", facility = facility.tag(), message)
            }
            Severity::Warning | Severity::Error => {
                warn!(target: "journal", facility = facility.tag(), message)
            }
        }

        let stamp = timefmt::syslog_stamp(self.vfs.clock_now().seconds);
        let hostname = self.hostname.lock().unwrap().clone();
        let line = format!("{stamp} {hostname} {}: {message}\n", facility.tag());
        let _ = self.vfs.write_file(facility.path(), line.as_bytes(), true, "/", 0, ADM_GID, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (Arc<Vfs>, JournalManager) {
        let vfs = Arc::new(Vfs::new_empty(0, 0));
        let journal = JournalManager::new(vfs.clone(), "sim");
        (vfs, journal)
    }

    #[test]
    fn seeds_log_files_with_restricted_mode() {
        let (vfs, _journal) = fixture();
        let id = vfs.resolve("/var/log/syslog", true).unwrap();
        let inode = vfs.inode(id).unwrap();
        assert_eq!(inode.mode.bits(), 0o640);
        assert_eq!(inode.uid, 0);
        assert_eq!(inode.gid, ADM_GID);
    }

    #[test]
    fn record_appends_tagged_lines() {
        let (vfs, journal) = fixture();
        journal.record(Facility::Auth, Severity::Info, "session opened for user root");
        journal.record(Facility::Auth, Severity::Warning, "authentication failure");

        let content = String::from_utf8(vfs.read_file("/var/log/auth.log", "/").unwrap()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("sim auth: session opened for user root"));
        assert!(lines[1].ends_with("authentication failure"));
    }

    #[test]
    fn facilities_write_to_distinct_files() {
        let (vfs, journal) = fixture();
        journal.record(Facility::Kern, Severity::Info, "eth0 link up");
        journal.record(Facility::Boot, Severity::Info, "reached multi-user target");

        let kern = String::from_utf8(vfs.read_file("/var/log/kern.log", "/").unwrap()).unwrap();
        let boot = String::from_utf8(vfs.read_file("/var/log/boot.log", "/").unwrap()).unwrap();
        assert!(kern.contains("kernel: eth0 link up"));
        assert!(boot.contains("boot: reached multi-user target"));
        assert!(!kern.contains("multi-user"));
    }
}
