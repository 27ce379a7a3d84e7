//! Seeds the fixed filesystem layout a freshly booted device presents.

use std::sync::Arc;

use crate::vfs::{DeviceKind, Result, Vfs};

const TOP_LEVEL_DIRS: &[&str] = &[
    "/etc", "/home", "/tmp", "/usr", "/var", "/dev", "/proc", "/sys", "/opt", "/run", "/mnt",
    "/media", "/boot", "/srv",
];

/// Modern Debian merged-/usr layout: these root entries are symlinks.
const USR_MERGE_LINKS: &[(&str, &str)] = &[
    ("/bin", "usr/bin"),
    ("/sbin", "usr/sbin"),
    ("/lib", "usr/lib"),
    ("/lib64", "usr/lib64"),
];

const ETC_SHELLS: &str = "# /etc/shells: valid login shells\n/bin/sh\n/bin/bash\n/usr/bin/sh\n/usr/bin/bash\n";

const ETC_SUDOERS: &str = "# User privilege specification\nroot\tALL=(ALL:ALL) ALL\n%sudo\tALL=(ALL:ALL) ALL\n";

/// Builds the boot tree: top-level directories, the merged-/usr symlinks,
/// the three character devices, and the fixed `/etc` files.
pub fn seed_filesystem(vfs: &Arc<Vfs>, hostname: &str) -> Result<()> {
    for dir in TOP_LEVEL_DIRS {
        vfs.mkdirp(dir, Some(0o755), "/", 0, 0, 0)?;
    }
    vfs.mkdirp("/root", Some(0o700), "/", 0, 0, 0)?;
    vfs.chmod("/tmp", 0o1777, false, "/")?;

    for sub in ["/usr/bin", "/usr/sbin", "/usr/lib", "/usr/lib64", "/usr/local", "/usr/share"] {
        vfs.mkdirp(sub, Some(0o755), "/", 0, 0, 0)?;
    }
    for (link, target) in USR_MERGE_LINKS {
        vfs.create_symlink(link, target, "/", 0, 0)?;
    }

    vfs.mkdirp("/var/log", Some(0o755), "/", 0, 0, 0)?;
    vfs.mkdirp("/var/tmp", Some(0o1777), "/", 0, 0, 0)?;
    vfs.mkdirp("/run/lock", Some(0o1777), "/", 0, 0, 0)?;

    vfs.create_char_dev("/dev/null", DeviceKind::Null, 0o666, "/", 0, 0)?;
    vfs.create_char_dev("/dev/zero", DeviceKind::Zero, 0o666, "/", 0, 0)?;
    vfs.create_char_dev("/dev/urandom", DeviceKind::Urandom, 0o666, "/", 0, 0)?;

    vfs.write_file("/etc/hostname", format!("{hostname}\n").as_bytes(), false, "/", 0, 0, 0o022)?;
    vfs.write_file("/etc/shells", ETC_SHELLS.as_bytes(), false, "/", 0, 0, 0o022)?;
    vfs.write_file("/etc/sudoers", ETC_SUDOERS.as_bytes(), false, "/", 0, 0, 0o022)?;
    vfs.chmod("/etc/sudoers", 0o440, false, "/")?;
    vfs.write_file(
        "/etc/hosts",
        format!("127.0.0.1\tlocalhost\n127.0.1.1\t{hostname}\n").as_bytes(),
        false,
        "/",
        0,
        0,
        0o022,
    )?;

    // Stub binaries so path lookups, `stat` and setuid experiments work
    // against real inodes.
    for name in crate::commands::command_names() {
        let path = format!("/usr/bin/{name}");
        vfs.touch(&path, "/", 0, 0, 0)?;
        vfs.chmod(&path, 0o755, false, "/")?;
    }
    for name in ["sh", "bash", "sudo", "su", "nologin"] {
        let path = format!("/usr/bin/{name}");
        vfs.touch(&path, "/", 0, 0, 0)?;
        vfs.chmod(&path, if name == "sudo" { 0o4755 } else { 0o755 }, false, "/")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_listing_matches_debian_layout() {
        let vfs = Arc::new(Vfs::new_empty(0, 0));
        seed_filesystem(&vfs, "sim").unwrap();

        for dir in TOP_LEVEL_DIRS {
            let id = vfs.resolve(dir, true).unwrap();
            assert!(vfs.inode(id).unwrap().is_dir(), "{dir} should be a directory");
        }
        for (link, target) in USR_MERGE_LINKS {
            let id = vfs.resolve(link, false).unwrap();
            let inode = vfs.inode(id).unwrap();
            assert_eq!(inode.symlink_target.as_deref(), Some(*target));
        }
    }

    #[test]
    fn tmp_is_sticky_and_root_is_private() {
        let vfs = Arc::new(Vfs::new_empty(0, 0));
        seed_filesystem(&vfs, "sim").unwrap();

        let tmp = vfs.inode(vfs.resolve("/tmp", true).unwrap()).unwrap();
        assert_eq!(tmp.mode.bits(), 0o1777);
        let root_home = vfs.inode(vfs.resolve("/root", true).unwrap()).unwrap();
        assert_eq!(root_home.mode.bits(), 0o700);
    }

    #[test]
    fn dev_nodes_behave_like_character_devices() {
        let vfs = Arc::new(Vfs::new_empty(0, 0));
        seed_filesystem(&vfs, "sim").unwrap();

        assert!(vfs.read_file("/dev/null", "/").unwrap().is_empty());
        assert_eq!(vfs.read_file("/dev/zero", "/").unwrap(), vec![0u8; 1024]);
        assert_eq!(vfs.read_file("/dev/urandom", "/").unwrap().len(), 1024);
        vfs.write_file("/dev/null", b"discarded", false, "/", 0, 0, 0).unwrap();
        assert!(vfs.read_file("/dev/null", "/").unwrap().is_empty());
    }
}
