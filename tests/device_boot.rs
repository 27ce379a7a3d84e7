//! End-to-end boot scenarios.

mod common;

use common::boot_device;
use devsim_core::{Device, DeviceConfig};

#[test]
fn root_listing_shows_debian_layout() {
    let mut device = boot_device();
    let out = device.execute("ls -l /");

    for dir in
        ["etc", "home", "root", "tmp", "usr", "var", "dev", "proc", "sys", "opt", "run", "mnt", "media", "boot", "srv"]
    {
        assert!(out.lines().any(|l| l.ends_with(&format!(" {dir}"))), "missing {dir} in:\n{out}");
    }
    for (link, target) in [("bin", "usr/bin"), ("sbin", "usr/sbin"), ("lib", "usr/lib"), ("lib64", "usr/lib64")] {
        let line = out
            .lines()
            .find(|l| l.contains(&format!(" {link} -> {target}")))
            .unwrap_or_else(|| panic!("missing symlink {link} in:\n{out}"));
        assert!(line.starts_with('l'), "{link} should list as a symlink: {line}");
    }
}

#[test]
fn stat_tmp_reports_sticky_1777() {
    let mut device = boot_device();
    let out = device.execute("stat /tmp");
    assert!(out.contains("(1777/drwxrwxrwt)"), "unexpected stat output:\n{out}");

    let out = device.execute("stat -c %a /tmp");
    assert_eq!(out.trim(), "1777");
}

#[test]
fn etc_files_have_boot_content() {
    let mut device = boot_device();
    assert_eq!(device.execute("cat /etc/hostname").trim(), "devsim");
    assert!(device.execute("cat /etc/shells").contains("/bin/bash"));
    assert!(device.execute("cat /etc/sudoers").contains("%sudo"));
    assert!(device.execute("cat /etc/passwd").starts_with("root:x:0:0:"));
}

#[test]
fn journal_files_are_root_adm_0640() {
    let mut device = boot_device();
    let out = device.execute("ls -l /var/log");
    let syslog = out.lines().find(|l| l.ends_with(" syslog")).expect("syslog listed");
    assert!(syslog.starts_with("-rw-r-----"), "wrong mode: {syslog}");
    assert!(syslog.contains(" root "));
    assert!(syslog.contains(" adm "));

    let boot_log = device.execute("cat /var/log/boot.log");
    assert!(boot_log.contains("devsim core booted"));
}

#[test]
fn dev_nodes_are_character_devices() {
    let mut device = boot_device();
    let out = device.execute("ls -l /dev");
    for node in ["null", "zero", "urandom"] {
        let line = out.lines().find(|l| l.ends_with(&format!(" {node}"))).expect("dev node listed");
        assert!(line.starts_with("crw-rw-rw-"), "wrong mode for {node}: {line}");
    }
    assert_eq!(device.execute("cat /dev/null"), "");
    let out = device.execute("cat /dev/zero | wc -c");
    assert_eq!(out.trim(), "1024");
}

#[test]
fn ip_addr_shows_configured_interface() {
    let mut device = boot_device();
    let out = device.execute("ip addr show");
    assert!(out.contains("lo: <LOOPBACK"));
    assert!(out.contains("inet 127.0.0.1/8 scope host lo"));
    assert!(out.contains("eth0: <BROADCAST,MULTICAST,UP,LOWER_UP>"));
    assert!(out.contains("inet 10.0.0.1/24 brd 10.0.0.255 scope global eth0"));
}

#[test]
fn ip_route_lists_connected_subnet() {
    let mut device = boot_device();
    let out = device.execute("ip route show");
    assert!(out.contains("10.0.0.0/24 dev eth0 proto kernel scope link src 10.0.0.1"));

    let out = device.execute("ip route add 192.168.40.0/24 via 10.0.0.254 dev eth0");
    assert_eq!(out, "");
    let out = device.execute("ip route show");
    assert!(out.contains("192.168.40.0/24 via 10.0.0.254 dev eth0"));
}

#[test]
fn hostname_survives_in_prompt_sources() {
    let device = boot_device();
    assert_eq!(device.hostname(), "devsim");
}

#[test]
fn boots_from_toml_config_file() {
    let dir = tempfile::tempdir().expect("scratch dir");
    let path = dir.path().join("router.toml");
    std::fs::write(
        &path,
        "hostname = \"r9\"\nrouter_id = \"9.9.9.9\"\n\n[[interfaces]]\nname = \"eth0\"\naddress = \"172.16.0.9/16\"\n",
    )
    .expect("write config");

    let text = std::fs::read_to_string(&path).expect("read config");
    let config = DeviceConfig::from_toml_str(&text).expect("parse config");
    let mut device = Device::boot(config).expect("device boots");
    assert_eq!(device.hostname(), "r9");
    assert_eq!(device.execute("cat /etc/hostname").trim(), "r9");
    assert!(device.execute("ip addr show eth0").contains("inet 172.16.0.9/16"));
}
