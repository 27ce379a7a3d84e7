//! Account management end to end, plus idempotence laws the
//! filesystem and user tables must uphold.

mod common;

use common::boot_device;

#[test]
fn useradd_m_creates_home_and_passwd_row() {
    let mut device = boot_device();
    assert_eq!(device.execute("useradd -m alice"), "");

    // The default account took uid 1000, so alice lands on 1001
    //.
    let passwd = device.execute("cat /etc/passwd");
    assert!(passwd.contains("alice:x:1001:"), "passwd:\n{passwd}");

    let out = device.execute("id alice");
    assert_eq!(out, "uid=1001(alice) gid=1001(alice) groups=1001(alice)\n");

    let home = device.execute("ls -a /home/alice");
    for dotfile in [".bashrc", ".bash_logout", ".profile"] {
        assert!(home.contains(dotfile), "missing {dotfile} in:\n{home}");
    }
    let stat = device.execute("stat -c %U /home/alice");
    assert_eq!(stat.trim(), "alice");
}

#[test]
fn useradd_userdel_restores_user_table() {
    let mut device = boot_device();
    let before = device.execute("cat /etc/passwd");
    device.execute("useradd bob");
    device.execute("userdel bob");
    let after = device.execute("cat /etc/passwd");
    assert_eq!(before, after);
}

#[test]
fn shadow_tracks_lock_state_and_password() {
    let mut device = boot_device();
    device.execute("useradd carol");
    let shadow = device.execute("cat /etc/shadow");
    assert!(shadow.contains("carol:!"), "new accounts start locked:\n{shadow}");

    device.execute("passwd carol");
    let shadow = device.execute("cat /etc/shadow");
    assert!(shadow.contains("carol:$6$"), "password hash recorded:\n{shadow}");
}

#[test]
fn group_membership_flows_through_gpasswd() {
    let mut device = boot_device();
    device.execute("useradd dave");
    device.execute("groupadd crew");
    device.execute("gpasswd -a dave crew");

    assert!(device.execute("groups dave").contains("crew"));
    assert!(device.execute("getent group crew").contains("dave"));

    device.execute("gpasswd -d dave crew");
    assert!(!device.execute("groups dave").contains("crew"));
}

#[test]
fn setuid_bit_shows_in_listing() {
    let mut device = boot_device();
    device.execute("chmod u+s /usr/bin/ls");
    let out = device.execute("ls -l /usr/bin/ls");
    let perm = out.split_whitespace().next().expect("permission column");
    assert_eq!(perm, "-rwsr-xr-x");
}

#[test]
fn cp_rm_restores_inode_count() {
    let mut device = boot_device();
    device.execute("echo data > /tmp/a");
    let before = device.vfs().inode_count();
    device.execute("cp /tmp/a /tmp/b");
    device.execute("rm /tmp/b");
    assert_eq!(device.vfs().inode_count(), before);
}

#[test]
fn mv_there_and_back_is_observably_identity() {
    let mut device = boot_device();
    device.execute("echo data > /tmp/a");
    let before = device.execute("stat -c '%n %i %s %a' /tmp/a");
    device.execute("mv /tmp/a /tmp/b");
    device.execute("mv /tmp/b /tmp/a");
    let after = device.execute("stat -c '%n %i %s %a' /tmp/a");
    assert_eq!(before, after);
    assert_eq!(device.execute("cat /tmp/a"), "data\n");
}

#[test]
fn chmod_is_idempotent() {
    let mut device = boot_device();
    device.execute("touch /tmp/f");
    device.execute("chmod 755 /tmp/f");
    let first = device.execute("stat -c %a /tmp/f");
    device.execute("chmod 755 /tmp/f");
    let second = device.execute("stat -c %a /tmp/f");
    assert_eq!(first, second);
    assert_eq!(first.trim(), "755");
}

#[test]
fn mkdir_rmdir_restores_inode_count() {
    let mut device = boot_device();
    let before = device.vfs().inode_count();
    device.execute("mkdir /tmp/scratch");
    device.execute("rmdir /tmp/scratch");
    assert_eq!(device.vfs().inode_count(), before);
}

#[test]
fn hard_link_shares_inode_until_last_name_drops() {
    let mut device = boot_device();
    device.execute("echo shared > /tmp/orig");
    device.execute("ln /tmp/orig /tmp/alias");

    let orig = device.execute("stat -c %i /tmp/orig");
    let alias = device.execute("stat -c %i /tmp/alias");
    assert_eq!(orig, alias);
    assert_eq!(device.execute("stat -c %h /tmp/orig").trim(), "2");

    device.execute("rm /tmp/orig");
    assert_eq!(device.execute("cat /tmp/alias"), "shared\n");
    assert_eq!(device.execute("stat -c %h /tmp/alias").trim(), "1");
}

#[test]
fn find_filters_by_name_and_user() {
    let mut device = boot_device();
    device.execute("useradd -m erin");
    device.execute("mkdir /tmp/data");
    device.execute("touch /tmp/data/report.txt /tmp/data/notes.md");

    let out = device.execute("find /tmp/data -name *.txt");
    assert_eq!(out.trim(), "/tmp/data/report.txt");

    let out = device.execute("find /home -user erin -type d");
    assert!(out.contains("/home/erin"));
}

#[test]
fn who_and_whoami_follow_su() {
    let mut device = boot_device();
    assert_eq!(device.execute("whoami"), "root\n");
    device.execute("su admin");
    assert_eq!(device.execute("whoami"), "admin\n");
    assert!(device.execute("who").starts_with("admin"));
    device.execute("exit");
}
