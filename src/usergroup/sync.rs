//! Projects the in-memory user/group database onto `/etc/passwd`,
//! `/etc/shadow` and `/etc/group`.

use crate::vfs::Vfs;

use super::UserGroupManager;

fn write_etc_file(vfs: &Vfs, name: &str, content: String) {
    let _ = vfs.mkdirp("/etc", Some(0o755), "/", 0, 0, 0o022);
    let path = format!("/etc/{name}");
    let _ = vfs.write_file(&path, content.as_bytes(), false, "/", 0, 0, 0o022);
    let _ = vfs.chmod(&path, if name == "shadow" { 0o640 } else { 0o644 }, false, "/");
}

pub fn sync_to_filesystem(manager: &UserGroupManager, vfs: &Vfs) {
    let users = manager.all_users();
    let groups = manager.all_groups();

    let mut passwd = String::new();
    let mut shadow = String::new();
    for user in &users {
        passwd.push_str(&format!(
            "{}:x:{}:{}:{}:{}:{}\n",
            user.name, user.uid, user.primary_gid, user.gecos, user.home, user.shell
        ));
        let hash = if user.locked {
            "!".to_string()
        } else {
            user.password_hash.clone().unwrap_or_else(|| "!".to_string())
        };
        let inactive = user.inactive_days.map(|d| d.to_string()).unwrap_or_default();
        let expire = user.expire_day.map(|d| d.to_string()).unwrap_or_default();
        shadow.push_str(&format!(
            "{}:{}:{}:{}:{}:{}:{}:{}:\n",
            user.name,
            hash,
            user.last_change_days,
            user.min_age_days,
            user.max_age_days,
            user.warn_days,
            inactive,
            expire
        ));
    }

    let mut group = String::new();
    for g in &groups {
        group.push_str(&format!("{}:x:{}:{}\n", g.name, g.gid, g.members.join(",")));
    }

    write_etc_file(vfs, "passwd", passwd);
    write_etc_file(vfs, "shadow", shadow);
    write_etc_file(vfs, "group", group);
}
