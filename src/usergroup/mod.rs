//! User and group database: in-memory records plus a
//! `/etc/passwd`-`/etc/shadow`-`/etc/group` projection onto the [`Vfs`].

mod sync;

use std::collections::BTreeMap;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::vfs::Vfs;

pub use sync::sync_to_filesystem;

/// First uid/gid handed out to a non-system account, matching the
/// `useradd`/`groupadd` convention this simulator mirrors.
pub const FIRST_UNPRIVILEGED_ID: u32 = 1000;

/// [`UserGroupManager`] errors.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
    UserExists,
    UserNotFound,
    GroupExists,
    GroupNotFound,
    GroupNotEmpty,
    Permission,
    InvalidArgument,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Error::UserExists => "user already exists",
            Error::UserNotFound => "no such user",
            Error::GroupExists => "group already exists",
            Error::GroupNotFound => "no such group",
            Error::GroupNotEmpty => "group has members",
            Error::Permission => "permission denied",
            Error::InvalidArgument => "invalid argument",
        };
        f.write_str(s)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// An account entry, the in-memory analogue of a `/etc/passwd` +
/// `/etc/shadow` row.
#[derive(Debug, Clone)]
pub struct User {
    pub uid: u32,
    pub name: String,
    pub primary_gid: u32,
    pub home: String,
    pub shell: String,
    pub gecos: String,
    /// Hashed password; `None` means the account has no password set.
    pub password_hash: Option<String>,
    /// Days since epoch the password was last changed.
    pub last_change_days: i64,
    /// Minimum days between password changes, 0 for unrestricted.
    pub min_age_days: u32,
    /// Maximum days before a password change is required.
    pub max_age_days: u32,
    /// Days of warning before an expiring password.
    pub warn_days: u32,
    /// Days of inactivity after expiry before the account locks.
    pub inactive_days: Option<u32>,
    /// Day since epoch the account itself expires.
    pub expire_day: Option<i64>,
    pub locked: bool,
}

/// A group entry, the in-memory analogue of a `/etc/group` row.
#[derive(Debug, Clone)]
pub struct Group {
    pub gid: u32,
    pub name: String,
    pub members: Vec<String>,
    /// Group administrators, settable via `gpasswd -A`.
    pub admins: Vec<String>,
    pub password: Option<String>,
}

/// Owns every [`User`] and [`Group`], plus the supplementary-group and
/// sudoers membership tables.
pub struct UserGroupManager {
    users: DashMap<u32, User>,
    user_names: DashMap<String, u32>,
    groups: DashMap<u32, Group>,
    group_names: DashMap<String, u32>,
    /// uid -> supplementary gids, kept separate from each `Group::members`
    /// list so group membership can be queried from either side in O(1).
    supplementary: DashMap<u32, Vec<u32>>,
    sudoers: DashMap<String, ()>,
    next_uid: std::sync::atomic::AtomicU32,
    next_gid: std::sync::atomic::AtomicU32,
}

impl UserGroupManager {
    /// Seeds the database with `root` (uid/gid 0) and the groups the
    /// simulated base system expects to already exist.
    pub fn bootstrap() -> Self {
        let manager = UserGroupManager {
            users: DashMap::new(),
            user_names: DashMap::new(),
            groups: DashMap::new(),
            group_names: DashMap::new(),
            supplementary: DashMap::new(),
            sudoers: DashMap::new(),
            next_uid: std::sync::atomic::AtomicU32::new(FIRST_UNPRIVILEGED_ID),
            next_gid: std::sync::atomic::AtomicU32::new(FIRST_UNPRIVILEGED_ID),
        };

        manager.insert_group_raw(0, "root", Vec::new());
        manager.insert_group_raw(27, "sudo", Vec::new());
        manager.insert_user_raw(User {
            uid: 0,
            name: "root".to_string(),
            primary_gid: 0,
            home: "/root".to_string(),
            shell: "/bin/sh".to_string(),
            gecos: "root".to_string(),
            password_hash: None,
            last_change_days: 0,
            min_age_days: 0,
            max_age_days: 99999,
            warn_days: 7,
            inactive_days: None,
            expire_day: None,
            locked: false,
        });
        manager
    }

    fn insert_group_raw(&self, gid: u32, name: &str, members: Vec<String>) {
        self.group_names.insert(name.to_string(), gid);
        self.groups.insert(
            gid,
            Group { gid, name: name.to_string(), members, admins: Vec::new(), password: None },
        );
    }

    fn insert_user_raw(&self, user: User) {
        self.user_names.insert(user.name.clone(), user.uid);
        self.users.insert(user.uid, user);
    }

    fn alloc_uid(&self) -> u32 {
        self.next_uid.fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }

    fn alloc_gid(&self) -> u32 {
        self.next_gid.fetch_add(1, std::sync::atomic::Ordering::SeqCst)
    }

    pub fn user_by_name(&self, name: &str) -> Option<User> {
        let uid = *self.user_names.get(name)?;
        self.users.get(&uid).map(|r| r.clone())
    }

    pub fn user_by_uid(&self, uid: u32) -> Option<User> {
        self.users.get(&uid).map(|r| r.clone())
    }

    pub fn group_by_name(&self, name: &str) -> Option<Group> {
        let gid = *self.group_names.get(name)?;
        self.groups.get(&gid).map(|r| r.clone())
    }

    pub fn group_by_gid(&self, gid: u32) -> Option<Group> {
        self.groups.get(&gid).map(|r| r.clone())
    }

    pub fn all_users(&self) -> Vec<User> {
        let mut v: Vec<User> = self.users.iter().map(|r| r.clone()).collect();
        v.sort_by_key(|u| u.uid);
        v
    }

    pub fn all_groups(&self) -> Vec<Group> {
        let mut v: Vec<Group> = self.groups.iter().map(|r| r.clone()).collect();
        v.sort_by_key(|g| g.gid);
        v
    }

    /// `useradd`: allocates a uid (unless `uid` is given), creates a
    /// same-named primary group unless `primary_gid` is given, and records
    /// the account.
    #[allow(clippy::too_many_arguments)]
    pub fn add_user(
        &self,
        name: &str,
        uid: Option<u32>,
        primary_gid: Option<u32>,
        home: Option<String>,
        shell: Option<String>,
        gecos: Option<String>,
    ) -> Result<User> {
        if self.user_names.contains_key(name) {
            return Err(Error::UserExists);
        }
        let uid = uid.unwrap_or_else(|| self.alloc_uid());
        if self.users.contains_key(&uid) {
            return Err(Error::UserExists);
        }

        let gid = match primary_gid {
            Some(g) => {
                if !self.groups.contains_key(&g) {
                    return Err(Error::GroupNotFound);
                }
                g
            }
            None => {
                let gid = self.alloc_gid();
                self.insert_group_raw(gid, name, Vec::new());
                gid
            }
        };

        let user = User {
            uid,
            name: name.to_string(),
            primary_gid: gid,
            home: home.unwrap_or_else(|| format!("/home/{name}")),
            shell: shell.unwrap_or_else(|| "/bin/sh".to_string()),
            gecos: gecos.unwrap_or_default(),
            password_hash: None,
            last_change_days: 0,
            min_age_days: 0,
            max_age_days: 99999,
            warn_days: 7,
            inactive_days: None,
            expire_day: None,
            locked: true,
        };
        self.insert_user_raw(user.clone());
        debug!(uid, name, "user added");
        Ok(user)
    }

    /// `usermod`: updates the mutable fields supplied as `Some`.
    pub fn modify_user(
        &self,
        name: &str,
        primary_gid: Option<u32>,
        home: Option<String>,
        shell: Option<String>,
        locked: Option<bool>,
    ) -> Result<()> {
        let uid = *self.user_names.get(name).ok_or(Error::UserNotFound)?;
        if let Some(gid) = primary_gid {
            if !self.groups.contains_key(&gid) {
                return Err(Error::GroupNotFound);
            }
        }
        let mut entry = self.users.get_mut(&uid).ok_or(Error::UserNotFound)?;
        if let Some(gid) = primary_gid {
            entry.primary_gid = gid;
        }
        if let Some(h) = home {
            entry.home = h;
        }
        if let Some(s) = shell {
            entry.shell = s;
        }
        if let Some(l) = locked {
            entry.locked = l;
        }
        Ok(())
    }

    /// `userdel`: removes the account and its supplementary memberships.
    /// Does not remove the account's primary group even if now unreferenced.
    pub fn remove_user(&self, name: &str) -> Result<()> {
        let uid = self.user_names.remove(name).map(|(_, v)| v).ok_or(Error::UserNotFound)?;
        self.users.remove(&uid);
        self.supplementary.remove(&uid);
        for mut group in self.groups.iter_mut() {
            group.members.retain(|m| m != name);
        }
        info!(uid, name, "user removed");
        Ok(())
    }

    /// `passwd`/`chpasswd`: sets the stored hash and resets the age clock.
    pub fn set_password(&self, name: &str, hash: String, today_days: i64) -> Result<()> {
        let uid = *self.user_names.get(name).ok_or(Error::UserNotFound)?;
        let mut entry = self.users.get_mut(&uid).ok_or(Error::UserNotFound)?;
        entry.password_hash = Some(hash);
        entry.last_change_days = today_days;
        entry.locked = false;
        Ok(())
    }

    /// `chage`: updates the password aging policy.
    pub fn set_age_policy(
        &self,
        name: &str,
        min_days: Option<u32>,
        max_days: Option<u32>,
        warn_days: Option<u32>,
        expire_day: Option<i64>,
    ) -> Result<()> {
        let uid = *self.user_names.get(name).ok_or(Error::UserNotFound)?;
        let mut entry = self.users.get_mut(&uid).ok_or(Error::UserNotFound)?;
        if let Some(min) = min_days {
            entry.min_age_days = min;
        }
        if let Some(max) = max_days {
            entry.max_age_days = max;
        }
        if let Some(warn) = warn_days {
            entry.warn_days = warn;
        }
        if expire_day.is_some() {
            entry.expire_day = expire_day;
        }
        Ok(())
    }

    /// `gpasswd -A`: replaces a group's administrator list.
    pub fn set_group_admins(&self, group: &str, admins: Vec<String>) -> Result<()> {
        for admin in &admins {
            if !self.user_names.contains_key(admin) {
                return Err(Error::UserNotFound);
            }
        }
        let gid = *self.group_names.get(group).ok_or(Error::GroupNotFound)?;
        let mut entry = self.groups.get_mut(&gid).ok_or(Error::GroupNotFound)?;
        entry.admins = admins;
        Ok(())
    }

    /// `groupadd`.
    pub fn add_group(&self, name: &str, gid: Option<u32>) -> Result<Group> {
        if self.group_names.contains_key(name) {
            return Err(Error::GroupExists);
        }
        let gid = gid.unwrap_or_else(|| self.alloc_gid());
        if self.groups.contains_key(&gid) {
            return Err(Error::GroupExists);
        }
        self.insert_group_raw(gid, name, Vec::new());
        Ok(self.group_by_gid(gid).expect("just inserted"))
    }

    /// `groupmod -n`: renames a group.
    pub fn rename_group(&self, name: &str, new_name: &str) -> Result<()> {
        let gid = self.group_names.remove(name).map(|(_, v)| v).ok_or(Error::GroupNotFound)?;
        self.group_names.insert(new_name.to_string(), gid);
        let mut entry = self.groups.get_mut(&gid).ok_or(Error::GroupNotFound)?;
        entry.name = new_name.to_string();
        Ok(())
    }

    /// `groupdel`: refuses to remove a group while it is any user's
    /// primary group or still has supplementary members.
    pub fn remove_group(&self, name: &str) -> Result<()> {
        let gid = *self.group_names.get(name).ok_or(Error::GroupNotFound)?;
        if self.users.iter().any(|u| u.primary_gid == gid) {
            return Err(Error::GroupNotEmpty);
        }
        let group = self.groups.get(&gid).ok_or(Error::GroupNotFound)?;
        if !group.members.is_empty() {
            return Err(Error::GroupNotEmpty);
        }
        drop(group);
        self.group_names.remove(name);
        self.groups.remove(&gid);
        Ok(())
    }

    /// `gpasswd -a` / `usermod -aG`: adds `user` as a supplementary member
    /// of `group`.
    pub fn add_to_group(&self, user: &str, group: &str) -> Result<()> {
        let uid = *self.user_names.get(user).ok_or(Error::UserNotFound)?;
        let gid = *self.group_names.get(group).ok_or(Error::GroupNotFound)?;
        let mut entry = self.groups.get_mut(&gid).ok_or(Error::GroupNotFound)?;
        if !entry.members.iter().any(|m| m == user) {
            entry.members.push(user.to_string());
        }
        drop(entry);
        let mut supp = self.supplementary.entry(uid).or_default();
        if !supp.contains(&gid) {
            supp.push(gid);
        }
        Ok(())
    }

    /// `gpasswd -d`: removes `user` from `group`'s supplementary members.
    pub fn remove_from_group(&self, user: &str, group: &str) -> Result<()> {
        let uid = *self.user_names.get(user).ok_or(Error::UserNotFound)?;
        let gid = *self.group_names.get(group).ok_or(Error::GroupNotFound)?;
        let mut entry = self.groups.get_mut(&gid).ok_or(Error::GroupNotFound)?;
        entry.members.retain(|m| m != user);
        drop(entry);
        if let Some(mut supp) = self.supplementary.get_mut(&uid) {
            supp.retain(|g| *g != gid);
        }
        Ok(())
    }

    /// Every gid `user` belongs to: primary first, then supplementary gids
    /// in the order they were added.
    pub fn groups_for_user(&self, user: &str) -> Result<Vec<u32>> {
        let uid = *self.user_names.get(user).ok_or(Error::UserNotFound)?;
        let primary = self.users.get(&uid).ok_or(Error::UserNotFound)?.primary_gid;
        let mut out = vec![primary];
        if let Some(supp) = self.supplementary.get(&uid) {
            out.extend(supp.iter().filter(|g| **g != primary));
        }
        Ok(out)
    }

    /// `sudo -l` / the root-only command gate: grants blanket sudo rights
    /// to members of the `sudo` group and anyone explicitly added here.
    pub fn grant_sudo(&self, user: &str) {
        self.sudoers.insert(user.to_string(), ());
    }

    pub fn can_sudo(&self, user: &str) -> bool {
        if user == "root" {
            return true;
        }
        if self.sudoers.contains_key(user) {
            return true;
        }
        self.groups_for_user(user)
            .map(|gids| gids.iter().any(|g| self.group_by_gid(*g).map(|g| g.name == "sudo").unwrap_or(false)))
            .unwrap_or(false)
    }

    /// Builds an `id`-style summary: primary uid/gid plus every group name
    /// the user belongs to, in membership order.
    pub fn id_summary(&self, user: &str) -> Result<(u32, u32, Vec<(u32, String)>)> {
        let uid = *self.user_names.get(user).ok_or(Error::UserNotFound)?;
        let gid = self.users.get(&uid).ok_or(Error::UserNotFound)?.primary_gid;
        let gids = self.groups_for_user(user)?;
        let named: BTreeMap<u32, String> =
            self.groups.iter().map(|g| (g.gid, g.name.clone())).collect();
        let groups = gids
            .into_iter()
            .map(|g| (g, named.get(&g).cloned().unwrap_or_else(|| g.to_string())))
            .collect();
        Ok((uid, gid, groups))
    }
}

/// Writes the current database onto `/etc/passwd`, `/etc/shadow` and
/// `/etc/group` inside `vfs`, overwriting whatever was there. Called after
/// every mutating operation in the shell's dispatch layer.
pub fn sync(manager: &UserGroupManager, vfs: &Vfs) {
    sync_to_filesystem(manager, vfs);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_seeds_root() {
        let mgr = UserGroupManager::bootstrap();
        let root = mgr.user_by_name("root").unwrap();
        assert_eq!(root.uid, 0);
        assert_eq!(root.primary_gid, 0);
        assert!(mgr.can_sudo("root"));
    }

    #[test]
    fn add_user_allocates_uid_and_own_group() {
        let mgr = UserGroupManager::bootstrap();
        let u = mgr.add_user("alice", None, None, None, None, None).unwrap();
        assert_eq!(u.uid, FIRST_UNPRIVILEGED_ID);
        let g = mgr.group_by_name("alice").unwrap();
        assert_eq!(g.gid, u.primary_gid);
    }

    #[test]
    fn add_user_rejects_duplicate_name() {
        let mgr = UserGroupManager::bootstrap();
        mgr.add_user("alice", None, None, None, None, None).unwrap();
        assert_eq!(mgr.add_user("alice", None, None, None, None, None).unwrap_err(), Error::UserExists);
    }

    #[test]
    fn supplementary_groups_round_trip() {
        let mgr = UserGroupManager::bootstrap();
        mgr.add_user("bob", None, None, None, None, None).unwrap();
        mgr.add_to_group("bob", "sudo").unwrap();
        assert!(mgr.can_sudo("bob"));
        mgr.remove_from_group("bob", "sudo").unwrap();
        assert!(!mgr.can_sudo("bob"));
    }

    #[test]
    fn groupdel_refuses_primary_group() {
        let mgr = UserGroupManager::bootstrap();
        let u = mgr.add_user("carol", None, None, None, None, None).unwrap();
        let g = mgr.group_by_gid(u.primary_gid).unwrap();
        assert_eq!(mgr.remove_group(&g.name).unwrap_err(), Error::GroupNotEmpty);
    }

    #[test]
    fn sync_writes_etc_files() {
        let mgr = UserGroupManager::bootstrap();
        mgr.add_user("dan", None, None, None, None, None).unwrap();
        let vfs = Vfs::new_empty(0, 0);
        sync(&mgr, &vfs);
        let passwd = String::from_utf8(vfs.read_file("/etc/passwd", "/").unwrap()).unwrap();
        assert!(passwd.contains("dan:x:"));
        let shadow = String::from_utf8(vfs.read_file("/etc/shadow", "/").unwrap()).unwrap();
        assert!(shadow.contains("dan:!"));
    }
}
