//! Account and group administration commands.

use crate::shell::context::ShellContext;
use crate::usergroup;

use super::CommandResult;

/// A deterministic placeholder hash.
fn placeholder_hash(password: &str) -> String {
    let mut acc: u64 = 0x1505;
    for b in password.bytes() {
        acc = acc.wrapping_mul(33).wrapping_add(b as u64);
    }
    format!("$6${acc:016x}")
}

pub fn useradd(ctx: &mut ShellContext, args: &[String], _stdin: Option<&str>) -> CommandResult {
    let mut make_home = false;
    let mut shell = None;
    let mut home = None;
    let mut gecos = None;
    let mut name = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-m" => make_home = true,
            "-s" => {
                shell = args.get(i + 1).cloned();
                i += 1;
            }
            "-d" => {
                home = args.get(i + 1).cloned();
                i += 1;
            }
            "-c" => {
                gecos = args.get(i + 1).cloned();
                i += 1;
            }
            other => name = Some(other.to_string()),
        }
        i += 1;
    }
    let Some(name) = name else {
        return ("useradd: missing operand\n".to_string(), 1);
    };

    match ctx.users.add_user(&name, None, None, home.clone(), shell, gecos) {
        Ok(user) => {
            if make_home {
                let home_path = home.unwrap_or(user.home.clone());
                let _ = ctx.vfs.mkdirp(&home_path, Some(0o755), "/", user.uid, user.primary_gid, 0o022);
                for dotfile in [".bashrc", ".bash_logout", ".profile"] {
                    let path = format!("{}/{}", home_path.trim_end_matches('/'), dotfile);
                    let _ = ctx.vfs.touch(&path, "/", user.uid, user.primary_gid, 0o022);
                }
                let _ = ctx.vfs.chown(&home_path, Some(user.uid), Some(user.primary_gid), true, "/");
            }
            usergroup::sync(&ctx.users, &ctx.vfs);
            (String::new(), 0)
        }
        Err(e) => (format!("useradd: {e}\n"), 1),
    }
}

pub fn usermod(ctx: &mut ShellContext, args: &[String], _stdin: Option<&str>) -> CommandResult {
    let mut shell = None;
    let mut home = None;
    let mut append_group = None;
    let mut name = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-s" => {
                shell = args.get(i + 1).cloned();
                i += 1;
            }
            "-d" => {
                home = args.get(i + 1).cloned();
                i += 1;
            }
            "-aG" | "-G" => {
                append_group = args.get(i + 1).cloned();
                i += 1;
            }
            other => name = Some(other.to_string()),
        }
        i += 1;
    }
    let Some(name) = name else {
        return ("usermod: missing operand\n".to_string(), 1);
    };

    if let Some(group) = append_group {
        if let Err(e) = ctx.users.add_to_group(&name, &group) {
            return (format!("usermod: {e}\n"), 1);
        }
    }
    match ctx.users.modify_user(&name, None, home, shell, None) {
        Ok(()) => {
            usergroup::sync(&ctx.users, &ctx.vfs);
            (String::new(), 0)
        }
        Err(e) => (format!("usermod: {e}\n"), 1),
    }
}

pub fn userdel(ctx: &mut ShellContext, args: &[String], _stdin: Option<&str>) -> CommandResult {
    let Some(name) = args.iter().find(|a| !a.starts_with('-')) else {
        return ("userdel: missing operand\n".to_string(), 1);
    };
    match ctx.users.remove_user(name) {
        Ok(()) => {
            usergroup::sync(&ctx.users, &ctx.vfs);
            (String::new(), 0)
        }
        Err(e) => (format!("userdel: {e}\n"), 1),
    }
}

pub fn passwd(ctx: &mut ShellContext, args: &[String], _stdin: Option<&str>) -> CommandResult {
    let name = args.first().cloned().unwrap_or_else(|| ctx.user.clone());
    match ctx.users.set_password(&name, placeholder_hash(&name), 0) {
        Ok(()) => {
            usergroup::sync(&ctx.users, &ctx.vfs);
            (format!("passwd: password updated successfully for {name}\n"), 0)
        }
        Err(e) => (format!("passwd: {e}\n"), 1),
    }
}

pub fn chpasswd(ctx: &mut ShellContext, _args: &[String], stdin: Option<&str>) -> CommandResult {
    let mut code = 0;
    for line in stdin.unwrap_or_default().lines() {
        if let Some((name, pass)) = line.split_once(':') {
            if ctx.users.set_password(name, placeholder_hash(pass), 0).is_err() {
                code = 1;
            }
        }
    }
    usergroup::sync(&ctx.users, &ctx.vfs);
    (String::new(), code)
}

pub fn chage(ctx: &mut ShellContext, args: &[String], _stdin: Option<&str>) -> CommandResult {
    let mut min = None;
    let mut max = None;
    let mut warn = None;
    let mut expire = None;
    let mut name = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-m" => {
                min = args.get(i + 1).and_then(|s| s.parse().ok());
                i += 1;
            }
            "-M" => {
                max = args.get(i + 1).and_then(|s| s.parse().ok());
                i += 1;
            }
            "-W" => {
                warn = args.get(i + 1).and_then(|s| s.parse().ok());
                i += 1;
            }
            "-E" => {
                expire = args.get(i + 1).and_then(|s| s.parse().ok());
                i += 1;
            }
            other => name = Some(other.to_string()),
        }
        i += 1;
    }
    let Some(name) = name else {
        return ("chage: missing operand\n".to_string(), 1);
    };
    match ctx.users.set_age_policy(&name, min, max, warn, expire) {
        Ok(()) => {
            usergroup::sync(&ctx.users, &ctx.vfs);
            (String::new(), 0)
        }
        Err(e) => (format!("chage: {e}\n"), 1),
    }
}

pub fn groupadd(ctx: &mut ShellContext, args: &[String], _stdin: Option<&str>) -> CommandResult {
    let Some(name) = args.iter().find(|a| !a.starts_with('-')) else {
        return ("groupadd: missing operand\n".to_string(), 1);
    };
    match ctx.users.add_group(name, None) {
        Ok(_) => {
            usergroup::sync(&ctx.users, &ctx.vfs);
            (String::new(), 0)
        }
        Err(e) => (format!("groupadd: {e}\n"), 1),
    }
}

pub fn groupmod(ctx: &mut ShellContext, args: &[String], _stdin: Option<&str>) -> CommandResult {
    let mut new_name = None;
    let mut name = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-n" => {
                new_name = args.get(i + 1).cloned();
                i += 1;
            }
            other => name = Some(other.to_string()),
        }
        i += 1;
    }
    let (Some(name), Some(new_name)) = (name, new_name) else {
        return ("groupmod: missing operand\n".to_string(), 1);
    };
    match ctx.users.rename_group(&name, &new_name) {
        Ok(()) => {
            usergroup::sync(&ctx.users, &ctx.vfs);
            (String::new(), 0)
        }
        Err(e) => (format!("groupmod: {e}\n"), 1),
    }
}

pub fn groupdel(ctx: &mut ShellContext, args: &[String], _stdin: Option<&str>) -> CommandResult {
    let Some(name) = args.first() else {
        return ("groupdel: missing operand\n".to_string(), 1);
    };
    match ctx.users.remove_group(name) {
        Ok(()) => {
            usergroup::sync(&ctx.users, &ctx.vfs);
            (String::new(), 0)
        }
        Err(e) => (format!("groupdel: {e}\n"), 1),
    }
}

pub fn gpasswd(ctx: &mut ShellContext, args: &[String], _stdin: Option<&str>) -> CommandResult {
    let mut add_user = None;
    let mut del_user = None;
    let mut admins = None;
    let mut group = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-a" => {
                add_user = args.get(i + 1).cloned();
                i += 1;
            }
            "-d" => {
                del_user = args.get(i + 1).cloned();
                i += 1;
            }
            "-A" => {
                admins = args.get(i + 1).cloned();
                i += 1;
            }
            other => group = Some(other.to_string()),
        }
        i += 1;
    }
    let Some(group) = group else {
        return ("gpasswd: missing operand\n".to_string(), 1);
    };
    let result = if let Some(user) = add_user {
        ctx.users.add_to_group(&user, &group)
    } else if let Some(user) = del_user {
        ctx.users.remove_from_group(&user, &group)
    } else if let Some(admins) = admins {
        let list: Vec<String> = admins.split(',').map(|s| s.trim().to_string()).collect();
        ctx.users.set_group_admins(&group, list)
    } else {
        return ("gpasswd: missing operand\n".to_string(), 1);
    };
    match result {
        Ok(()) => {
            usergroup::sync(&ctx.users, &ctx.vfs);
            (String::new(), 0)
        }
        Err(e) => (format!("gpasswd: {e}\n"), 1),
    }
}

pub fn id(ctx: &mut ShellContext, args: &[String], _stdin: Option<&str>) -> CommandResult {
    let name = args.first().cloned().unwrap_or_else(|| ctx.user.clone());
    match ctx.users.id_summary(&name) {
        Ok((uid, gid, groups)) => {
            let gid_name = ctx.users.group_by_gid(gid).map(|g| g.name).unwrap_or_default();
            let groups_str: Vec<String> = groups.iter().map(|(g, n)| format!("{g}({n})")).collect();
            (
                format!("uid={uid}({name}) gid={gid}({gid_name}) groups={}\n", groups_str.join(",")),
                0,
            )
        }
        Err(e) => (format!("id: {e}\n"), 1),
    }
}

pub fn whoami(ctx: &mut ShellContext, _args: &[String], _stdin: Option<&str>) -> CommandResult {
    (format!("{}\n", ctx.user), 0)
}

pub fn groups(ctx: &mut ShellContext, args: &[String], _stdin: Option<&str>) -> CommandResult {
    let name = args.first().cloned().unwrap_or_else(|| ctx.user.clone());
    match ctx.users.groups_for_user(&name) {
        Ok(gids) => {
            let names: Vec<String> =
                gids.iter().map(|g| ctx.users.group_by_gid(*g).map(|g| g.name).unwrap_or_default()).collect();
            (format!("{}\n", names.join(" ")), 0)
        }
        Err(e) => (format!("groups: {e}\n"), 1),
    }
}

pub fn who(ctx: &mut ShellContext, _args: &[String], _stdin: Option<&str>) -> CommandResult {
    (format!("{}        pts/0        \n", ctx.user), 0)
}

pub fn w(ctx: &mut ShellContext, _args: &[String], _stdin: Option<&str>) -> CommandResult {
    (format!(" USER     TTY      LOGIN@   WHAT\n{:<8} pts/0    -        -sh\n", ctx.user), 0)
}

pub fn last(_ctx: &mut ShellContext, _args: &[String], _stdin: Option<&str>) -> CommandResult {
    ("wtmp begins\n".to_string(), 0)
}

pub fn getent(ctx: &mut ShellContext, args: &[String], _stdin: Option<&str>) -> CommandResult {
    let Some(database) = args.first() else {
        return ("getent: missing operand\n".to_string(), 1);
    };
    let key = args.get(1);

    match database.as_str() {
        "passwd" => {
            let users = match key {
                Some(k) => ctx.users.user_by_name(k).into_iter().collect(),
                None => ctx.users.all_users(),
            };
            let out: String = users
                .iter()
                .map(|u| format!("{}:x:{}:{}:{}:{}:{}\n", u.name, u.uid, u.primary_gid, u.gecos, u.home, u.shell))
                .collect();
            (out, 0)
        }
        "group" => {
            let groups = match key {
                Some(k) => ctx.users.group_by_name(k).into_iter().collect(),
                None => ctx.users.all_groups(),
            };
            let out: String =
                groups.iter().map(|g| format!("{}:x:{}:{}\n", g.name, g.gid, g.members.join(","))).collect();
            (out, 0)
        }
        other => (format!("getent: unknown database: {other}\n"), 1),
    }
}

pub fn sudo_list(ctx: &mut ShellContext, _args: &[String], _stdin: Option<&str>) -> CommandResult {
    if ctx.users.can_sudo(&ctx.user) {
        (format!("User {} may run the following commands:\n    (ALL) ALL\n", ctx.user), 0)
    } else {
        (format!("Sorry, user {} may not run sudo.\n", ctx.user), 1)
    }
}
