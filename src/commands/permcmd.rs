//! `chmod`/`chown`/`chgrp`.

use crate::shell::context::ShellContext;
use crate::vfs::Mode;

use super::CommandResult;

/// Parses either an octal mode (`755`, `4755`) or a single symbolic clause
/// (`u+s`, `g-w`, `o=r`, `a+x`, `+t`) against `current`.
fn parse_mode(spec: &str, current: u32) -> Option<u32> {
    if spec.chars().all(|c| c.is_ascii_digit()) {
        return u32::from_str_radix(spec, 8).ok();
    }

    let mut who_mask = 0u32;
    let mut chars = spec.chars().peekable();
    let mut who = String::new();
    while let Some(&c) = chars.peek() {
        if matches!(c, 'u' | 'g' | 'o' | 'a') {
            who.push(c);
            chars.next();
        } else {
            break;
        }
    }
    for c in who.chars() {
        who_mask |= match c {
            'u' => 0o700 | Mode::SETUID,
            'g' => 0o070 | Mode::SETGID,
            'o' => 0o007,
            'a' => 0o777 | Mode::SETUID | Mode::SETGID | Mode::STICKY,
            _ => 0,
        };
    }
    if who.is_empty() {
        who_mask = 0o777 | Mode::SETUID | Mode::SETGID | Mode::STICKY;
    }

    let op = chars.next()?;
    let perms: String = chars.collect();
    let mut bits = 0u32;
    for c in perms.chars() {
        bits |= match c {
            'r' => 0o444,
            'w' => 0o222,
            'x' => 0o111,
            's' => Mode::SETUID | Mode::SETGID,
            't' => Mode::STICKY,
            _ => 0,
        };
    }
    let applied = bits & who_mask;

    Some(match op {
        '+' => current | applied,
        '-' => current & !applied,
        '=' => (current & !who_mask) | applied,
        _ => current,
    })
}

pub fn chmod(ctx: &mut ShellContext, args: &[String], _stdin: Option<&str>) -> CommandResult {
    let mut recursive = false;
    let mut spec = None;
    let mut targets = Vec::new();
    for a in args {
        if a == "-R" || a == "--recursive" {
            recursive = true;
        } else if spec.is_none() {
            spec = Some(a.clone());
        } else {
            targets.push(a.clone());
        }
    }
    let Some(spec) = spec else {
        return ("chmod: missing operand\n".to_string(), 1);
    };

    let mut out = String::new();
    let mut code = 0;
    for t in &targets {
        let abs = crate::vfs::normalise(t, &ctx.cwd);
        let current = match ctx.vfs.resolve(&abs, true).ok().and_then(|id| ctx.vfs.inode(id)) {
            Some(inode) => inode.mode.bits(),
            None => {
                out.push_str(&format!("chmod: cannot access '{t}': No such file or directory\n"));
                code = 1;
                continue;
            }
        };
        let Some(mode) = parse_mode(&spec, current) else {
            out.push_str(&format!("chmod: invalid mode: '{spec}'\n"));
            code = 1;
            continue;
        };
        if let Err(e) = ctx.vfs.chmod(t, mode, recursive, &ctx.cwd) {
            out.push_str(&format!("chmod: changing permissions of '{t}': {e}\n"));
            code = 1;
        }
    }
    (out, code)
}

pub fn chown(ctx: &mut ShellContext, args: &[String], _stdin: Option<&str>) -> CommandResult {
    let mut recursive = false;
    let mut spec = None;
    let mut targets = Vec::new();
    for a in args {
        if a == "-R" || a == "--recursive" {
            recursive = true;
        } else if spec.is_none() {
            spec = Some(a.clone());
        } else {
            targets.push(a.clone());
        }
    }
    let Some(spec) = spec else {
        return ("chown: missing operand\n".to_string(), 1);
    };
    let (user_part, group_part) = match spec.split_once(':') {
        Some((u, g)) => (Some(u), Some(g)),
        None => (Some(spec.as_str()), None),
    };
    let uid = user_part.filter(|s| !s.is_empty()).and_then(|n| ctx.users.user_by_name(n)).map(|u| u.uid);
    let gid = group_part.filter(|s| !s.is_empty()).and_then(|n| ctx.users.group_by_name(n)).map(|g| g.gid);

    let mut out = String::new();
    let mut code = 0;
    for t in &targets {
        if let Err(e) = ctx.vfs.chown(t, uid, gid, recursive, &ctx.cwd) {
            out.push_str(&format!("chown: changing ownership of '{t}': {e}\n"));
            code = 1;
        }
    }
    (out, code)
}

pub fn chgrp(ctx: &mut ShellContext, args: &[String], _stdin: Option<&str>) -> CommandResult {
    let mut recursive = false;
    let mut group = None;
    let mut targets = Vec::new();
    for a in args {
        if a == "-R" || a == "--recursive" {
            recursive = true;
        } else if group.is_none() {
            group = Some(a.clone());
        } else {
            targets.push(a.clone());
        }
    }
    let Some(group) = group else {
        return ("chgrp: missing operand\n".to_string(), 1);
    };
    let gid = ctx.users.group_by_name(&group).map(|g| g.gid);
    if gid.is_none() {
        return (format!("chgrp: invalid group: '{group}'\n"), 1);
    }

    let mut out = String::new();
    let mut code = 0;
    for t in &targets {
        if let Err(e) = ctx.vfs.chown(t, None, gid, recursive, &ctx.cwd) {
            out.push_str(&format!("chgrp: changing group of '{t}': {e}\n"));
            code = 1;
        }
    }
    (out, code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbolic_setuid_on_execute() {
        assert_eq!(parse_mode("u+s", 0o755).unwrap() & Mode::SETUID, Mode::SETUID);
    }

    #[test]
    fn octal_mode_parses_directly() {
        assert_eq!(parse_mode("4755", 0).unwrap(), 0o4755);
    }

    #[test]
    fn symbolic_minus_clears_bits() {
        assert_eq!(parse_mode("g-w", 0o775).unwrap(), 0o715);
    }
}
