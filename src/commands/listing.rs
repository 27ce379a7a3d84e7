//! Directory listing, inode inspection, and recursive search.

use crate::shell::context::ShellContext;
use crate::usergroup::UserGroupManager;
use crate::vfs::{self, FindCriteria, Inode, Type, Vfs};

use super::CommandResult;

struct LsFlags {
    long: bool,
    all: bool,
    inode: bool,
    size_sort: bool,
    time_sort: bool,
    recursive: bool,
    dir_itself: bool,
    classify: bool,
    one_per_line: bool,
}

fn parse_ls_flags(args: &[String]) -> (LsFlags, Vec<String>) {
    let mut flags = LsFlags {
        long: false,
        all: false,
        inode: false,
        size_sort: false,
        time_sort: false,
        recursive: false,
        dir_itself: false,
        classify: false,
        one_per_line: false,
    };
    let mut targets = Vec::new();
    for a in args {
        if let Some(letters) = a.strip_prefix('-').filter(|s| !s.is_empty() && !s.starts_with('-')) {
            for c in letters.chars() {
                match c {
                    'l' => flags.long = true,
                    'a' => flags.all = true,
                    'i' => flags.inode = true,
                    'S' => flags.size_sort = true,
                    't' => flags.time_sort = true,
                    'R' => flags.recursive = true,
                    'd' => flags.dir_itself = true,
                    'F' => flags.classify = true,
                    '1' => flags.one_per_line = true,
                    _ => {}
                }
            }
        } else {
            targets.push(a.clone());
        }
    }
    (flags, targets)
}

fn username(users: &UserGroupManager, uid: u32) -> String {
    users.user_by_uid(uid).map(|u| u.name).unwrap_or_else(|| uid.to_string())
}

fn groupname(users: &UserGroupManager, gid: u32) -> String {
    users.group_by_gid(gid).map(|g| g.name).unwrap_or_else(|| gid.to_string())
}

fn classify_suffix(inode: &Inode) -> &'static str {
    match inode.file_type {
        Type::Directory => "/",
        Type::Symlink => "@",
        Type::Fifo => "|",
        _ => "",
    }
}

fn format_long_entry(
    vfs: &Vfs,
    users: &UserGroupManager,
    name: &str,
    inode: &Inode,
    classify: bool,
    widths: &ColumnWidths,
) -> String {
    let perm = vfs::format_permissions(inode);
    let owner = username(users, inode.uid);
    let group = groupname(users, inode.gid);
    let date = crate::timefmt::ls_stamp(inode.mtime.seconds, vfs.clock_now().seconds);
    let suffix = if classify { classify_suffix(inode) } else { "" };
    let target = if inode.file_type == Type::Symlink {
        format!(" -> {}", inode.symlink_target.clone().unwrap_or_default())
    } else {
        String::new()
    };
    format!(
        "{perm} {links:>lw$} {owner:<ow$} {group:<gw$} {size:>sw$} {date} {name}{suffix}{target}",
        links = inode.link_count,
        size = inode.size(),
        lw = widths.links,
        ow = widths.owner,
        gw = widths.group,
        sw = widths.size,
    )
}

/// Aligned column widths for one long-format listing.
struct ColumnWidths {
    links: usize,
    owner: usize,
    group: usize,
    size: usize,
}

impl ColumnWidths {
    fn single() -> Self {
        ColumnWidths { links: 1, owner: 1, group: 1, size: 1 }
    }

    fn measure(users: &UserGroupManager, entries: &[(String, Inode)]) -> Self {
        let mut widths = ColumnWidths { links: 1, owner: 1, group: 1, size: 1 };
        for (_, inode) in entries {
            widths.links = widths.links.max(inode.link_count.to_string().len());
            widths.owner = widths.owner.max(username(users, inode.uid).len());
            widths.group = widths.group.max(groupname(users, inode.gid).len());
            widths.size = widths.size.max(inode.size().to_string().len());
        }
        widths
    }
}

/// Column-major layout of bare names for an 80-column terminal.
fn columnise(names: &[String]) -> String {
    const TERM_WIDTH: usize = 80;
    if names.is_empty() {
        return String::new();
    }
    let widest = names.iter().map(|n| n.len()).max().unwrap_or(0) + 2;
    let columns = (TERM_WIDTH / widest).max(1);
    let rows = names.len().div_ceil(columns);

    let mut out = String::new();
    for row in 0..rows {
        for col in 0..columns {
            let idx = col * rows + row;
            if let Some(name) = names.get(idx) {
                let last_in_row = col + 1 == columns || (col + 1) * rows + row >= names.len();
                if last_in_row {
                    out.push_str(name);
                } else {
                    out.push_str(&format!("{name:<widest$}"));
                }
            }
        }
        out.push('\n');
    }
    out
}

pub fn ls(ctx: &mut ShellContext, args: &[String], _stdin: Option<&str>) -> CommandResult {
    let (flags, targets) = parse_ls_flags(args);
    let targets: Vec<String> = if targets.is_empty() {
        vec![ctx.cwd.clone()]
    } else {
        targets.iter().flat_map(|t| ctx.vfs.glob_expand(t, &ctx.cwd)).collect()
    };

    let mut out = String::new();
    let multiple = targets.len() > 1 || flags.recursive;

    for (idx, target) in targets.iter().enumerate() {
        let abs = vfs::normalise(target, &ctx.cwd);
        let id = match ctx.vfs.resolve(&abs, true) {
            Ok(id) => id,
            Err(e) => {
                out.push_str(&format!("ls: cannot access '{target}': {e}\n"));
                continue;
            }
        };
        let inode = ctx.vfs.inode(id).unwrap();

        if flags.dir_itself || !inode.is_dir() {
            if flags.long {
                out.push_str(&format_long_entry(
                    &ctx.vfs,
                    &ctx.users,
                    target,
                    &inode,
                    flags.classify,
                    &ColumnWidths::single(),
                ));
                out.push('\n');
            } else {
                out.push_str(target);
                out.push('\n');
            }
            continue;
        }

        if multiple {
            out.push_str(&format!("{target}:\n"));
        }

        let mut entries = match ctx.vfs.list_dir(&abs, &ctx.cwd) {
            Ok(e) => e,
            Err(e) => {
                out.push_str(&format!("ls: cannot access '{target}': {e}\n"));
                continue;
            }
        };
        if flags.all {
            entries.insert(0, ("..".to_string(), id));
            entries.insert(0, (".".to_string(), id));
        }

        let mut with_inodes: Vec<(String, Inode)> = entries
            .into_iter()
            .filter(|(name, _)| flags.all || !name.starts_with('.'))
            .filter_map(|(name, cid)| ctx.vfs.inode(cid).map(|i| (name, i)))
            .collect();

        if flags.size_sort {
            with_inodes.sort_by(|a, b| b.1.size().cmp(&a.1.size()));
        } else if flags.time_sort {
            with_inodes.sort_by(|a, b| b.1.mtime.cmp(&a.1.mtime));
        } else {
            with_inodes.sort_by(|a, b| a.0.cmp(&b.0));
        }

        if flags.long {
            let widths = ColumnWidths::measure(&ctx.users, &with_inodes);
            for (name, inode) in &with_inodes {
                if flags.inode {
                    out.push_str(&format!("{:>8} ", inode.id));
                }
                out.push_str(&format_long_entry(
                    &ctx.vfs,
                    &ctx.users,
                    name,
                    inode,
                    flags.classify,
                    &widths,
                ));
                out.push('\n');
            }
        } else {
            let names: Vec<String> = with_inodes
                .iter()
                .map(|(name, inode)| {
                    let suffix = if flags.classify { classify_suffix(inode) } else { "" };
                    if flags.inode {
                        format!("{} {name}{suffix}", inode.id)
                    } else {
                        format!("{name}{suffix}")
                    }
                })
                .collect();
            if flags.one_per_line {
                for name in &names {
                    out.push_str(name);
                    out.push('\n');
                }
            } else {
                out.push_str(&columnise(&names));
            }
        }

        if flags.recursive {
            let flag_args: Vec<String> = args.iter().filter(|a| a.starts_with('-')).cloned().collect();
            for (name, inode) in &with_inodes {
                if inode.is_dir() && name != "." && name != ".." {
                    let child_path = format!("{}/{}", abs.trim_end_matches('/'), name);
                    let mut sub_args = flag_args.clone();
                    sub_args.push(child_path);
                    let (sub_out, _) = ls(ctx, &sub_args, None);
                    out.push_str("\n");
                    out.push_str(&sub_out);
                }
            }
        }

        if idx + 1 < targets.len() {
            out.push('\n');
        }
    }

    (out, 0)
}

fn stat_time(secs: i64) -> String {
    let c = crate::timefmt::civil_from_epoch(secs);
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.000000000 +0000",
        c.year, c.month, c.day, c.hour, c.minute, c.second
    )
}

fn format_stat_field(inode: &Inode, users: &UserGroupManager, name: &str, spec: char) -> String {
    match spec {
        'n' => name.to_string(),
        'U' => username(users, inode.uid),
        'G' => groupname(users, inode.gid),
        'a' => format!("{:o}", inode.mode.bits()),
        'i' => inode.id.to_string(),
        's' => inode.size().to_string(),
        'h' => inode.link_count.to_string(),
        'F' => match inode.file_type {
            Type::File => "regular file".to_string(),
            Type::Directory => "directory".to_string(),
            Type::Symlink => "symbolic link".to_string(),
            Type::Fifo => "fifo".to_string(),
            Type::CharDevice => "character special file".to_string(),
        },
        'A' => vfs::format_permissions(inode),
        other => other.to_string(),
    }
}

pub fn stat(ctx: &mut ShellContext, args: &[String], _stdin: Option<&str>) -> CommandResult {
    let mut format: Option<String> = None;
    let mut targets = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "-c" {
            format = args.get(i + 1).cloned();
            i += 1;
        } else {
            targets.push(args[i].clone());
        }
        i += 1;
    }

    let mut out = String::new();
    let mut code = 0;
    for t in &targets {
        let abs = vfs::normalise(t, &ctx.cwd);
        let id = match ctx.vfs.resolve(&abs, true) {
            Ok(id) => id,
            Err(e) => {
                out.push_str(&format!("stat: cannot stat '{t}': {e}\n"));
                code = 1;
                continue;
            }
        };
        let inode = ctx.vfs.inode(id).unwrap();

        if let Some(fmt) = &format {
            let mut line = String::new();
            let mut chars = fmt.chars().peekable();
            while let Some(c) = chars.next() {
                if c == '%' {
                    if let Some(spec) = chars.next() {
                        line.push_str(&format_stat_field(&inode, &ctx.users, t, spec));
                    }
                } else {
                    line.push(c);
                }
            }
            line.push('\n');
            out.push_str(&line);
        } else {
            out.push_str(&format!("  File: {t}\n"));
            out.push_str(&format!(
                "  Size: {:<10}  Blocks: {:<5}  IO Block: 4096  {}\n",
                inode.size(),
                (inode.size() + 511) / 512,
                format_stat_field(&inode, &ctx.users, t, 'F')
            ));
            out.push_str(&format!(
                "Device: 0h/0d\tInode: {}   Links: {}\n",
                inode.id, inode.link_count
            ));
            out.push_str(&format!(
                "Access: ({:o}/{})  Uid: ({:>5}/{:>8})   Gid: ({:>5}/{:>8})\n",
                inode.mode.bits(),
                vfs::format_permissions(&inode),
                inode.uid,
                username(&ctx.users, inode.uid),
                inode.gid,
                groupname(&ctx.users, inode.gid)
            ));
            out.push_str(&format!("Access: {}\n", stat_time(inode.atime.seconds)));
            out.push_str(&format!("Modify: {}\n", stat_time(inode.mtime.seconds)));
            out.push_str(&format!("Change: {}\n", stat_time(inode.ctime.seconds)));
        }
    }
    (out, code)
}

pub fn find(ctx: &mut ShellContext, args: &[String], _stdin: Option<&str>) -> CommandResult {
    let mut start = ".".to_string();
    let mut criteria = FindCriteria::default();
    let mut exec_args: Option<Vec<String>> = None;
    let mut positional_consumed = false;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-name" => {
                criteria.name_glob = args.get(i + 1).cloned();
                i += 1;
            }
            "-type" => {
                criteria.file_type = match args.get(i + 1).map(|s| s.as_str()) {
                    Some("f") => Some(Type::File),
                    Some("d") => Some(Type::Directory),
                    Some("l") => Some(Type::Symlink),
                    Some("p") => Some(Type::Fifo),
                    Some("c") => Some(Type::CharDevice),
                    _ => None,
                };
                i += 1;
            }
            "-empty" => criteria.empty = Some(true),
            "-user" => {
                criteria.uid = args.get(i + 1).and_then(|n| ctx.users.user_by_name(n)).map(|u| u.uid);
                i += 1;
            }
            "-group" => {
                criteria.gid = args.get(i + 1).and_then(|n| ctx.users.group_by_name(n)).map(|g| g.gid);
                i += 1;
            }
            "-mtime" => {
                if let Some(days) = args.get(i + 1).and_then(|s| s.parse::<i64>().ok()) {
                    let now = ctx.vfs.clock_now().seconds;
                    let window_start = now - (days + 1) * 86400;
                    let window_end = now - days * 86400;
                    criteria.mtime_window = Some((window_start, window_end));
                }
                i += 1;
            }
            "-exec" => {
                let rest = &args[i + 1..];
                let end = rest.iter().position(|a| a == ";" || a == "\\;").unwrap_or(rest.len());
                exec_args = Some(rest[..end].to_vec());
                i += end;
            }
            other if !other.starts_with('-') && !positional_consumed => {
                start = other.to_string();
                positional_consumed = true;
            }
            _ => {}
        }
        i += 1;
    }

    let results = match ctx.vfs.find(&start, &criteria, &ctx.cwd) {
        Ok(r) => r,
        Err(e) => return (format!("find: '{start}': {e}\n"), 1),
    };

    if let Some(template) = exec_args {
        let mut out = String::new();
        for path in &results {
            let substituted: Vec<String> =
                template.iter().map(|a| if a == "{}" { path.clone() } else { a.clone() }).collect();
            if let Some((cmd, rest)) = substituted.split_first() {
                let (sub_out, _) = super::dispatch(ctx, cmd, rest, None);
                out.push_str(&sub_out);
            }
        }
        return (out, 0);
    }

    let mut out = results.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    (out, 0)
}
