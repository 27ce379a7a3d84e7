//! File manipulation commands deferring to [`crate::vfs::Vfs`] operations.

use crate::shell::context::ShellContext;
use crate::vfs;

use super::CommandResult;

fn glob_args(ctx: &ShellContext, args: &[String]) -> Vec<String> {
    args.iter().flat_map(|a| ctx.vfs.glob_expand(a, &ctx.cwd)).collect()
}

pub fn cat(ctx: &mut ShellContext, args: &[String], stdin: Option<&str>) -> CommandResult {
    let files = glob_args(ctx, args);
    if files.is_empty() {
        return (stdin.unwrap_or_default().to_string(), 0);
    }
    let mut out = String::new();
    let mut code = 0;
    for f in files {
        if let Err(e) = ctx.vfs.check_access(&f, &ctx.cwd, ctx.uid, ctx.gid, vfs::Access::Read) {
            out.push_str(&format!("cat: {f}: {e}\n"));
            code = 1;
            continue;
        }
        match ctx.vfs.read_file(&f, &ctx.cwd) {
            Ok(bytes) => out.push_str(&String::from_utf8_lossy(&bytes)),
            Err(e) => {
                out.push_str(&format!("cat: {f}: {e}\n"));
                code = 1;
            }
        }
    }
    (out, code)
}

pub fn echo(ctx: &mut ShellContext, args: &[String], _stdin: Option<&str>) -> CommandResult {
    let mut interpret_escapes = false;
    let mut no_newline = false;
    let mut words: Vec<&str> = Vec::new();
    for a in args {
        match a.as_str() {
            "-e" => interpret_escapes = true,
            "-n" => no_newline = true,
            "-E" => interpret_escapes = false,
            other => words.push(other),
        }
    }
    let joined = words.join(" ");
    let expanded = ctx.expand_vars(&joined);
    let mut out = if interpret_escapes { interpret_backslashes(&expanded) } else { expanded };
    if !no_newline {
        out.push('\n');
    }
    (out, 0)
}

fn interpret_backslashes(s: &str) -> String {
    let mut out = String::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('0') => out.push('\0'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

pub fn cp(ctx: &mut ShellContext, args: &[String], _stdin: Option<&str>) -> CommandResult {
    if args.len() < 2 {
        return ("cp: missing file operand\n".to_string(), 1);
    }
    let (srcs, dst) = args.split_at(args.len() - 1);
    let dst = &dst[0];
    let mut code = 0;
    let mut out = String::new();
    for src in srcs {
        let expanded = ctx.vfs.glob_expand(src, &ctx.cwd);
        for s in expanded {
            match ctx.vfs.read_file(&s, &ctx.cwd) {
                Ok(content) => {
                    let target = resolve_copy_target(ctx, &s, dst);
                    if let Err(e) = ctx.vfs.write_file(&target, &content, false, &ctx.cwd, ctx.uid, ctx.gid, ctx.umask) {
                        out.push_str(&format!("cp: cannot create '{target}': {e}\n"));
                        code = 1;
                    }
                }
                Err(e) => {
                    out.push_str(&format!("cp: cannot stat '{s}': {e}\n"));
                    code = 1;
                }
            }
        }
    }
    (out, code)
}

fn resolve_copy_target(ctx: &ShellContext, src: &str, dst: &str) -> String {
    let dst_abs = vfs::normalise(dst, &ctx.cwd);
    if let Ok(id) = ctx.vfs.resolve(&dst_abs, true) {
        if ctx.vfs.inode(id).map(|i| i.is_dir()).unwrap_or(false) {
            let base = src.rsplit('/').next().unwrap_or(src);
            return format!("{}/{}", dst_abs.trim_end_matches('/'), base);
        }
    }
    dst_abs
}

pub fn mv(ctx: &mut ShellContext, args: &[String], _stdin: Option<&str>) -> CommandResult {
    if args.len() != 2 {
        return ("mv: missing file operand\n".to_string(), 1);
    }
    match ctx.vfs.rename(&args[0], &args[1], &ctx.cwd) {
        Ok(()) => (String::new(), 0),
        Err(e) => (format!("mv: cannot move '{}' to '{}': {e}\n", args[0], args[1]), 1),
    }
}

pub fn rm(ctx: &mut ShellContext, args: &[String], _stdin: Option<&str>) -> CommandResult {
    let mut recursive = false;
    let mut force = false;
    let mut targets = Vec::new();
    for a in args {
        match a.as_str() {
            "-r" | "-R" | "--recursive" => recursive = true,
            "-f" | "--force" => force = true,
            "-rf" | "-fr" => {
                recursive = true;
                force = true;
            }
            other => targets.push(other.to_string()),
        }
    }
    let mut out = String::new();
    let mut code = 0;
    for t in &targets {
        for expanded in ctx.vfs.glob_expand(t, &ctx.cwd) {
            let result = if recursive { ctx.vfs.rmrf(&expanded, &ctx.cwd) } else { ctx.vfs.remove_file(&expanded, &ctx.cwd) };
            if let Err(e) = result {
                if !force {
                    out.push_str(&format!("rm: cannot remove '{expanded}': {e}\n"));
                    code = 1;
                }
            }
        }
    }
    (out, code)
}

pub fn mkdir(ctx: &mut ShellContext, args: &[String], _stdin: Option<&str>) -> CommandResult {
    let mut parents = false;
    let mut targets = Vec::new();
    for a in args {
        if a == "-p" || a == "--parents" {
            parents = true;
        } else {
            targets.push(a.clone());
        }
    }
    let mut out = String::new();
    let mut code = 0;
    for t in &targets {
        let result = if parents {
            ctx.vfs.mkdirp(t, None, &ctx.cwd, ctx.uid, ctx.gid, ctx.umask).map(|_| ())
        } else {
            ctx.vfs.mkdir(t, None, &ctx.cwd, ctx.uid, ctx.gid, ctx.umask).map(|_| ())
        };
        if let Err(e) = result {
            out.push_str(&format!("mkdir: cannot create directory '{t}': {e}\n"));
            code = 1;
        }
    }
    (out, code)
}

pub fn rmdir(ctx: &mut ShellContext, args: &[String], _stdin: Option<&str>) -> CommandResult {
    let mut out = String::new();
    let mut code = 0;
    for t in args {
        if let Err(e) = ctx.vfs.rmdir(t, &ctx.cwd) {
            out.push_str(&format!("rmdir: failed to remove '{t}': {e}\n"));
            code = 1;
        }
    }
    (out, code)
}

pub fn ln(ctx: &mut ShellContext, args: &[String], _stdin: Option<&str>) -> CommandResult {
    let mut symbolic = false;
    let mut positional = Vec::new();
    for a in args {
        if a == "-s" || a == "--symbolic" {
            symbolic = true;
        } else {
            positional.push(a.clone());
        }
    }
    if positional.len() != 2 {
        return ("ln: missing file operand\n".to_string(), 1);
    }
    let result = if symbolic {
        ctx.vfs.create_symlink(&positional[1], &positional[0], &ctx.cwd, ctx.uid, ctx.gid).map(|_| ())
    } else {
        ctx.vfs.create_hard_link(&positional[1], &positional[0], &ctx.cwd).map(|_| ())
    };
    match result {
        Ok(()) => (String::new(), 0),
        Err(e) => (format!("ln: failed to create link: {e}\n"), 1),
    }
}

pub fn pwd(ctx: &mut ShellContext, _args: &[String], _stdin: Option<&str>) -> CommandResult {
    (format!("{}\n", ctx.cwd), 0)
}

pub fn cd(ctx: &mut ShellContext, args: &[String], _stdin: Option<&str>) -> CommandResult {
    let target = args.first().cloned().unwrap_or_else(|| "/root".to_string());
    let normalised = vfs::normalise(&target, &ctx.cwd);
    match ctx.vfs.resolve(&normalised, true) {
        Ok(id) => {
            if !ctx.vfs.inode(id).map(|i| i.is_dir()).unwrap_or(false) {
                return (format!("cd: {target}: Not a directory\n"), 1);
            }
            if ctx
                .vfs
                .check_access(&normalised, "/", ctx.uid, ctx.gid, vfs::Access::Execute)
                .is_err()
            {
                return (format!("cd: {target}: Permission denied\n"), 1);
            }
            ctx.cwd = normalised;
            (String::new(), 0)
        }
        Err(e) => (format!("cd: {target}: {e}\n"), 1),
    }
}

pub fn tee(ctx: &mut ShellContext, args: &[String], stdin: Option<&str>) -> CommandResult {
    let append = args.iter().any(|a| a == "-a");
    let files: Vec<&String> = args.iter().filter(|a| a.as_str() != "-a").collect();
    let input = stdin.unwrap_or_default();
    let mut code = 0;
    for f in files {
        if let Err(e) = ctx.vfs.write_file(f, input.as_bytes(), append, &ctx.cwd, ctx.uid, ctx.gid, ctx.umask) {
            code = 1;
            return (format!("tee: {f}: {e}\n"), code);
        }
    }
    (input.to_string(), code)
}

pub fn touch(ctx: &mut ShellContext, args: &[String], _stdin: Option<&str>) -> CommandResult {
    let mut out = String::new();
    let mut code = 0;
    for t in args {
        if let Err(e) = ctx.vfs.touch(t, &ctx.cwd, ctx.uid, ctx.gid, ctx.umask) {
            out.push_str(&format!("touch: cannot touch '{t}': {e}\n"));
            code = 1;
        }
    }
    (out, code)
}
