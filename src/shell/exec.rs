//! Pipeline/chain execution semantics.

use crate::commands;
use crate::vfs;

use super::context::{ShellContext, SuFrame};
use super::redirect::{parse_redirections, strip_sgr};
use super::script;
use super::tokenizer::{split_chain, ChainOp};

/// `LinuxCommandExecutor::execute`: runs every line of `input`, returning
/// the concatenated terminal-visible output.
pub fn execute(ctx: &mut ShellContext, input: &str) -> String {
    let mut out = String::new();
    for line in input.lines() {
        let (line_out, code) = execute_line(ctx, line);
        ctx.last_exit = code;
        out.push_str(&line_out);
    }
    out
}

/// Runs a single chain of `&&`/`||`/`;`-separated pipelines, returning its
/// combined output and the exit code of the last segment actually run.
/// Shared by [`execute`] and the Script Executor.
pub fn execute_line(ctx: &mut ShellContext, line: &str) -> (String, i32) {
    if line.trim().is_empty() {
        return (String::new(), ctx.last_exit);
    }
    let segments = split_chain(line);
    let mut out = String::new();
    let mut skip_next = false;

    for seg in segments {
        if skip_next {
            // A skipped segment leaves the last executed exit code
            // untouched, so the chain operator after it evaluates against
            // whichever command actually ran last.
            skip_next = match seg.next_op {
                Some(ChainOp::And) => ctx.last_exit != 0,
                Some(ChainOp::Or) => ctx.last_exit == 0,
                _ => false,
            };
            continue;
        }

        let (seg_out, code) = run_pipeline(ctx, &seg.pipeline);
        out.push_str(&seg_out);
        ctx.last_exit = code;

        skip_next = match seg.next_op {
            Some(ChainOp::And) => code != 0,
            Some(ChainOp::Or) => code == 0,
            _ => false,
        };
    }
    (out, ctx.last_exit)
}

fn run_pipeline(ctx: &mut ShellContext, pipeline: &[Vec<String>]) -> (String, i32) {
    let mut stdin: Option<String> = None;
    let mut last_code = 0;
    let stage_count = pipeline.len();

    for (idx, stage) in pipeline.iter().enumerate() {
        let (words, redir) = parse_redirections(stage);
        if words.is_empty() {
            continue;
        }

        let effective_stdin = if let Some(path) = &redir.stdin_file {
            ctx.vfs.read_file(path, &ctx.cwd).ok().map(|b| String::from_utf8_lossy(&b).to_string())
        } else {
            stdin.clone()
        };

        let (mut output, code) = run_command(ctx, &words, effective_stdin.as_deref());
        last_code = code;

        // `2>&1` folds the error text into stdout, so a `2>` target only
        // captures it when the two are not combined.
        if code != 0 && !redir.stderr_to_stdout {
            if let Some((path, append)) = &redir.stderr_file {
                write_redirect(ctx, path, &output, *append);
                output.clear();
            }
        }

        if let Some((path, append)) = &redir.stdout_file {
            write_redirect(ctx, path, &output, *append);
            output.clear();
        }

        let is_last = idx + 1 == stage_count;
        if is_last {
            return (output, last_code);
        }
        stdin = Some(strip_sgr(&output));
    }

    (String::new(), last_code)
}

fn write_redirect(ctx: &mut ShellContext, path: &str, content: &str, append: bool) {
    let _ = ctx.vfs.write_file(path, content.as_bytes(), append, &ctx.cwd, ctx.uid, ctx.gid, ctx.umask);
}

/// Expands `$VAR`/`${VAR}` in every argument (but not the command name),
/// then resolves `sudo`/`su`/shell builtins before falling back to the
/// command-library dispatch table, then to script delegation.
fn run_command(ctx: &mut ShellContext, tokens: &[String], stdin: Option<&str>) -> (String, i32) {
    let Some((name, raw_args)) = tokens.split_first() else {
        return (String::new(), 0);
    };
    let args: Vec<String> = raw_args.iter().map(|a| ctx.expand_vars(a)).collect();

    match name.as_str() {
        "sudo" => return run_sudo(ctx, &args, stdin),
        "su" => return run_su(ctx, &args),
        "exit" | "logout" => return run_exit(ctx),
        "export" => return run_export(ctx, &args),
        "env" => return run_env(ctx),
        _ => {}
    }

    if commands::is_known_command(name) {
        return commands::dispatch(ctx, name, &args, stdin);
    }

    if name.starts_with("./") || name.starts_with('/') {
        let abs = vfs::normalise(name, &ctx.cwd);
        if ctx.vfs.resolve(&abs, true).is_ok() {
            return script::run_script(ctx, &abs, &args);
        }
    }

    (format!("{name}: command not found\n"), 127)
}

fn run_sudo(ctx: &mut ShellContext, args: &[String], stdin: Option<&str>) -> (String, i32) {
    if args.first().map(|s| s.as_str()) == Some("-l") {
        return commands::sudo_list(ctx, &[], stdin);
    }
    let Some((cmd, rest)) = args.split_first() else {
        return ("usage: sudo command\n".to_string(), 1);
    };
    if !ctx.users.can_sudo(&ctx.user) {
        return (format!("sudo: {}: command not found\n", ctx.user), 1);
    }

    let (saved_uid, saved_gid) = (ctx.uid, ctx.gid);
    ctx.uid = 0;
    ctx.gid = 0;

    let mut inner = vec![cmd.clone()];
    inner.extend(rest.iter().cloned());
    let result = run_command(ctx, &inner, stdin);

    if cmd == "su" {
        if let Some(frame) = ctx.su_stack.last_mut() {
            frame.uid = saved_uid;
            frame.gid = saved_gid;
            frame.from_sudo = true;
        }
    } else {
        ctx.uid = saved_uid;
        ctx.gid = saved_gid;
    }
    result
}

fn run_su(ctx: &mut ShellContext, args: &[String]) -> (String, i32) {
    let target = args
        .iter()
        .find(|a| !matches!(a.as_str(), "-l" | "-" | "--login"))
        .cloned()
        .unwrap_or_else(|| "root".to_string());

    match ctx.users.user_by_name(&target) {
        Some(user) => {
            if user.shell.ends_with("nologin") || user.shell.ends_with("false") {
                return ("This account is currently not available.\n".to_string(), 1);
            }
            ctx.su_stack.push(SuFrame {
                user: ctx.user.clone(),
                uid: ctx.uid,
                gid: ctx.gid,
                cwd: ctx.cwd.clone(),
                umask: ctx.umask,
                from_sudo: false,
            });
            ctx.user = user.name;
            ctx.uid = user.uid;
            ctx.gid = user.primary_gid;
            ctx.cwd = user.home;
            (String::new(), 0)
        }
        None => (format!("su: user {target} does not exist\n"), 1),
    }
}

fn run_exit(ctx: &mut ShellContext) -> (String, i32) {
    if let Some(frame) = ctx.su_stack.pop() {
        ctx.user = frame.user;
        ctx.uid = frame.uid;
        ctx.gid = frame.gid;
        ctx.cwd = frame.cwd;
        ctx.umask = frame.umask;
    }
    (String::new(), 0)
}

fn run_export(ctx: &mut ShellContext, args: &[String]) -> (String, i32) {
    for a in args {
        if let Some((k, v)) = a.split_once('=') {
            ctx.env.insert(k.to_string(), v.to_string());
        }
    }
    (String::new(), 0)
}

fn run_env(ctx: &mut ShellContext) -> (String, i32) {
    let mut out = String::new();
    for (k, v) in &ctx.env {
        out.push_str(&format!("{k}={v}\n"));
    }
    (out, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::network::NullNetworkContext;
    use crate::usergroup::UserGroupManager;
    use crate::vfs::Vfs;
    use std::sync::Arc;

    fn fresh_ctx() -> ShellContext {
        let vfs = Arc::new(Vfs::new_empty(0, 0));
        vfs.mkdirp("/tmp", Some(0o1777), "/", 0, 0, 0).unwrap();
        vfs.mkdirp("/root", Some(0o700), "/", 0, 0, 0).unwrap();
        let users = Arc::new(UserGroupManager::bootstrap());
        ShellContext::new(vfs, users, Box::new(NullNetworkContext))
    }

    #[test]
    fn echo_redirect_then_cat_round_trips() {
        let mut ctx = fresh_ctx();
        let out = execute(&mut ctx, "echo hello > /tmp/a && cat /tmp/a");
        assert_eq!(out, "hello\n");
    }

    #[test]
    fn pipe_counts_bytes_through_wc() {
        let mut ctx = fresh_ctx();
        execute(&mut ctx, "echo hello > /tmp/a");
        let out = execute(&mut ctx, "cat /tmp/a | wc -c");
        assert_eq!(out.trim(), "6");
    }

    #[test]
    fn and_chain_short_circuits_on_failure() {
        let mut ctx = fresh_ctx();
        let out = execute(&mut ctx, "cat /no/such/file && echo should-not-print");
        assert!(!out.contains("should-not-print"));
    }

    #[test]
    fn sudo_su_unwind_restores_original_caller() {
        let mut ctx = fresh_ctx();
        ctx.users.add_user("alice", None, None, None, None, None).unwrap();
        ctx.uid = 1000;
        ctx.gid = 1000;
        ctx.user = "alice".to_string();
        ctx.users.grant_sudo("alice");

        execute(&mut ctx, "sudo su");
        assert_eq!(ctx.uid, 0);
        execute(&mut ctx, "exit");
        assert_eq!(ctx.uid, 1000);
        assert_eq!(ctx.user, "alice");
    }
}
