//! Tokeniser, executor and script runner for the simulated shell.

pub mod context;
mod exec;
mod redirect;
mod script;
pub mod tokenizer;

pub use context::{ShellContext, SuFrame};
pub use exec::execute;

/// `getCompletions(partial) -> [string]`: command names for
/// the first word, VFS paths (directories suffixed `/`) thereafter.
/// A partial that trails a redirection operator still completes as a
/// path, never as a command name.
pub fn completions(ctx: &ShellContext, line: &str) -> Vec<String> {
    let is_first_word = !line.trim_start().contains(' ');
    let partial = line.rsplit(' ').next().unwrap_or(line);
    let redirect_target =
        partial.strip_prefix("2>>").or_else(|| partial.strip_prefix("2>"))
            .or_else(|| partial.strip_prefix(">>"))
            .or_else(|| partial.strip_prefix('>'))
            .or_else(|| partial.strip_prefix('<'));

    if let Some(target) = redirect_target {
        return complete_path(ctx, target);
    }
    if is_first_word {
        let mut names: Vec<String> = crate::commands::command_names()
            .into_iter()
            .map(|s| s.to_string())
            .filter(|n| n.starts_with(partial))
            .collect();
        names.sort();
        names.dedup();
        return names;
    }

    complete_path(ctx, partial)
}

fn complete_path(ctx: &ShellContext, partial: &str) -> Vec<String> {
    let (dir_part, prefix) = match partial.rsplit_once('/') {
        Some((d, p)) => (if d.is_empty() { "/".to_string() } else { d.to_string() }, p.to_string()),
        None => (ctx.cwd.clone(), partial.to_string()),
    };

    let Ok(entries) = ctx.vfs.list_dir(&dir_part, &ctx.cwd) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for (name, id) in entries {
        if name.starts_with(&prefix) {
            let is_dir = ctx.vfs.inode(id).map(|i| i.is_dir()).unwrap_or(false);
            let full = if partial.contains('/') {
                format!("{}/{name}", dir_part.trim_end_matches('/'))
            } else {
                name
            };
            out.push(if is_dir { format!("{full}/") } else { full });
        }
    }
    out.sort();
    out
}
