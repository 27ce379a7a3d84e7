//! The command library and its dispatch table.

mod fileops;
mod listing;
pub mod network;
mod permcmd;
mod text;
mod users;

use crate::shell::context::ShellContext;

pub use network::IpNetworkContext;
pub use users::sudo_list;

/// `(output, exitCode)`, the contract every handler returns.
pub type CommandResult = (String, i32);

/// `(ctx, args, stdin) -> (output, exitCode)`.
pub type Handler = fn(&mut ShellContext, &[String], Option<&str>) -> CommandResult;

/// Commands that require `uid == 0`.
const ROOT_ONLY: &[&str] = &[
    "useradd", "adduser", "usermod", "userdel", "deluser", "groupadd", "groupmod", "groupdel",
    "chpasswd", "chage", "chown", "chgrp",
];

fn table() -> &'static [(&'static str, Handler)] {
    &[
        ("cat", fileops::cat),
        ("echo", fileops::echo),
        ("cp", fileops::cp),
        ("mv", fileops::mv),
        ("rm", fileops::rm),
        ("mkdir", fileops::mkdir),
        ("rmdir", fileops::rmdir),
        ("ln", fileops::ln),
        ("pwd", fileops::pwd),
        ("cd", fileops::cd),
        ("tee", fileops::tee),
        ("touch", fileops::touch),
        ("ls", listing::ls),
        ("stat", listing::stat),
        ("find", listing::find),
        ("grep", text::grep),
        ("head", text::head),
        ("tail", text::tail),
        ("wc", text::wc),
        ("sort", text::sort),
        ("cut", text::cut),
        ("uniq", text::uniq),
        ("tr", text::tr),
        ("awk", text::awk),
        ("chmod", permcmd::chmod),
        ("chown", permcmd::chown),
        ("chgrp", permcmd::chgrp),
        ("useradd", users::useradd),
        ("adduser", users::useradd),
        ("usermod", users::usermod),
        ("userdel", users::userdel),
        ("deluser", users::userdel),
        ("passwd", users::passwd),
        ("chpasswd", users::chpasswd),
        ("chage", users::chage),
        ("groupadd", users::groupadd),
        ("groupmod", users::groupmod),
        ("groupdel", users::groupdel),
        ("gpasswd", users::gpasswd),
        ("id", users::id),
        ("whoami", users::whoami),
        ("groups", users::groups),
        ("who", users::who),
        ("w", users::w),
        ("last", users::last),
        ("getent", users::getent),
        ("ip", network::ip),
    ]
}

/// Looks up and runs `name` against the dispatch table, enforcing the
/// root-only guard first. Returns exit 127 / "command not found" when no
/// handler matches; callers are responsible for the script-delegation
/// fallback.
pub fn dispatch(ctx: &mut ShellContext, name: &str, args: &[String], stdin: Option<&str>) -> CommandResult {
    if ROOT_ONLY.contains(&name) && !ctx.is_root() {
        return (format!("{name}: Permission denied\n"), 1);
    }
    if name == "passwd" && !args.is_empty() && !ctx.is_root() && args[0] != ctx.user {
        return ("passwd: Permission denied\n".to_string(), 1);
    }

    for (candidate, handler) in table() {
        if *candidate == name {
            return handler(ctx, args, stdin);
        }
    }
    (format!("{name}: command not found\n"), 127)
}

/// Whether `name` is a known command (used by tab completion).
pub fn is_known_command(name: &str) -> bool {
    table().iter().any(|(candidate, _)| *candidate == name)
}

/// Every registered command name, for tab completion of the first word.
pub fn command_names() -> Vec<&'static str> {
    table().iter().map(|(name, _)| *name).collect()
}
