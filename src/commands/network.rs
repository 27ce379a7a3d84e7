//! `ip` command dispatcher over the [`IpNetworkContext`] adapter.

use crate::shell::context::ShellContext;

use super::CommandResult;

/// Minimum surface the `ip` command needs from the host device's network
/// state. Each mutating operation returns `""` on success or
/// a human-readable error line on failure, matching iproute2's own
/// convention for scriptable output.
pub trait IpNetworkContext {
    fn list_interfaces(&self) -> Vec<String>;
    fn show_addr(&self, iface: Option<&str>) -> String;
    fn add_addr(&mut self, iface: &str, cidr: &str) -> String;
    fn del_addr(&mut self, iface: &str, cidr: &str) -> String;
    fn show_route(&self) -> String;
    fn route_get(&self, dest: &str) -> String;
    fn add_route(&mut self, dest: &str, via: Option<&str>, dev: Option<&str>) -> String;
    fn del_route(&mut self, dest: &str) -> String;
    fn show_neigh(&self) -> String;
    fn set_link(&mut self, iface: &str, up: bool) -> String;
}

pub fn ip(ctx: &mut ShellContext, args: &[String], _stdin: Option<&str>) -> CommandResult {
    let Some(object) = args.first() else {
        return ("Usage: ip [ OPTIONS ] OBJECT { COMMAND | help }\n".to_string(), 1);
    };
    let rest = &args[1..];
    let verb = rest.first().map(|s| s.as_str()).unwrap_or("show");

    match object.as_str() {
        "addr" | "a" => match verb {
            "show" | "list" => (ctx.network.show_addr(rest.get(1).map(|s| s.as_str())), 0),
            "add" => {
                let cidr = rest.get(1).cloned().unwrap_or_default();
                let iface = find_after(rest, "dev").unwrap_or_default();
                (ctx.network.add_addr(&iface, &cidr), 0)
            }
            "del" => {
                let cidr = rest.get(1).cloned().unwrap_or_default();
                let iface = find_after(rest, "dev").unwrap_or_default();
                (ctx.network.del_addr(&iface, &cidr), 0)
            }
            other => (format!("Command \"{other}\" is unknown, try \"ip addr help\".\n"), 1),
        },
        "link" | "l" => match verb {
            "show" | "list" => (ctx.network.list_interfaces().join("\n") + "\n", 0),
            "set" => {
                let iface = rest.get(1).cloned().unwrap_or_default();
                let up = rest.iter().any(|a| a == "up");
                let down = rest.iter().any(|a| a == "down");
                if up {
                    (ctx.network.set_link(&iface, true), 0)
                } else if down {
                    (ctx.network.set_link(&iface, false), 0)
                } else {
                    (String::new(), 0)
                }
            }
            other => (format!("Command \"{other}\" is unknown, try \"ip link help\".\n"), 1),
        },
        "route" | "r" => match verb {
            "show" | "list" => (ctx.network.show_route(), 0),
            "get" => {
                let dest = rest.get(1).cloned().unwrap_or_default();
                (ctx.network.route_get(&dest), 0)
            }
            "add" => {
                let dest = rest.get(1).cloned().unwrap_or_default();
                let via = find_after(rest, "via");
                let dev = find_after(rest, "dev");
                let result = ctx.network.add_route(&dest, via.as_deref(), dev.as_deref());
                let code = if result.is_empty() { 0 } else { 2 };
                (result, code)
            }
            "del" => {
                let dest = rest.get(1).cloned().unwrap_or_default();
                let result = ctx.network.del_route(&dest);
                let code = if result.is_empty() { 0 } else { 2 };
                (result, code)
            }
            other => (format!("Command \"{other}\" is unknown, try \"ip route help\".\n"), 1),
        },
        "neigh" | "n" => match verb {
            "show" | "list" => (ctx.network.show_neigh(), 0),
            other => (format!("Command \"{other}\" is unknown, try \"ip neigh help\".\n"), 1),
        },
        other => (format!("Object \"{other}\" is unknown, try \"ip help\".\n"), 1),
    }
}

fn find_after(args: &[String], marker: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == marker)?;
    args.get(pos + 1).cloned()
}

/// A network context with no interfaces, used before a device wires in its
/// real [`crate::ospf`] adapter (and by command-library unit tests).
#[derive(Default)]
pub struct NullNetworkContext;

impl IpNetworkContext for NullNetworkContext {
    fn list_interfaces(&self) -> Vec<String> {
        vec!["lo".to_string()]
    }
    fn show_addr(&self, _iface: Option<&str>) -> String {
        "1: lo: <LOOPBACK,UP> mtu 65536\n    inet 127.0.0.1/8 scope host lo\n".to_string()
    }
    fn add_addr(&mut self, iface: &str, _cidr: &str) -> String {
        format!("Cannot find device \"{iface}\"\n")
    }
    fn del_addr(&mut self, iface: &str, _cidr: &str) -> String {
        format!("Cannot find device \"{iface}\"\n")
    }
    fn show_route(&self) -> String {
        String::new()
    }
    fn route_get(&self, dest: &str) -> String {
        format!("{dest} unreachable\n")
    }
    fn add_route(&mut self, _dest: &str, _via: Option<&str>, _dev: Option<&str>) -> String {
        "RTNETLINK answers: No such device\n".to_string()
    }
    fn del_route(&mut self, dest: &str) -> String {
        format!("RTNETLINK answers: No such process\nCannot find route for {dest}\n")
    }
    fn show_neigh(&self) -> String {
        String::new()
    }
    fn set_link(&mut self, iface: &str, _up: bool) -> String {
        format!("Cannot find device \"{iface}\"\n")
    }
}
