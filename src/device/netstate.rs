//! Kernel-side network state for one device plus the adapter the `ip`
//! command talks through.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tracing::info;

use crate::commands::IpNetworkContext;
use crate::journal::{Facility, JournalManager, Severity};
use crate::ospf::interface::{apply_mask, prefix_mask};
use crate::ospf::OspfEngine;

#[derive(Debug, Clone)]
pub struct NetInterface {
    pub index: u32,
    pub name: String,
    pub mac: String,
    pub addresses: Vec<(IpAddr, u8)>,
    pub up: bool,
    pub loopback: bool,
}

/// A static or connected route entry. `prefix: None` is the default
/// route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub prefix: Option<(IpAddr, u8)>,
    pub via: Option<IpAddr>,
    pub dev: String,
    pub proto: &'static str,
    pub src: Option<IpAddr>,
}

/// Interface, address and route tables shared between the `ip` adapter
/// and the device.
pub struct NetState {
    interfaces: Mutex<BTreeMap<String, NetInterface>>,
    routes: Mutex<Vec<RouteEntry>>,
    next_index: AtomicU32,
}

fn synthetic_mac(name: &str) -> String {
    let mut acc: u32 = 0x5f3759df;
    for b in name.bytes() {
        acc = acc.wrapping_mul(31).wrapping_add(b as u32);
    }
    format!("52:54:00:{:02x}:{:02x}:{:02x}", (acc >> 16) & 0xff, (acc >> 8) & 0xff, acc & 0xff)
}

impl NetState {
    pub fn new() -> Self {
        let state = NetState {
            interfaces: Mutex::new(BTreeMap::new()),
            routes: Mutex::new(Vec::new()),
            next_index: AtomicU32::new(1),
        };
        let lo = NetInterface {
            index: state.next_index.fetch_add(1, Ordering::SeqCst),
            name: "lo".to_string(),
            mac: "00:00:00:00:00:00".to_string(),
            addresses: vec![(IpAddr::V4(Ipv4Addr::LOCALHOST), 8)],
            up: true,
            loopback: true,
        };
        state.interfaces.lock().unwrap().insert("lo".to_string(), lo);
        state
    }

    /// Registers an interface with one address, up, and installs its
    /// connected route.
    pub fn add_interface(&self, name: &str, address: IpAddr, prefix_len: u8) {
        let iface = NetInterface {
            index: self.next_index.fetch_add(1, Ordering::SeqCst),
            name: name.to_string(),
            mac: synthetic_mac(name),
            addresses: vec![(address, prefix_len)],
            up: true,
            loopback: false,
        };
        self.interfaces.lock().unwrap().insert(name.to_string(), iface);
        if let IpAddr::V4(v4) = address {
            self.routes.lock().unwrap().push(RouteEntry {
                prefix: Some((IpAddr::V4(apply_mask(v4, prefix_len)), prefix_len)),
                via: None,
                dev: name.to_string(),
                proto: "kernel",
                src: Some(address),
            });
        }
    }

    pub fn interface(&self, name: &str) -> Option<NetInterface> {
        self.interfaces.lock().unwrap().get(name).cloned()
    }

    pub fn interfaces(&self) -> Vec<NetInterface> {
        let mut v: Vec<NetInterface> =
            self.interfaces.lock().unwrap().values().cloned().collect();
        v.sort_by_key(|i| i.index);
        v
    }

    fn set_up(&self, name: &str, up: bool) -> bool {
        let mut ifaces = self.interfaces.lock().unwrap();
        match ifaces.get_mut(name) {
            Some(iface) => {
                iface.up = up;
                true
            }
            None => false,
        }
    }
}

impl Default for NetState {
    fn default() -> Self {
        Self::new()
    }
}

/// The [`IpNetworkContext`] implementation backed by [`NetState`] and the
/// OSPF engine's computed routes and neighbor table.
pub struct NetAdapter {
    state: Arc<NetState>,
    ospf: Arc<OspfEngine>,
    journal: Arc<JournalManager>,
}

impl NetAdapter {
    pub fn new(state: Arc<NetState>, ospf: Arc<OspfEngine>, journal: Arc<JournalManager>) -> Self {
        NetAdapter { state, ospf, journal }
    }

    fn flags_line(iface: &NetInterface) -> String {
        if iface.loopback {
            let state = if iface.up { "UNKNOWN" } else { "DOWN" };
            format!(
                "{}: {}: <LOOPBACK{}> mtu 65536 qdisc noqueue state {} group default qlen 1000",
                iface.index,
                iface.name,
                if iface.up { ",UP,LOWER_UP" } else { "" },
                state
            )
        } else {
            let state = if iface.up { "UP" } else { "DOWN" };
            format!(
                "{}: {}: <BROADCAST,MULTICAST{}> mtu 1500 qdisc fq_codel state {} group default qlen 1000",
                iface.index,
                iface.name,
                if iface.up { ",UP,LOWER_UP" } else { "" },
                state
            )
        }
    }

    fn link_line(iface: &NetInterface) -> String {
        if iface.loopback {
            "    link/loopback 00:00:00:00:00:00 brd 00:00:00:00:00:00".to_string()
        } else {
            format!("    link/ether {} brd ff:ff:ff:ff:ff:ff", iface.mac)
        }
    }

    fn addr_lines(iface: &NetInterface) -> String {
        let mut out = String::new();
        for (addr, len) in &iface.addresses {
            match addr {
                IpAddr::V4(v4) => {
                    if iface.loopback {
                        out.push_str(&format!("    inet {v4}/{len} scope host lo\n"));
                    } else {
                        let brd = Ipv4Addr::from(
                            u32::from(*v4) | !u32::from(prefix_mask(*len)),
                        );
                        out.push_str(&format!(
                            "    inet {v4}/{len} brd {brd} scope global {}\n",
                            iface.name
                        ));
                    }
                }
                IpAddr::V6(v6) => {
                    out.push_str(&format!("    inet6 {v6}/{len} scope link\n"));
                }
            }
            out.push_str("       valid_lft forever preferred_lft forever\n");
        }
        out
    }

    /// Every route visible to `ip route`: kernel/static entries plus the
    /// OSPF engine's current table.
    fn merged_routes(&self) -> Vec<RouteEntry> {
        let mut routes = self.state.routes.lock().unwrap().clone();
        for route in self.ospf.routes() {
            let prefix = Some((route.prefix, route.prefix_len));
            if routes.iter().any(|r| r.prefix == prefix) {
                continue;
            }
            let Some(next_hop) = route.next_hop else {
                // Directly connected per OSPF; the kernel route already
                // covers it.
                continue;
            };
            routes.push(RouteEntry {
                prefix,
                via: Some(next_hop),
                dev: route.interface.clone(),
                proto: "ospf",
                src: None,
            });
        }
        routes
    }

    fn format_route(route: &RouteEntry) -> String {
        let mut line = match route.prefix {
            None => "default".to_string(),
            Some((addr, len)) => format!("{addr}/{len}"),
        };
        if let Some(via) = route.via {
            line.push_str(&format!(" via {via}"));
        }
        line.push_str(&format!(" dev {}", route.dev));
        if route.proto != "static" {
            line.push_str(&format!(" proto {}", route.proto));
        }
        if route.proto == "kernel" {
            line.push_str(" scope link");
        }
        if let Some(src) = route.src {
            line.push_str(&format!(" src {src}"));
        }
        line
    }

    fn lookup_route(&self, dest: IpAddr) -> Option<RouteEntry> {
        let routes = self.merged_routes();
        let mut best: Option<(u8, RouteEntry)> = None;
        for route in routes {
            let matches = match route.prefix {
                None => true,
                Some((IpAddr::V4(prefix), len)) => match dest {
                    IpAddr::V4(d) => apply_mask(d, len) == prefix,
                    IpAddr::V6(_) => false,
                },
                Some((IpAddr::V6(_), _)) => false,
            };
            if !matches {
                continue;
            }
            let len = route.prefix.map(|(_, l)| l).unwrap_or(0);
            if best.as_ref().map(|(l, _)| len > *l).unwrap_or(true) {
                best = Some((len, route));
            }
        }
        best.map(|(_, r)| r)
    }
}

impl IpNetworkContext for NetAdapter {
    fn list_interfaces(&self) -> Vec<String> {
        self.state
            .interfaces()
            .iter()
            .flat_map(|i| vec![Self::flags_line(i), Self::link_line(i)])
            .collect()
    }

    fn show_addr(&self, iface: Option<&str>) -> String {
        let interfaces = self.state.interfaces();
        let selected: Vec<&NetInterface> = match iface {
            Some(name) => interfaces.iter().filter(|i| i.name == name).collect(),
            None => interfaces.iter().collect(),
        };
        if selected.is_empty() {
            return format!("Device \"{}\" does not exist.\n", iface.unwrap_or_default());
        }
        let mut out = String::new();
        for iface in selected {
            out.push_str(&Self::flags_line(iface));
            out.push('\n');
            out.push_str(&Self::link_line(iface));
            out.push('\n');
            out.push_str(&Self::addr_lines(iface));
        }
        out
    }

    fn add_addr(&mut self, iface: &str, cidr: &str) -> String {
        let Some((addr, len)) = cidr.split_once('/') else {
            return format!("Error: inet prefix is expected rather than \"{cidr}\".\n");
        };
        let Ok(addr) = addr.parse::<IpAddr>() else {
            return format!("Error: inet prefix is expected rather than \"{cidr}\".\n");
        };
        let Ok(len) = len.parse::<u8>() else {
            return format!("Error: inet prefix is expected rather than \"{cidr}\".\n");
        };
        let mut ifaces = self.state.interfaces.lock().unwrap();
        let Some(entry) = ifaces.get_mut(iface) else {
            return format!("Cannot find device \"{iface}\"\n");
        };
        if entry.addresses.contains(&(addr, len)) {
            return "RTNETLINK answers: File exists\n".to_string();
        }
        entry.addresses.push((addr, len));
        info!(interface = iface, address = %addr, "address added");
        String::new()
    }

    fn del_addr(&mut self, iface: &str, cidr: &str) -> String {
        let parsed = cidr
            .split_once('/')
            .and_then(|(a, l)| Some((a.parse::<IpAddr>().ok()?, l.parse::<u8>().ok()?)));
        let Some((addr, len)) = parsed else {
            return format!("Error: inet prefix is expected rather than \"{cidr}\".\n");
        };
        let mut ifaces = self.state.interfaces.lock().unwrap();
        let Some(entry) = ifaces.get_mut(iface) else {
            return format!("Cannot find device \"{iface}\"\n");
        };
        let before = entry.addresses.len();
        entry.addresses.retain(|a| *a != (addr, len));
        if entry.addresses.len() == before {
            return "RTNETLINK answers: Cannot assign requested address\n".to_string();
        }
        String::new()
    }

    fn show_route(&self) -> String {
        let mut out = String::new();
        for route in self.merged_routes() {
            out.push_str(&Self::format_route(&route));
            out.push('\n');
        }
        out
    }

    fn route_get(&self, dest: &str) -> String {
        let Ok(addr) = dest.parse::<IpAddr>() else {
            return format!("Error: inet address is expected rather than \"{dest}\".\n");
        };
        let Some(route) = self.lookup_route(addr) else {
            return "RTNETLINK answers: Network is unreachable\n".to_string();
        };
        // The src shown is the connected route's source address even when
        // the looked-up destination is remote.
        let src = route.src.or_else(|| {
            self.state
                .interface(&route.dev)
                .and_then(|i| i.addresses.first().map(|(a, _)| *a))
        });
        let mut line = dest.to_string();
        if let Some(via) = route.via {
            line.push_str(&format!(" via {via}"));
        }
        line.push_str(&format!(" dev {}", route.dev));
        if let Some(src) = src {
            line.push_str(&format!(" src {src}"));
        }
        line.push_str(" uid 0\n    cache\n");
        line
    }

    fn add_route(&mut self, dest: &str, via: Option<&str>, dev: Option<&str>) -> String {
        let prefix = if dest == "default" {
            None
        } else {
            let parsed = dest
                .split_once('/')
                .and_then(|(a, l)| Some((a.parse::<IpAddr>().ok()?, l.parse::<u8>().ok()?)));
            match parsed {
                Some(p) => Some(p),
                None => match dest.parse::<IpAddr>() {
                    Ok(a) => Some((a, if a.is_ipv4() { 32 } else { 128 })),
                    Err(_) => {
                        return format!("Error: inet prefix is expected rather than \"{dest}\".\n")
                    }
                },
            }
        };
        let via_addr = match via {
            Some(v) => match v.parse::<IpAddr>() {
                Ok(a) => Some(a),
                Err(_) => {
                    return format!("Error: inet address is expected rather than \"{v}\".\n")
                }
            },
            None => None,
        };

        let dev_name = match dev {
            Some(d) => {
                if self.state.interface(d).is_none() {
                    return format!("Cannot find device \"{d}\"\n");
                }
                d.to_string()
            }
            None => match via_addr.and_then(|a| self.lookup_route(a)) {
                Some(route) => route.dev,
                None => return "RTNETLINK answers: Network is unreachable\n".to_string(),
            },
        };

        let mut routes = self.state.routes.lock().unwrap();
        if routes.iter().any(|r| r.prefix == prefix) {
            return "RTNETLINK answers: File exists\n".to_string();
        }
        routes.push(RouteEntry { prefix, via: via_addr, dev: dev_name, proto: "static", src: None });
        String::new()
    }

    fn del_route(&mut self, dest: &str) -> String {
        let prefix = if dest == "default" {
            None
        } else {
            dest.split_once('/')
                .and_then(|(a, l)| Some((a.parse::<IpAddr>().ok()?, l.parse::<u8>().ok()?)))
        };
        if prefix.is_none() && dest != "default" {
            return format!("Error: inet prefix is expected rather than \"{dest}\".\n");
        }
        let mut routes = self.state.routes.lock().unwrap();
        let before = routes.len();
        routes.retain(|r| r.prefix != prefix || r.proto == "kernel");
        if routes.len() == before {
            return "RTNETLINK answers: No such process\n".to_string();
        }
        String::new()
    }

    fn show_neigh(&self) -> String {
        let mut out = String::new();
        for (iface, neighbor) in self.ospf.neighbors() {
            out.push_str(&format!(
                "{} dev {} lladdr {} REACHABLE\n",
                neighbor.address,
                iface,
                synthetic_mac(&neighbor.router_id.to_string())
            ));
        }
        out
    }

    fn set_link(&mut self, iface: &str, up: bool) -> String {
        if !self.state.set_up(iface, up) {
            return format!("Cannot find device \"{iface}\"\n");
        }
        if up {
            let _ = self.ospf.activate_interface(iface);
        } else {
            let _ = self.ospf.deactivate_interface(iface);
        }
        self.journal.record(
            Facility::Kern,
            Severity::Info,
            &format!("{iface}: link becomes {}", if up { "ready" } else { "not ready" }),
        );
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ospf::{OspfVersion, VirtualClock};

    fn adapter() -> NetAdapter {
        let state = Arc::new(NetState::new());
        state.add_interface("eth0", IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), 24);
        let clock = Arc::new(VirtualClock::new());
        let ospf = Arc::new(OspfEngine::new(OspfVersion::V2, Ipv4Addr::new(1, 1, 1, 1), clock));
        let vfs = Arc::new(crate::vfs::Vfs::new_empty(0, 0));
        let journal = Arc::new(JournalManager::new(vfs, "sim"));
        NetAdapter::new(state, ospf, journal)
    }

    #[test]
    fn connected_route_appears_in_show() {
        let adapter = adapter();
        let out = adapter.show_route();
        assert!(out.contains("10.0.0.0/24 dev eth0 proto kernel scope link src 10.0.0.1"));
    }

    #[test]
    fn add_route_validates_device_and_duplicates() {
        let mut adapter = adapter();
        assert_eq!(adapter.add_route("192.168.5.0/24", Some("10.0.0.254"), Some("eth0")), "");
        assert_eq!(
            adapter.add_route("192.168.5.0/24", Some("10.0.0.254"), Some("eth0")),
            "RTNETLINK answers: File exists\n"
        );
        assert_eq!(
            adapter.add_route("192.168.6.0/24", None, Some("eth9")),
            "Cannot find device \"eth9\"\n"
        );
    }

    #[test]
    fn route_get_reports_connected_src_for_remote_dest() {
        let mut adapter = adapter();
        adapter.add_route("default", Some("10.0.0.254"), Some("eth0"));
        let out = adapter.route_get("8.8.8.8");
        assert!(out.starts_with("8.8.8.8 via 10.0.0.254 dev eth0 src 10.0.0.1"));
    }

    #[test]
    fn del_route_refuses_missing_and_kernel_routes() {
        let mut adapter = adapter();
        assert_eq!(adapter.del_route("172.16.0.0/12"), "RTNETLINK answers: No such process\n");
        assert_eq!(adapter.del_route("10.0.0.0/24"), "RTNETLINK answers: No such process\n");
    }

    #[test]
    fn unknown_device_errors_match_iproute2() {
        let mut adapter = adapter();
        assert_eq!(adapter.add_addr("eth9", "10.1.0.1/24"), "Cannot find device \"eth9\"\n");
        assert_eq!(adapter.set_link("eth9", true), "Cannot find device \"eth9\"\n");
    }
}
