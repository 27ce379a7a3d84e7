//! The OSPF engine: hello protocol, adjacency bring-up, database
//! exchange, flooding, origination and SPF scheduling.
//!
//! All protocol state lives behind one interface-table mutex; outgoing
//! packets are collected while it is held and handed to the send callback
//! only after it is released, so a callback may re-enter the engine (or a
//! peer engine) without deadlocking.

use std::collections::{BTreeMap, HashMap};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use super::clock::{Clock, TimerKind, TimerQueue};
use super::interface::{
    adjacency_required, elect_dr_bdr, Candidate, InterfaceSettings, InterfaceState, NetworkType,
    OspfInterface,
};
use super::lsa::{
    compare_freshness, ExternalLsa, IntraAreaPrefixLsa, Ipv6Prefix, LinkLsa, Lsa, LsaBody,
    LsaHeader, LsaKey, LsaType, NetworkLsa, RouterLink, RouterLinkKind, RouterLsa,
};
use super::lsdb::{InstallOutcome, Lsdb};
use super::neighbor::{transition, Neighbor, NeighborEvent, NeighborState};
use super::packet::{
    DatabaseDescription, DdFlags, Hello, LsAck, LsRequest, LsUpdate, OspfVersion, Packet,
    PacketBody, PacketDst, PacketHeader,
};
use super::spf::{run_spf, LocalInterface, Route};
use super::{
    AreaId, Error, Result, RouterId, DD_MAX_HEADERS, INITIAL_SEQUENCE, LSR_MAX_ENTRIES, MAX_AGE,
    SPF_DELAY_MS,
};

/// One packet queued for transmission: `(interface, destination, packet)`.
pub type Outgoing = (String, PacketDst, Packet);

/// The `sendPacket(iface, packet)` sink.
pub type SendCallback = Arc<dyn Fn(&str, PacketDst, &Packet) + Send + Sync>;

pub struct OspfEngine {
    version: OspfVersion,
    router_id: RouterId,
    clock: Arc<dyn Clock>,
    interfaces: Mutex<BTreeMap<String, OspfInterface>>,
    lsdb: Lsdb,
    routes: Mutex<Vec<Route>>,
    timers: TimerQueue,
    send: Mutex<Option<SendCallback>>,
    /// Holds queued packets while no send callback is installed.
    outbox: Mutex<Vec<Outgoing>>,
    spf_pending: AtomicBool,
    dd_seq: AtomicU32,
    as_boundary: AtomicBool,
    running: AtomicBool,
}

impl OspfEngine {
    pub fn new(version: OspfVersion, router_id: RouterId, clock: Arc<dyn Clock>) -> Self {
        OspfEngine {
            version,
            router_id,
            clock,
            interfaces: Mutex::new(BTreeMap::new()),
            lsdb: Lsdb::new(),
            routes: Mutex::new(Vec::new()),
            timers: TimerQueue::new(),
            send: Mutex::new(None),
            outbox: Mutex::new(Vec::new()),
            spf_pending: AtomicBool::new(false),
            dd_seq: AtomicU32::new(0x0ddc_0000),
            as_boundary: AtomicBool::new(false),
            running: AtomicBool::new(true),
        }
    }

    pub fn router_id(&self) -> RouterId {
        self.router_id
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn version(&self) -> OspfVersion {
        self.version
    }

    /// `setSendCallback(fn)`. Any packets queued before the
    /// callback was installed are delivered immediately.
    pub fn set_send_callback<F>(&self, callback: F)
    where
        F: Fn(&str, PacketDst, &Packet) + Send + Sync + 'static,
    {
        *self.send.lock().unwrap() = Some(Arc::new(callback));
        let pending = std::mem::take(&mut *self.outbox.lock().unwrap());
        self.flush(pending);
    }

    /// Drains packets queued while no send callback was installed.
    pub fn drain_outbox(&self) -> Vec<Outgoing> {
        std::mem::take(&mut *self.outbox.lock().unwrap())
    }

    pub fn add_interface(&self, settings: InterfaceSettings) -> Result<()> {
        let mut ifaces = self.interfaces.lock().unwrap();
        if ifaces.contains_key(&settings.name) {
            return Err(Error::InterfaceExists);
        }
        let index = ifaces.len() as u32 + 1;
        let name = settings.name.clone();
        ifaces.insert(name.clone(), OspfInterface::from_settings(settings, index));
        debug!(interface = %name, "ospf interface added");
        Ok(())
    }

    /// Brings an interface up: broadcast interfaces enter Waiting and arm
    /// the wait timer; point-to-point interfaces go straight to
    /// PointToPoint. Hellos start immediately unless passive.
    pub fn activate_interface(&self, name: &str) -> Result<()> {
        let now = self.clock.now_ms();
        let mut out = Vec::new();
        {
            let mut ifaces = self.interfaces.lock().unwrap();
            let iface = ifaces.get_mut(name).ok_or(Error::InterfaceNotFound)?;
            if iface.is_up() {
                return Ok(());
            }
            iface.state = match iface.network_type {
                NetworkType::PointToPoint | NetworkType::PointToMultipoint => {
                    InterfaceState::PointToPoint
                }
                NetworkType::Loopback => InterfaceState::Loopback,
                NetworkType::Broadcast | NetworkType::NonBroadcast => InterfaceState::Waiting,
            };
            info!(interface = %name, state = ?iface.state, "ospf interface up");

            if iface.state == InterfaceState::Waiting {
                self.timers
                    .schedule(now + iface.dead_interval as u64 * 1000, TimerKind::Wait(name.to_string()));
            }
            if !iface.passive && iface.state != InterfaceState::Loopback {
                self.timers.schedule(now, TimerKind::Hello(name.to_string()));
            }
            if self.version == OspfVersion::V3 {
                self.originate_link_lsa(iface);
            }
            self.originate_router_lsas(&mut ifaces, &mut out);
        }
        self.schedule_spf();
        self.flush(out);
        Ok(())
    }

    /// Takes an interface down, cancelling its hello and wait timers and
    /// every attached neighbor's dead timer.
    pub fn deactivate_interface(&self, name: &str) -> Result<()> {
        let mut out = Vec::new();
        {
            let mut ifaces = self.interfaces.lock().unwrap();
            let iface = ifaces.get_mut(name).ok_or(Error::InterfaceNotFound)?;
            if !iface.is_up() {
                return Ok(());
            }
            self.timers.cancel(&TimerKind::Hello(name.to_string()));
            self.timers.cancel(&TimerKind::Wait(name.to_string()));
            for rid in iface.neighbors.keys() {
                self.timers.cancel(&TimerKind::Dead(name.to_string(), *rid));
            }
            let was_dr = iface.is_dr();
            iface.neighbors.clear();
            iface.state = InterfaceState::Down;
            iface.dr = None;
            iface.bdr = None;
            info!(interface = %name, "ospf interface down");

            if was_dr {
                let iface_snapshot = iface.clone();
                self.flush_network_lsa(&iface_snapshot, &mut ifaces, &mut out);
            }
            self.originate_router_lsas(&mut ifaces, &mut out);
        }
        self.schedule_spf();
        self.flush(out);
        Ok(())
    }

    /// Cancels all timers, clears the LSDB and empties the route table.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.timers.clear();
        self.lsdb.clear();
        self.routes.lock().unwrap().clear();
        let mut ifaces = self.interfaces.lock().unwrap();
        for iface in ifaces.values_mut() {
            iface.neighbors.clear();
            iface.state = InterfaceState::Down;
            iface.dr = None;
            iface.bdr = None;
        }
        info!(router_id = %self.router_id, "ospf engine shut down");
    }

    /// Snapshot accessors used by the `ip` adapter, tests and displays.
    pub fn interface_snapshot(&self, name: &str) -> Option<OspfInterface> {
        self.interfaces.lock().unwrap().get(name).cloned()
    }

    pub fn interface_names(&self) -> Vec<String> {
        self.interfaces.lock().unwrap().keys().cloned().collect()
    }

    pub fn neighbor_count(&self) -> usize {
        self.interfaces.lock().unwrap().values().map(|i| i.neighbors.len()).sum()
    }

    pub fn neighbors(&self) -> Vec<(String, Neighbor)> {
        let ifaces = self.interfaces.lock().unwrap();
        ifaces
            .values()
            .flat_map(|i| i.neighbors.values().map(|n| (i.name.clone(), n.clone())))
            .collect()
    }

    pub fn routes(&self) -> Vec<Route> {
        self.routes.lock().unwrap().clone()
    }

    pub fn lsdb_size(&self) -> usize {
        self.lsdb.len()
    }

    pub fn database_snapshot(&self, area: AreaId) -> Vec<Lsa> {
        self.lsdb.area_snapshot(area)
    }

    /// Injects an AS-external route, turning this router into an ASBR.
    pub fn originate_external(&self, prefix: Ipv4Addr, prefix_len: u8, metric: u32) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        self.as_boundary.store(true, Ordering::SeqCst);
        let mask = super::interface::prefix_mask(prefix_len);
        let key = LsaKey { lsa_type: LsaType::AsExternal, link_state_id: prefix, adv_router: self.router_id };
        let sequence = self.next_sequence(Ipv4Addr::UNSPECIFIED, &key);
        let lsa = Lsa::new(
            0,
            LsaType::AsExternal,
            prefix,
            self.router_id,
            sequence,
            LsaBody::External(ExternalLsa { mask, metric, forwarding: None }),
        );
        let mut out = Vec::new();
        {
            let mut ifaces = self.interfaces.lock().unwrap();
            self.lsdb.install(Ipv4Addr::UNSPECIFIED, lsa.clone());
            self.flood(&mut ifaces, None, &lsa, Ipv4Addr::UNSPECIFIED, &mut out);
            self.originate_router_lsas(&mut ifaces, &mut out);
        }
        self.schedule_spf();
        self.flush(out);
    }

    /// `processPacket(iface, srcAddr, packet)`. Transient
    /// protocol errors (version/area mismatch, unknown interface) are
    /// dropped silently.
    pub fn process_packet(&self, iface_name: &str, src: IpAddr, packet: &Packet) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        if packet.header.router_id == self.router_id {
            return;
        }
        let mut out = Vec::new();
        {
            let mut ifaces = self.interfaces.lock().unwrap();
            let Some(iface) = ifaces.get(iface_name) else {
                warn!(interface = iface_name, "packet on unknown interface dropped");
                return;
            };
            if !iface.is_up() {
                return;
            }
            if packet.header.version != self.version {
                warn!(version = ?packet.header.version, "version mismatch, packet dropped");
                return;
            }
            if packet.header.area != iface.area {
                warn!(area = %packet.header.area, "area mismatch, packet dropped");
                return;
            }
            let rid = packet.header.router_id;
            match &packet.body {
                PacketBody::Hello(hello) => {
                    self.handle_hello(&mut ifaces, iface_name, src, rid, hello, &mut out)
                }
                PacketBody::DatabaseDescription(dd) => {
                    self.handle_dd(&mut ifaces, iface_name, rid, dd, &mut out)
                }
                PacketBody::LsRequest(request) => {
                    self.handle_ls_request(&mut ifaces, iface_name, rid, request, &mut out)
                }
                PacketBody::LsUpdate(update) => {
                    self.handle_ls_update(&mut ifaces, iface_name, rid, update, &mut out)
                }
                PacketBody::LsAck(ack) => self.handle_ls_ack(&mut ifaces, iface_name, rid, ack),
            }
        }
        self.flush(out);
    }

    /// Drives due timers against the engine's clock. In async mode a
    /// driver task calls this periodically; deterministic tests call it
    /// after advancing a [`super::VirtualClock`].
    pub fn tick(&self) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        let now = self.clock.now_ms();
        for kind in self.timers.due(now) {
            let mut out = Vec::new();
            match kind {
                TimerKind::Hello(name) => {
                    let ifaces = self.interfaces.lock().unwrap();
                    if let Some(iface) = ifaces.get(&name) {
                        if iface.is_up() && !iface.passive {
                            out.push(self.build_hello(iface));
                            self.timers.schedule(
                                now + iface.hello_interval as u64 * 1000,
                                TimerKind::Hello(name),
                            );
                        }
                    }
                }
                TimerKind::Wait(name) => {
                    let mut ifaces = self.interfaces.lock().unwrap();
                    let waiting = ifaces
                        .get(&name)
                        .map(|i| i.state == InterfaceState::Waiting)
                        .unwrap_or(false);
                    if waiting {
                        self.run_election(&mut ifaces, &name, &mut out);
                    }
                }
                TimerKind::Dead(name, rid) => {
                    let mut ifaces = self.interfaces.lock().unwrap();
                    self.expire_neighbor(&mut ifaces, &name, rid, &mut out);
                }
                TimerKind::SpfDelay => {
                    self.run_spf_now(&mut out);
                }
            }
            self.flush(out);
        }
    }

    // ---- hello protocol ---------------------------------------------

    fn build_hello(&self, iface: &OspfInterface) -> Outgoing {
        let hello = Hello {
            network_mask: match self.version {
                OspfVersion::V2 => Some(iface.mask()),
                OspfVersion::V3 => None,
            },
            interface_id: match self.version {
                OspfVersion::V2 => None,
                OspfVersion::V3 => Some(iface.index),
            },
            hello_interval: iface.hello_interval,
            dead_interval: iface.dead_interval,
            priority: iface.priority,
            dr: iface.dr,
            bdr: iface.bdr,
            neighbors: iface.neighbors.keys().copied().collect(),
        };
        (
            iface.name.clone(),
            PacketDst::AllSpfRouters,
            self.packet(iface.area, PacketBody::Hello(hello)),
        )
    }

    fn handle_hello(
        &self,
        ifaces: &mut BTreeMap<String, OspfInterface>,
        iface_name: &str,
        src: IpAddr,
        rid: RouterId,
        hello: &Hello,
        out: &mut Vec<Outgoing>,
    ) {
        let now = self.clock.now_ms();
        let (area, net_type, iface_state, dr, bdr, dead_interval) = {
            let iface = ifaces.get(iface_name).expect("caller checked interface");
            // Mismatched timers mean no neighbor relationship forms at
            // all.
            if hello.hello_interval != iface.hello_interval
                || hello.dead_interval != iface.dead_interval
            {
                debug!(interface = iface_name, neighbor = %rid, "hello timer mismatch, ignored");
                return;
            }
            (iface.area, iface.network_type, iface.state, iface.dr, iface.bdr, iface.dead_interval)
        };

        let two_way = hello.neighbors.contains(&self.router_id);
        let mut needs_election = false;
        let mut start_dd: Option<(RouterId, IpAddr)> = None;
        {
            let iface = ifaces.get_mut(iface_name).expect("caller checked interface");
            let neighbor = iface
                .neighbors
                .entry(rid)
                .or_insert_with(|| Neighbor::new(rid, src, now));
            let prev_state = neighbor.state;
            let prev_priority = neighbor.priority;
            let prev_dr = neighbor.declared_dr;
            let prev_bdr = neighbor.declared_bdr;

            neighbor.address = src;
            neighbor.last_hello_ms = now;
            neighbor.priority = hello.priority;
            neighbor.declared_dr = hello.dr;
            neighbor.declared_bdr = hello.bdr;
            neighbor.state = transition(neighbor.state, NeighborEvent::HelloReceived, false, true);
            if prev_state == NeighborState::Down {
                info!(interface = iface_name, neighbor = %rid, "neighbor discovered");
            }

            self.timers.schedule(
                now + dead_interval as u64 * 1000,
                TimerKind::Dead(iface_name.to_string(), rid),
            );

            if two_way {
                if neighbor.state == NeighborState::Init {
                    let required = adjacency_required(net_type, iface_state, dr, bdr, src);
                    let next = transition(neighbor.state, NeighborEvent::TwoWayReceived, required, true);
                    debug!(interface = iface_name, neighbor = %rid, from = ?neighbor.state, to = ?next, "two-way");
                    neighbor.state = next;
                    if next == NeighborState::ExStart {
                        start_dd = Some((rid, src));
                    }
                    needs_election = true;
                }
            } else if neighbor.state >= NeighborState::TwoWay {
                // The peer stopped listing us: fall back to Init.
                info!(interface = iface_name, neighbor = %rid, "one-way received");
                neighbor.state = transition(neighbor.state, NeighborEvent::OneWay, false, true);
                neighbor.clear_lists();
                needs_election = true;
            }

            if prev_priority != hello.priority || prev_dr != hello.dr || prev_bdr != hello.bdr {
                needs_election = true;
            }
        }

        if let Some((rid, addr)) = start_dd {
            self.start_dd_exchange(ifaces, iface_name, rid, addr, area, out);
        }

        match iface_state {
            InterfaceState::Waiting => {
                // BackupSeen: a declared BDR (or a lone declared DR) ends
                // the waiting period early.
                let backup_seen =
                    hello.bdr == Some(src) || (hello.dr == Some(src) && hello.bdr.is_none());
                if backup_seen {
                    self.run_election(ifaces, iface_name, out);
                }
            }
            InterfaceState::Dr | InterfaceState::Backup | InterfaceState::DrOther => {
                if needs_election {
                    self.run_election(ifaces, iface_name, out);
                }
            }
            _ => {}
        }
    }

    fn expire_neighbor(
        &self,
        ifaces: &mut BTreeMap<String, OspfInterface>,
        iface_name: &str,
        rid: RouterId,
        out: &mut Vec<Outgoing>,
    ) {
        let Some(iface) = ifaces.get_mut(iface_name) else { return };
        if iface.neighbors.remove(&rid).is_none() {
            return;
        }
        info!(interface = iface_name, neighbor = %rid, "neighbor dead timer expired");

        match iface.state {
            InterfaceState::Dr | InterfaceState::Backup | InterfaceState::DrOther => {
                self.run_election(ifaces, iface_name, out);
                // A DR whose last full adjacency died stops advertising
                // the transit network.
                let flush = ifaces
                    .get(iface_name)
                    .filter(|i| i.is_dr() && !i.has_full_neighbor())
                    .cloned();
                if let Some(iface) = flush {
                    self.flush_network_lsa(&iface, ifaces, out);
                }
            }
            _ => {
                self.originate_router_lsas(ifaces, out);
            }
        }
        self.schedule_spf();
    }

    // ---- DR/BDR election --------------------------------------------

    fn run_election(
        &self,
        ifaces: &mut BTreeMap<String, OspfInterface>,
        iface_name: &str,
        out: &mut Vec<Outgoing>,
    ) {
        let mut start_dd: Vec<(RouterId, IpAddr)> = Vec::new();
        let (area, became_dr, lost_dr) = {
            let Some(iface) = ifaces.get_mut(iface_name) else { return };
            if !matches!(iface.network_type, NetworkType::Broadcast | NetworkType::NonBroadcast) {
                return;
            }
            let area = iface.area;
            let mut candidates = Vec::new();
            if iface.priority > 0 {
                candidates.push(Candidate {
                    router_id: self.router_id,
                    address: iface.address,
                    priority: iface.priority,
                    declared_dr: iface.dr,
                    declared_bdr: iface.bdr,
                });
            }
            for neighbor in iface.neighbors.values() {
                if neighbor.state >= NeighborState::TwoWay && neighbor.priority > 0 {
                    candidates.push(Candidate {
                        router_id: neighbor.router_id,
                        address: neighbor.address,
                        priority: neighbor.priority,
                        declared_dr: neighbor.declared_dr,
                        declared_bdr: neighbor.declared_bdr,
                    });
                }
            }

            let was_dr = iface.is_dr();
            let (dr, bdr) = elect_dr_bdr(&candidates);
            let new_state = if dr == Some(iface.address) {
                InterfaceState::Dr
            } else if bdr == Some(iface.address) {
                InterfaceState::Backup
            } else {
                InterfaceState::DrOther
            };
            if iface.dr != dr || iface.bdr != bdr || iface.state != new_state {
                info!(
                    interface = iface_name,
                    dr = ?dr, bdr = ?bdr, state = ?new_state,
                    "dr election settled"
                );
            }
            iface.dr = dr;
            iface.bdr = bdr;
            iface.state = new_state;
            self.timers.cancel(&TimerKind::Wait(iface_name.to_string()));

            // AdjOK to every neighbor at TwoWay or beyond.
            for neighbor in iface.neighbors.values_mut() {
                if neighbor.state < NeighborState::TwoWay {
                    continue;
                }
                let required =
                    adjacency_required(iface.network_type, new_state, dr, bdr, neighbor.address);
                let next = transition(neighbor.state, NeighborEvent::AdjOk, required, true);
                if next != neighbor.state {
                    debug!(interface = iface_name, neighbor = %neighbor.router_id, from = ?neighbor.state, to = ?next, "adj-ok");
                }
                if next == NeighborState::ExStart && neighbor.state == NeighborState::TwoWay {
                    start_dd.push((neighbor.router_id, neighbor.address));
                } else if next == NeighborState::TwoWay && neighbor.state > NeighborState::TwoWay {
                    neighbor.clear_lists();
                }
                neighbor.state = next;
            }

            (
                area,
                !was_dr && new_state == InterfaceState::Dr,
                was_dr && new_state != InterfaceState::Dr,
            )
        };

        for (rid, addr) in start_dd {
            self.start_dd_exchange(ifaces, iface_name, rid, addr, area, out);
        }

        let has_full = ifaces.get(iface_name).map(|i| i.has_full_neighbor()).unwrap_or(false);
        if became_dr && has_full {
            self.originate_network_lsa(ifaces, iface_name, out);
        }
        if lost_dr {
            if let Some(iface) = ifaces.get(iface_name).cloned() {
                self.flush_network_lsa(&iface, ifaces, out);
            }
        }
        self.originate_router_lsas(ifaces, out);
        self.schedule_spf();
    }

    // ---- database exchange ------------------------------------------

    fn start_dd_exchange(
        &self,
        ifaces: &mut BTreeMap<String, OspfInterface>,
        iface_name: &str,
        rid: RouterId,
        address: IpAddr,
        area: AreaId,
        out: &mut Vec<Outgoing>,
    ) {
        let Some(iface) = ifaces.get_mut(iface_name) else { return };
        let Some(neighbor) = iface.neighbors.get_mut(&rid) else { return };
        neighbor.dd_sequence = self.dd_seq.fetch_add(1, Ordering::SeqCst);
        neighbor.local_is_master = self.router_id > rid;
        neighbor.clear_lists();
        debug!(interface = iface_name, neighbor = %rid, seq = neighbor.dd_sequence, "dd exchange started");
        out.push((
            iface_name.to_string(),
            PacketDst::Unicast(address),
            self.packet(
                area,
                PacketBody::DatabaseDescription(DatabaseDescription {
                    sequence: neighbor.dd_sequence,
                    flags: DdFlags { init: true, more: true, master: true },
                    headers: Vec::new(),
                }),
            ),
        ));
    }

    fn handle_dd(
        &self,
        ifaces: &mut BTreeMap<String, OspfInterface>,
        iface_name: &str,
        rid: RouterId,
        dd: &DatabaseDescription,
        out: &mut Vec<Outgoing>,
    ) {
        let (area, address, state) = {
            let Some(iface) = ifaces.get(iface_name) else { return };
            let Some(neighbor) = iface.neighbors.get(&rid) else { return };
            (iface.area, neighbor.address, neighbor.state)
        };

        match state {
            NeighborState::ExStart => {
                self.negotiate_dd(ifaces, iface_name, rid, address, area, dd, out)
            }
            NeighborState::Exchange => {
                self.exchange_dd(ifaces, iface_name, rid, address, area, dd, out)
            }
            NeighborState::Loading | NeighborState::Full => {
                if dd.flags.init {
                    self.restart_exchange(ifaces, iface_name, rid, address, area, out);
                }
                // Duplicates from the master are otherwise ignored.
            }
            _ => {}
        }
    }

    fn negotiate_dd(
        &self,
        ifaces: &mut BTreeMap<String, OspfInterface>,
        iface_name: &str,
        rid: RouterId,
        address: IpAddr,
        area: AreaId,
        dd: &DatabaseDescription,
        out: &mut Vec<Outgoing>,
    ) {
        let summary = self.lsdb.header_snapshot(area);
        let Some(iface) = ifaces.get_mut(iface_name) else { return };
        let Some(neighbor) = iface.neighbors.get_mut(&rid) else { return };

        if dd.flags.init && dd.flags.more && dd.flags.master && dd.headers.is_empty() {
            if u32::from(rid) > u32::from(self.router_id) {
                // Peer wins mastership; adopt its sequence and answer with
                // our first header batch.
                neighbor.local_is_master = false;
                neighbor.dd_sequence = dd.sequence;
                neighbor.state = NeighborState::Exchange;
                neighbor.summary_list = summary;
                let batch = take_batch(&mut neighbor.summary_list, DD_MAX_HEADERS);
                let more = !neighbor.summary_list.is_empty();
                debug!(interface = iface_name, neighbor = %rid, "negotiation done (slave)");
                out.push((
                    iface_name.to_string(),
                    PacketDst::Unicast(address),
                    self.packet(
                        area,
                        PacketBody::DatabaseDescription(DatabaseDescription {
                            sequence: dd.sequence,
                            flags: DdFlags { init: false, more, master: false },
                            headers: batch,
                        }),
                    ),
                ));
            } else {
                // We are the master; the peer has not yet seen our initial
                // DD, so poke it again.
                out.push((
                    iface_name.to_string(),
                    PacketDst::Unicast(address),
                    self.packet(
                        area,
                        PacketBody::DatabaseDescription(DatabaseDescription {
                            sequence: neighbor.dd_sequence,
                            flags: DdFlags { init: true, more: true, master: true },
                            headers: Vec::new(),
                        }),
                    ),
                ));
            }
            return;
        }

        // Slave's answer to our initial DD confirms us as master.
        if !dd.flags.init
            && !dd.flags.master
            && dd.sequence == neighbor.dd_sequence
            && u32::from(self.router_id) > u32::from(rid)
        {
            neighbor.local_is_master = true;
            neighbor.state = NeighborState::Exchange;
            neighbor.summary_list = summary;
            record_missing(&self.lsdb, area, &dd.headers, neighbor);
            debug!(interface = iface_name, neighbor = %rid, "negotiation done (master)");

            neighbor.dd_sequence = neighbor.dd_sequence.wrapping_add(1);
            let batch = take_batch(&mut neighbor.summary_list, DD_MAX_HEADERS);
            let more = !neighbor.summary_list.is_empty();
            let peer_done = !dd.flags.more;
            out.push((
                iface_name.to_string(),
                PacketDst::Unicast(address),
                self.packet(
                    area,
                    PacketBody::DatabaseDescription(DatabaseDescription {
                        sequence: neighbor.dd_sequence,
                        flags: DdFlags { init: false, more, master: true },
                        headers: batch,
                    }),
                ),
            ));
            if peer_done && !more {
                self.finish_exchange(ifaces, iface_name, rid, address, area, out);
            }
        }
    }

    fn exchange_dd(
        &self,
        ifaces: &mut BTreeMap<String, OspfInterface>,
        iface_name: &str,
        rid: RouterId,
        address: IpAddr,
        area: AreaId,
        dd: &DatabaseDescription,
        out: &mut Vec<Outgoing>,
    ) {
        enum Step {
            Restart,
            Done,
            Reply(DatabaseDescription),
            Ignore,
        }

        let step = {
            let Some(iface) = ifaces.get_mut(iface_name) else { return };
            let Some(neighbor) = iface.neighbors.get_mut(&rid) else { return };

            if dd.flags.init || dd.flags.master == neighbor.local_is_master {
                // Unexpected negotiation restart or a master/slave flip.
                Step::Restart
            } else if neighbor.local_is_master {
                // Slave echo of our current sequence.
                if dd.sequence != neighbor.dd_sequence {
                    Step::Restart
                } else {
                    record_missing(&self.lsdb, area, &dd.headers, neighbor);
                    if neighbor.summary_list.is_empty() && !dd.flags.more {
                        Step::Done
                    } else {
                        neighbor.dd_sequence = neighbor.dd_sequence.wrapping_add(1);
                        let batch = take_batch(&mut neighbor.summary_list, DD_MAX_HEADERS);
                        let more = !neighbor.summary_list.is_empty();
                        Step::Reply(DatabaseDescription {
                            sequence: neighbor.dd_sequence,
                            flags: DdFlags { init: false, more, master: true },
                            headers: batch,
                        })
                    }
                }
            } else {
                // Master packet: the next sequence advances the exchange;
                // a repeat of the previous one is a duplicate to ignore.
                if dd.sequence == neighbor.dd_sequence {
                    Step::Ignore
                } else if dd.sequence != neighbor.dd_sequence.wrapping_add(1) {
                    Step::Restart
                } else {
                    neighbor.dd_sequence = dd.sequence;
                    record_missing(&self.lsdb, area, &dd.headers, neighbor);
                    let batch = take_batch(&mut neighbor.summary_list, DD_MAX_HEADERS);
                    let more = !neighbor.summary_list.is_empty();
                    if !dd.flags.more && !more && batch.is_empty() {
                        // Nothing left on either side: acknowledge and
                        // finish.
                        out.push((
                            iface_name.to_string(),
                            PacketDst::Unicast(address),
                            self.packet(
                                area,
                                PacketBody::DatabaseDescription(DatabaseDescription {
                                    sequence: dd.sequence,
                                    flags: DdFlags { init: false, more: false, master: false },
                                    headers: Vec::new(),
                                }),
                            ),
                        ));
                        Step::Done
                    } else {
                        let finishing = !dd.flags.more && !more;
                        out.push((
                            iface_name.to_string(),
                            PacketDst::Unicast(address),
                            self.packet(
                                area,
                                PacketBody::DatabaseDescription(DatabaseDescription {
                                    sequence: dd.sequence,
                                    flags: DdFlags { init: false, more, master: false },
                                    headers: batch,
                                }),
                            ),
                        ));
                        if finishing {
                            Step::Done
                        } else {
                            Step::Ignore
                        }
                    }
                }
            }
        };

        match step {
            Step::Restart => self.restart_exchange(ifaces, iface_name, rid, address, area, out),
            Step::Done => self.finish_exchange(ifaces, iface_name, rid, address, area, out),
            Step::Reply(reply) => out.push((
                iface_name.to_string(),
                PacketDst::Unicast(address),
                self.packet(area, PacketBody::DatabaseDescription(reply)),
            )),
            Step::Ignore => {}
        }
    }

    /// ExchangeDone: Loading when the request list is non-empty, Full
    /// otherwise.
    fn finish_exchange(
        &self,
        ifaces: &mut BTreeMap<String, OspfInterface>,
        iface_name: &str,
        rid: RouterId,
        address: IpAddr,
        area: AreaId,
        out: &mut Vec<Outgoing>,
    ) {
        let requests = {
            let Some(iface) = ifaces.get_mut(iface_name) else { return };
            let Some(neighbor) = iface.neighbors.get_mut(&rid) else { return };
            let empty = neighbor.request_list.is_empty();
            neighbor.state =
                transition(NeighborState::Exchange, NeighborEvent::ExchangeDone, true, empty);
            debug!(interface = iface_name, neighbor = %rid, state = ?neighbor.state, "exchange done");
            if empty {
                Vec::new()
            } else {
                neighbor.request_list.clone()
            }
        };

        if requests.is_empty() {
            self.full_transition(ifaces, iface_name, rid, out);
        } else {
            for chunk in requests.chunks(LSR_MAX_ENTRIES) {
                out.push((
                    iface_name.to_string(),
                    PacketDst::Unicast(address),
                    self.packet(area, PacketBody::LsRequest(LsRequest { entries: chunk.to_vec() })),
                ));
            }
        }
    }

    fn restart_exchange(
        &self,
        ifaces: &mut BTreeMap<String, OspfInterface>,
        iface_name: &str,
        rid: RouterId,
        address: IpAddr,
        area: AreaId,
        out: &mut Vec<Outgoing>,
    ) {
        {
            let Some(iface) = ifaces.get_mut(iface_name) else { return };
            let Some(neighbor) = iface.neighbors.get_mut(&rid) else { return };
            warn!(interface = iface_name, neighbor = %rid, "sequence mismatch, adjacency restarted");
            neighbor.state =
                transition(neighbor.state, NeighborEvent::SeqNumberMismatch, true, true);
            neighbor.clear_lists();
        }
        self.start_dd_exchange(ifaces, iface_name, rid, address, area, out);
    }

    /// A neighbor reached Full: re-originate the Router-LSA, refresh the
    /// Network-LSA when we are DR, and schedule SPF.
    fn full_transition(
        &self,
        ifaces: &mut BTreeMap<String, OspfInterface>,
        iface_name: &str,
        rid: RouterId,
        out: &mut Vec<Outgoing>,
    ) {
        {
            let Some(iface) = ifaces.get_mut(iface_name) else { return };
            let Some(neighbor) = iface.neighbors.get_mut(&rid) else { return };
            neighbor.state = NeighborState::Full;
            info!(interface = iface_name, neighbor = %rid, "adjacency full");
        }
        let is_dr = ifaces.get(iface_name).map(|i| i.is_dr()).unwrap_or(false);
        if is_dr {
            self.originate_network_lsa(ifaces, iface_name, out);
        }
        self.originate_router_lsas(ifaces, out);
        self.schedule_spf();
    }

    fn handle_ls_request(
        &self,
        ifaces: &mut BTreeMap<String, OspfInterface>,
        iface_name: &str,
        rid: RouterId,
        request: &LsRequest,
        out: &mut Vec<Outgoing>,
    ) {
        let (area, address, state) = {
            let Some(iface) = ifaces.get(iface_name) else { return };
            let Some(neighbor) = iface.neighbors.get(&rid) else { return };
            (iface.area, neighbor.address, neighbor.state)
        };
        if state < NeighborState::Exchange {
            return;
        }

        let mut lsas = Vec::new();
        for key in &request.entries {
            match self.lsdb.lookup(area, key) {
                Some(lsa) => lsas.push(lsa),
                None => {
                    // BadLSReq: the peer asked for something we never
                    // advertised.
                    self.restart_exchange(ifaces, iface_name, rid, address, area, out);
                    return;
                }
            }
        }
        out.push((
            iface_name.to_string(),
            PacketDst::Unicast(address),
            self.packet(area, PacketBody::LsUpdate(LsUpdate { lsas })),
        ));
    }

    fn handle_ls_update(
        &self,
        ifaces: &mut BTreeMap<String, OspfInterface>,
        iface_name: &str,
        rid: RouterId,
        update: &LsUpdate,
        out: &mut Vec<Outgoing>,
    ) {
        let (area, address) = {
            let Some(iface) = ifaces.get(iface_name) else { return };
            let Some(neighbor) = iface.neighbors.get(&rid) else { return };
            if neighbor.state < NeighborState::Exchange {
                return;
            }
            (iface.area, neighbor.address)
        };

        let mut acked = Vec::new();
        let mut lsdb_changed = false;
        for lsa in &update.lsas {
            let key = lsa.header.key();

            // Receiving a fresher instance of our own LSA: outbid it
            // rather than adopt it.
            if lsa.header.adv_router == self.router_id {
                if let Some(own) = self.lsdb.lookup(area, &key) {
                    if compare_freshness(&lsa.header, &own.header) == std::cmp::Ordering::Greater {
                        let mut reissued = own.clone();
                        reissued.header.sequence = lsa.header.sequence.wrapping_add(1);
                        self.lsdb.install(area, reissued.clone());
                        self.flood(ifaces, None, &reissued, area, out);
                        lsdb_changed = true;
                    }
                }
                acked.push(lsa.header);
                continue;
            }

            match self.lsdb.install(area, lsa.clone()) {
                InstallOutcome::Installed => {
                    debug!(interface = iface_name, lsa = ?key, "lsa installed");
                    lsdb_changed = true;
                    if let Some(iface) = ifaces.get_mut(iface_name) {
                        if let Some(neighbor) = iface.neighbors.get_mut(&rid) {
                            neighbor.request_list.retain(|k| k != &key);
                        }
                    }
                    self.flood(ifaces, Some((iface_name, rid)), lsa, area, out);
                    acked.push(lsa.header);
                    // A MaxAge instance is a flush: it has been reflooded,
                    // now drop it from the database.
                    if lsa.header.is_max_age() {
                        self.lsdb.remove(area, &key);
                    }
                }
                InstallOutcome::Duplicate => {
                    acked.push(lsa.header);
                }
                InstallOutcome::Stale => {}
            }
        }

        if !acked.is_empty() {
            out.push((
                iface_name.to_string(),
                PacketDst::Unicast(address),
                self.packet(area, PacketBody::LsAck(LsAck { headers: acked })),
            ));
        }

        // LoadingDone once the request list drains.
        let loading_done = {
            let Some(iface) = ifaces.get_mut(iface_name) else { return };
            let Some(neighbor) = iface.neighbors.get_mut(&rid) else { return };
            neighbor.state == NeighborState::Loading && neighbor.request_list.is_empty()
        };
        if loading_done {
            self.full_transition(ifaces, iface_name, rid, out);
        }
        if lsdb_changed {
            self.schedule_spf();
        }
    }

    fn handle_ls_ack(
        &self,
        ifaces: &mut BTreeMap<String, OspfInterface>,
        iface_name: &str,
        rid: RouterId,
        ack: &LsAck,
    ) {
        let Some(iface) = ifaces.get_mut(iface_name) else { return };
        let Some(neighbor) = iface.neighbors.get_mut(&rid) else { return };
        for header in &ack.headers {
            let key = header.key();
            neighbor.retransmission_list.retain(|k| k != &key);
        }
    }

    // ---- flooding ----------------------------------------------------

    /// Forwards `lsa` to every Full/Exchange/Loading neighbor on every
    /// non-passive interface, except back at the sender. AS-scoped LSAs
    /// cross area boundaries; everything else stays within `area`.
    fn flood(
        &self,
        ifaces: &mut BTreeMap<String, OspfInterface>,
        source: Option<(&str, RouterId)>,
        lsa: &Lsa,
        area: AreaId,
        out: &mut Vec<Outgoing>,
    ) {
        for iface in ifaces.values_mut() {
            if !iface.is_up() || iface.passive {
                continue;
            }
            if !lsa.header.lsa_type.is_as_scoped() && iface.area != area {
                continue;
            }
            if let Some((src_iface, _)) = source {
                if iface.name == src_iface {
                    continue;
                }
            }
            let mut any = false;
            let key = lsa.header.key();
            for neighbor in iface.neighbors.values_mut() {
                if neighbor.state < NeighborState::Exchange {
                    continue;
                }
                if let Some((_, src_rid)) = source {
                    if neighbor.router_id == src_rid {
                        continue;
                    }
                }
                if !neighbor.retransmission_list.contains(&key) {
                    neighbor.retransmission_list.push(key);
                }
                any = true;
            }
            if any {
                // DROthers reach only the DR/BDR group; the DR and BDR
                // relay to everyone (RFC 2328 §13.3).
                let dst = if iface.state == InterfaceState::DrOther {
                    PacketDst::AllDRouters
                } else {
                    PacketDst::AllSpfRouters
                };
                out.push((
                    iface.name.clone(),
                    dst,
                    self.packet(iface.area, PacketBody::LsUpdate(LsUpdate { lsas: vec![lsa.clone()] })),
                ));
            }
        }
    }

    // ---- origination -------------------------------------------------

    fn next_sequence(&self, area: AreaId, key: &LsaKey) -> u32 {
        match self.lsdb.lookup(area, key) {
            Some(existing) if existing.header.adv_router == self.router_id => {
                existing.header.sequence.wrapping_add(1)
            }
            _ => INITIAL_SEQUENCE,
        }
    }

    /// Re-originates this router's Router-LSA in every area it touches.
    fn originate_router_lsas(
        &self,
        ifaces: &mut BTreeMap<String, OspfInterface>,
        out: &mut Vec<Outgoing>,
    ) {
        let mut areas: Vec<AreaId> = ifaces.values().map(|i| i.area).collect();
        areas.sort();
        areas.dedup();
        let border_router = areas.len() > 1;

        for area in &areas {
            let mut links = Vec::new();
            let mut v6_prefixes = Vec::new();
            for iface in ifaces.values().filter(|i| i.area == *area && i.is_up()) {
                // OSPFv3 carries no addresses in router links; interface
                // ids stand in for the link data there.
                let link_data = match iface.address {
                    IpAddr::V4(addr) => addr,
                    IpAddr::V6(_) => Ipv4Addr::from(iface.index),
                };
                match iface.network_type {
                    NetworkType::PointToPoint | NetworkType::PointToMultipoint => {
                        for neighbor in iface.full_neighbors() {
                            links.push(RouterLink {
                                kind: RouterLinkKind::PointToPoint,
                                id: neighbor.router_id,
                                data: link_data,
                                metric: iface.cost,
                            });
                        }
                        self.push_prefix_link(iface, &mut links, &mut v6_prefixes);
                    }
                    NetworkType::Broadcast | NetworkType::NonBroadcast => {
                        let transit = iface.has_full_neighbor() && iface.dr.is_some();
                        match (transit, self.transit_link_id(iface)) {
                            (true, Some(id)) => links.push(RouterLink {
                                kind: RouterLinkKind::Transit,
                                id,
                                data: link_data,
                                metric: iface.cost,
                            }),
                            _ => self.push_prefix_link(iface, &mut links, &mut v6_prefixes),
                        }
                    }
                    NetworkType::Loopback => {
                        if let IpAddr::V4(addr) = iface.address {
                            links.push(RouterLink {
                                kind: RouterLinkKind::Stub,
                                id: addr,
                                data: Ipv4Addr::BROADCAST,
                                metric: 0,
                            });
                        }
                    }
                }
            }

            let key = LsaKey {
                lsa_type: LsaType::Router,
                link_state_id: self.router_id,
                adv_router: self.router_id,
            };
            let lsa = Lsa::new(
                0,
                LsaType::Router,
                self.router_id,
                self.router_id,
                self.next_sequence(*area, &key),
                LsaBody::Router(RouterLsa {
                    border_router,
                    as_boundary: self.as_boundary.load(Ordering::SeqCst),
                    links,
                }),
            );
            self.lsdb.install(*area, lsa.clone());
            self.flood(ifaces, None, &lsa, *area, out);

            if self.version == OspfVersion::V3 && !v6_prefixes.is_empty() {
                let key = LsaKey {
                    lsa_type: LsaType::IntraAreaPrefix,
                    link_state_id: Ipv4Addr::new(0, 0, 0, 1),
                    adv_router: self.router_id,
                };
                let prefix_lsa = Lsa::new(
                    0,
                    LsaType::IntraAreaPrefix,
                    Ipv4Addr::new(0, 0, 0, 1),
                    self.router_id,
                    self.next_sequence(*area, &key),
                    LsaBody::IntraAreaPrefix(IntraAreaPrefixLsa {
                        ref_type: LsaType::Router,
                        ref_link_state_id: self.router_id,
                        ref_adv_router: self.router_id,
                        prefixes: v6_prefixes.clone(),
                    }),
                );
                self.lsdb.install(*area, prefix_lsa.clone());
                self.flood(ifaces, None, &prefix_lsa, *area, out);
            }
        }
    }

    /// The Network-LSA link-state id a transit link on `iface` points at:
    /// the DR's interface address in v2, the DR's router id in v3.
    fn transit_link_id(&self, iface: &OspfInterface) -> Option<Ipv4Addr> {
        match (self.version, iface.dr?) {
            (OspfVersion::V2, IpAddr::V4(dr)) => Some(dr),
            (OspfVersion::V2, IpAddr::V6(_)) => None,
            (OspfVersion::V3, dr_addr) => {
                if dr_addr == iface.address {
                    Some(self.router_id)
                } else {
                    iface
                        .neighbors
                        .values()
                        .find(|n| n.address == dr_addr)
                        .map(|n| n.router_id)
                }
            }
        }
    }

    /// Adds the subnet of `iface` as a v2 stub link or a v3 prefix.
    fn push_prefix_link(
        &self,
        iface: &OspfInterface,
        links: &mut Vec<RouterLink>,
        v6_prefixes: &mut Vec<Ipv6Prefix>,
    ) {
        match (self.version, iface.address) {
            (OspfVersion::V2, IpAddr::V4(_)) => {
                if let Some(network) = iface.network() {
                    links.push(RouterLink {
                        kind: RouterLinkKind::Stub,
                        id: network,
                        data: iface.mask(),
                        metric: iface.cost,
                    });
                }
            }
            (OspfVersion::V3, IpAddr::V6(addr)) => {
                v6_prefixes.push(Ipv6Prefix {
                    prefix: mask_v6(addr, iface.prefix_len),
                    length: iface.prefix_len,
                    metric: iface.cost,
                });
            }
            _ => {}
        }
    }

    /// Originated only while this router is DR with at least one Full
    /// neighbor: lists the DR itself plus each Full neighbor.
    fn originate_network_lsa(
        &self,
        ifaces: &mut BTreeMap<String, OspfInterface>,
        iface_name: &str,
        out: &mut Vec<Outgoing>,
    ) {
        let (area, ls_id, mask, attached) = {
            let Some(iface) = ifaces.get(iface_name) else { return };
            if !iface.is_dr() || !iface.has_full_neighbor() {
                return;
            }
            let (ls_id, mask) = match iface.address {
                IpAddr::V4(addr) => (addr, iface.mask()),
                // v3: the DR's router id identifies the network; prefixes
                // travel separately on Intra-Area-Prefix-LSAs.
                IpAddr::V6(_) => (self.router_id, Ipv4Addr::UNSPECIFIED),
            };
            let mut attached = vec![self.router_id];
            attached.extend(iface.full_neighbors().map(|n| n.router_id));
            (iface.area, ls_id, mask, attached)
        };

        let key =
            LsaKey { lsa_type: LsaType::Network, link_state_id: ls_id, adv_router: self.router_id };
        let lsa = Lsa::new(
            0,
            LsaType::Network,
            ls_id,
            self.router_id,
            self.next_sequence(area, &key),
            LsaBody::Network(NetworkLsa { mask, attached }),
        );
        debug!(interface = iface_name, "network lsa originated");
        self.lsdb.install(area, lsa.clone());
        self.flood(ifaces, None, &lsa, area, out);
        self.schedule_spf();
    }

    /// Prematurely ages our Network-LSA for `iface` out of existence.
    fn flush_network_lsa(
        &self,
        iface: &OspfInterface,
        ifaces: &mut BTreeMap<String, OspfInterface>,
        out: &mut Vec<Outgoing>,
    ) {
        let ls_id = match iface.address {
            IpAddr::V4(addr) => addr,
            IpAddr::V6(_) => self.router_id,
        };
        let key =
            LsaKey { lsa_type: LsaType::Network, link_state_id: ls_id, adv_router: self.router_id };
        let Some(existing) = self.lsdb.lookup(iface.area, &key) else { return };
        let flush = Lsa::new(
            MAX_AGE,
            LsaType::Network,
            ls_id,
            self.router_id,
            existing.header.sequence.wrapping_add(1),
            existing.body.clone(),
        );
        self.flood(ifaces, None, &flush, iface.area, out);
        self.lsdb.remove(iface.area, &key);
        self.schedule_spf();
    }

    /// OSPFv3 Link-LSA for one interface.
    fn originate_link_lsa(&self, iface: &OspfInterface) {
        let link_local = match iface.address {
            IpAddr::V6(addr) if (addr.segments()[0] & 0xffc0) == 0xfe80 => addr,
            _ => Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, iface.index as u16),
        };
        let prefixes = match iface.address {
            IpAddr::V6(addr) => vec![Ipv6Prefix {
                prefix: mask_v6(addr, iface.prefix_len),
                length: iface.prefix_len,
                metric: iface.cost,
            }],
            IpAddr::V4(_) => Vec::new(),
        };
        let ls_id = Ipv4Addr::from(iface.index);
        let key =
            LsaKey { lsa_type: LsaType::Link, link_state_id: ls_id, adv_router: self.router_id };
        let lsa = Lsa::new(
            0,
            LsaType::Link,
            ls_id,
            self.router_id,
            self.next_sequence(iface.area, &key),
            LsaBody::Link(LinkLsa { link_local, priority: iface.priority, prefixes }),
        );
        // Link-LSAs have link-local scope: installed, described in DD
        // exchanges, but never flooded beyond the link.
        self.lsdb.install(iface.area, lsa);
    }

    // ---- SPF ---------------------------------------------------------

    /// Coalesces SPF requests: a pending run absorbs further triggers.
    fn schedule_spf(&self) {
        if !self.spf_pending.swap(true, Ordering::SeqCst) {
            self.timers.schedule(self.clock.now_ms() + SPF_DELAY_MS, TimerKind::SpfDelay);
        }
    }

    fn run_spf_now(&self, out: &mut Vec<Outgoing>) {
        self.spf_pending.store(false, Ordering::SeqCst);

        let (areas, locals) = {
            let ifaces = self.interfaces.lock().unwrap();
            let mut areas: Vec<AreaId> = ifaces.values().map(|i| i.area).collect();
            areas.sort();
            areas.dedup();
            let locals: HashMap<AreaId, Vec<LocalInterface>> = areas
                .iter()
                .map(|area| {
                    let v = ifaces
                        .values()
                        .filter(|i| i.area == *area && i.is_up())
                        .map(|i| LocalInterface {
                            name: i.name.clone(),
                            address: i.address,
                            neighbor_addresses: i
                                .neighbors
                                .values()
                                .map(|n| (n.router_id, n.address))
                                .collect(),
                        })
                        .collect();
                    (*area, v)
                })
                .collect();
            (areas, locals)
        };

        let mut routes = Vec::new();
        for area in &areas {
            let lsas = self.lsdb.area_snapshot(*area);
            routes.extend(run_spf(self.router_id, *area, &lsas, &locals[area]));
        }
        info!(router_id = %self.router_id, routes = routes.len(), "routing table rebuilt");
        *self.routes.lock().unwrap() = routes.clone();

        // ABR duty: summarize each area's intra-area routes into the
        // others.
        if areas.len() > 1 {
            let mut ifaces = self.interfaces.lock().unwrap();
            for area in &areas {
                for route in routes.iter().filter(|r| {
                    r.area != *area
                        && r.origin == super::spf::RouteOrigin::IntraArea
                        && r.prefix.is_ipv4()
                }) {
                    let IpAddr::V4(prefix) = route.prefix else { continue };
                    let key = LsaKey {
                        lsa_type: LsaType::SummaryNetwork,
                        link_state_id: prefix,
                        adv_router: self.router_id,
                    };
                    let lsa = Lsa::new(
                        0,
                        LsaType::SummaryNetwork,
                        prefix,
                        self.router_id,
                        self.next_sequence(*area, &key),
                        LsaBody::Summary(super::lsa::SummaryLsa {
                            mask: super::interface::prefix_mask(route.prefix_len),
                            metric: route.cost,
                        }),
                    );
                    if self.lsdb.install(*area, lsa.clone()) == InstallOutcome::Installed {
                        self.flood(&mut ifaces, None, &lsa, *area, out);
                    }
                }
            }
        }
    }

    /// Runs a pending SPF immediately, bypassing the coalescing delay.
    /// Test scaffolding for deterministic route assertions.
    pub fn run_spf_blocking(&self) -> Vec<Route> {
        let mut out = Vec::new();
        self.run_spf_now(&mut out);
        self.flush(out);
        self.routes()
    }

    // ---- plumbing ----------------------------------------------------

    fn packet(&self, area: AreaId, body: PacketBody) -> Packet {
        Packet {
            header: PacketHeader { version: self.version, router_id: self.router_id, area },
            body,
        }
    }

    /// Delivers queued packets through the send callback, outside every
    /// lock. Without a callback they accumulate in the outbox.
    fn flush(&self, out: Vec<Outgoing>) {
        if out.is_empty() {
            return;
        }
        let callback = self.send.lock().unwrap().clone();
        match callback {
            Some(cb) => {
                for (iface, dst, packet) in out {
                    cb(&iface, dst, &packet);
                }
            }
            None => self.outbox.lock().unwrap().extend(out),
        }
    }
}

fn take_batch(list: &mut Vec<LsaHeader>, max: usize) -> Vec<LsaHeader> {
    let n = list.len().min(max);
    list.drain(..n).collect()
}

/// Records into the request list every described LSA that is missing or
/// newer than our copy.
fn record_missing(lsdb: &Lsdb, area: AreaId, headers: &[LsaHeader], neighbor: &mut Neighbor) {
    for header in headers {
        let key = header.key();
        let wanted = match lsdb.lookup(area, &key) {
            None => true,
            Some(existing) => {
                compare_freshness(header, &existing.header) == std::cmp::Ordering::Greater
            }
        };
        if wanted && !neighbor.request_list.contains(&key) {
            neighbor.request_list.push(key);
        }
    }
}

fn mask_v6(addr: Ipv6Addr, prefix_len: u8) -> Ipv6Addr {
    let bits = u128::from(addr);
    let mask = if prefix_len == 0 { 0 } else { u128::MAX << (128 - prefix_len.min(128) as u32) };
    Ipv6Addr::from(bits & mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ospf::clock::VirtualClock;

    fn engine(rid: [u8; 4], clock: Arc<VirtualClock>) -> OspfEngine {
        OspfEngine::new(OspfVersion::V2, Ipv4Addr::from(rid), clock)
    }

    fn broadcast_iface(addr: [u8; 4]) -> InterfaceSettings {
        InterfaceSettings::new(
            "eth0",
            IpAddr::V4(Ipv4Addr::from(addr)),
            24,
            Ipv4Addr::UNSPECIFIED,
        )
    }

    fn hello_from(engine: &OspfEngine, iface: &str) -> Packet {
        let snapshot = engine.interface_snapshot(iface).unwrap();
        let (_, _, packet) = engine.build_hello(&snapshot);
        packet
    }

    #[test]
    fn first_hello_creates_init_neighbor() {
        let clock = Arc::new(VirtualClock::new());
        let a = engine([1, 1, 1, 1], clock.clone());
        a.add_interface(broadcast_iface([10, 0, 0, 1])).unwrap();
        a.activate_interface("eth0").unwrap();

        let b = engine([2, 2, 2, 2], clock);
        b.add_interface(broadcast_iface([10, 0, 0, 2])).unwrap();
        b.activate_interface("eth0").unwrap();

        let hello = hello_from(&b, "eth0");
        a.process_packet("eth0", IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)), &hello);

        let iface = a.interface_snapshot("eth0").unwrap();
        let neighbor = iface.neighbors.get(&Ipv4Addr::new(2, 2, 2, 2)).expect("neighbor created");
        assert_eq!(neighbor.state, NeighborState::Init);
    }

    #[test]
    fn mismatched_dead_interval_creates_no_neighbor() {
        let clock = Arc::new(VirtualClock::new());
        let a = engine([1, 1, 1, 1], clock.clone());
        a.add_interface(broadcast_iface([10, 0, 0, 1])).unwrap();
        a.activate_interface("eth0").unwrap();

        let b = engine([2, 2, 2, 2], clock);
        let mut settings = broadcast_iface([10, 0, 0, 2]);
        settings.dead_interval = 120;
        b.add_interface(settings).unwrap();
        b.activate_interface("eth0").unwrap();

        let hello = hello_from(&b, "eth0");
        a.process_packet("eth0", IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)), &hello);
        assert_eq!(a.neighbor_count(), 0);
    }

    #[test]
    fn hello_listing_us_reaches_two_way() {
        let clock = Arc::new(VirtualClock::new());
        let a = engine([1, 1, 1, 1], clock.clone());
        a.add_interface(broadcast_iface([10, 0, 0, 1])).unwrap();
        a.activate_interface("eth0").unwrap();

        let hello = Hello {
            network_mask: Some(Ipv4Addr::new(255, 255, 255, 0)),
            interface_id: None,
            hello_interval: 10,
            dead_interval: 40,
            priority: 1,
            dr: None,
            bdr: None,
            neighbors: vec![Ipv4Addr::new(1, 1, 1, 1)],
        };
        let packet = Packet {
            header: PacketHeader {
                version: OspfVersion::V2,
                router_id: Ipv4Addr::new(2, 2, 2, 2),
                area: Ipv4Addr::UNSPECIFIED,
            },
            body: PacketBody::Hello(hello),
        };
        a.process_packet("eth0", IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)), &packet);

        let iface = a.interface_snapshot("eth0").unwrap();
        let neighbor = iface.neighbors.get(&Ipv4Addr::new(2, 2, 2, 2)).unwrap();
        // Interface still Waiting: no DR yet, so no adjacency required.
        assert_eq!(neighbor.state, NeighborState::TwoWay);
    }

    #[test]
    fn version_mismatch_is_dropped() {
        let clock = Arc::new(VirtualClock::new());
        let a = engine([1, 1, 1, 1], clock);
        a.add_interface(broadcast_iface([10, 0, 0, 1])).unwrap();
        a.activate_interface("eth0").unwrap();

        let hello = Hello {
            network_mask: None,
            interface_id: Some(1),
            hello_interval: 10,
            dead_interval: 40,
            priority: 1,
            dr: None,
            bdr: None,
            neighbors: vec![],
        };
        let packet = Packet {
            header: PacketHeader {
                version: OspfVersion::V3,
                router_id: Ipv4Addr::new(2, 2, 2, 2),
                area: Ipv4Addr::UNSPECIFIED,
            },
            body: PacketBody::Hello(hello),
        };
        a.process_packet("eth0", IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)), &packet);
        assert_eq!(a.neighbor_count(), 0);
    }

    #[test]
    fn shutdown_clears_database_and_routes() {
        let clock = Arc::new(VirtualClock::new());
        let a = engine([1, 1, 1, 1], clock);
        a.add_interface(broadcast_iface([10, 0, 0, 1])).unwrap();
        a.activate_interface("eth0").unwrap();
        assert!(a.lsdb_size() > 0);

        a.shutdown();
        assert_eq!(a.lsdb_size(), 0);
        assert!(a.routes().is_empty());
    }
}
