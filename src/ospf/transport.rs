//! Async packet plumbing between engines.
//!
//! The engine itself is synchronous; in async mode a driver task ticks it
//! and pushes its queued packets through a [`PacketTransport`]. The
//! bundled [`Segment`] models one shared broadcast segment, which is all
//! the simulator's virtual links need; a real deployment of multiple
//! devices would implement the trait over its own channels.

use std::net::IpAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::engine::OspfEngine;
use super::packet::{Packet, PacketDst};

/// Carries packets from one engine toward whatever is attached on the far
/// side of `iface`.
#[async_trait]
pub trait PacketTransport: Send + Sync {
    async fn forward(&self, iface: &str, dst: PacketDst, packet: Packet);
}

struct Attachment {
    engine: Arc<OspfEngine>,
    iface: String,
    address: IpAddr,
}

/// One shared broadcast segment. Multicast destinations reach every
/// attached engine except the sender; unicast reaches the one attachment
/// holding that address.
pub struct Segment {
    attachments: Mutex<Vec<Attachment>>,
}

impl Segment {
    pub fn new() -> Arc<Self> {
        Arc::new(Segment { attachments: Mutex::new(Vec::new()) })
    }

    /// Attaches `engine`'s interface `iface`, reachable at `address`.
    pub fn attach(&self, engine: Arc<OspfEngine>, iface: &str, address: IpAddr) {
        self.attachments.lock().unwrap().push(Attachment {
            engine,
            iface: iface.to_string(),
            address,
        });
    }

    /// A handle bound to one attachment, usable as that engine's
    /// transport.
    pub fn port(self: &Arc<Self>, address: IpAddr) -> SegmentPort {
        SegmentPort { segment: Arc::clone(self), address }
    }

    fn deliver(&self, from: IpAddr, dst: PacketDst, packet: &Packet) {
        let attachments = self.attachments.lock().unwrap();
        for attachment in attachments.iter() {
            if attachment.address == from {
                continue;
            }
            if let PacketDst::Unicast(addr) = dst {
                if attachment.address != addr {
                    continue;
                }
            }
            debug!(to = %attachment.address, kind = packet.kind(), "segment delivery");
            attachment.engine.process_packet(&attachment.iface, from, packet);
        }
    }
}

/// The sending side of one [`Segment`] attachment.
pub struct SegmentPort {
    segment: Arc<Segment>,
    address: IpAddr,
}

#[async_trait]
impl PacketTransport for SegmentPort {
    async fn forward(&self, _iface: &str, dst: PacketDst, packet: Packet) {
        self.segment.deliver(self.address, dst, &packet);
    }
}

/// Drives `engine` in async mode: ticks it on a fixed cadence and pushes
/// queued packets through `transport`. Runs until the engine shuts down.
pub async fn drive(
    engine: Arc<OspfEngine>,
    transport: Arc<dyn PacketTransport>,
    tick_interval: Duration,
) {
    loop {
        engine.tick();
        for (iface, dst, packet) in engine.drain_outbox() {
            transport.forward(&iface, dst, packet).await;
        }
        if !engine.is_running() {
            break;
        }
        tokio::time::sleep(tick_interval).await;
    }
}
