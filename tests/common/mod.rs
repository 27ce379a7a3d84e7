#![allow(dead_code)]

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use devsim_core::ospf::{
    InterfaceSettings, OspfEngine, OspfVersion, PacketDst, VirtualClock,
};
use devsim_core::{Device, DeviceConfig};

pub fn boot_device() -> Device {
    Device::boot(DeviceConfig::default()).expect("device boots")
}

/// Two engines on one broadcast segment, wired back to back, sharing one
/// virtual clock.
pub struct BroadcastPair {
    pub clock: Arc<VirtualClock>,
    pub a: Arc<OspfEngine>,
    pub b: Arc<OspfEngine>,
}

pub const A_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
pub const B_ADDR: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);

impl BroadcastPair {
    pub fn new() -> Self {
        Self::with_dead_intervals(40, 40)
    }

    /// Mismatched dead intervals must keep the neighbor tables empty.
    pub fn with_dead_intervals(a_dead: u16, b_dead: u16) -> Self {
        let clock = Arc::new(VirtualClock::new());
        let a = Arc::new(OspfEngine::new(
            OspfVersion::V2,
            Ipv4Addr::new(1, 1, 1, 1),
            clock.clone(),
        ));
        let b = Arc::new(OspfEngine::new(
            OspfVersion::V2,
            Ipv4Addr::new(2, 2, 2, 2),
            clock.clone(),
        ));

        let mut settings = InterfaceSettings::new("eth0", IpAddr::V4(A_ADDR), 24, Ipv4Addr::UNSPECIFIED);
        settings.dead_interval = a_dead;
        a.add_interface(settings).unwrap();
        let mut settings = InterfaceSettings::new("eth0", IpAddr::V4(B_ADDR), 24, Ipv4Addr::UNSPECIFIED);
        settings.dead_interval = b_dead;
        b.add_interface(settings).unwrap();

        wire(&a, &b, IpAddr::V4(A_ADDR), IpAddr::V4(B_ADDR));
        wire(&b, &a, IpAddr::V4(B_ADDR), IpAddr::V4(A_ADDR));

        a.activate_interface("eth0").unwrap();
        b.activate_interface("eth0").unwrap();

        BroadcastPair { clock, a, b }
    }

    /// Advances both engines one second at a time.
    pub fn advance_secs(&self, secs: u64) {
        for _ in 0..secs {
            self.clock.advance(1000);
            self.a.tick();
            self.b.tick();
        }
    }
}

/// Routes every packet `from` sends to `to`, honouring unicast
/// destinations.
pub fn wire(from: &Arc<OspfEngine>, to: &Arc<OspfEngine>, from_addr: IpAddr, to_addr: IpAddr) {
    let peer = Arc::clone(to);
    from.set_send_callback(move |_iface, dst, packet| {
        if let PacketDst::Unicast(addr) = dst {
            if addr != to_addr {
                return;
            }
        }
        peer.process_packet("eth0", from_addr, packet);
    });
}
