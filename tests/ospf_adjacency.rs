//! Two-router OSPF scenarios over a shared broadcast segment, driven
//! deterministically by a virtual clock.

mod common;

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use devsim_core::ospf::interface::InterfaceState;
use devsim_core::ospf::neighbor::NeighborState;
use devsim_core::ospf::transport::{PacketTransport, Segment};
use devsim_core::ospf::{
    InterfaceSettings, NetworkType, OspfEngine, OspfVersion, VirtualClock,
};

use common::{wire, BroadcastPair, A_ADDR, B_ADDR};

#[test]
fn higher_router_id_becomes_dr_and_both_reach_full() {
    let pair = BroadcastPair::new();
    // Hellos flow immediately; the wait timer (one dead interval) ends
    // the Waiting state, and one more hello round settles DR and BDR.
    pair.advance_secs(60);

    let a_iface = pair.a.interface_snapshot("eth0").unwrap();
    let b_iface = pair.b.interface_snapshot("eth0").unwrap();
    assert_eq!(b_iface.state, InterfaceState::Dr, "higher router id takes DR");
    assert_eq!(a_iface.state, InterfaceState::Backup);
    assert_eq!(a_iface.dr, Some(IpAddr::V4(B_ADDR)));
    assert_eq!(b_iface.bdr, Some(IpAddr::V4(A_ADDR)));

    let a_nbr = a_iface.neighbors.get(&Ipv4Addr::new(2, 2, 2, 2)).expect("a sees b");
    let b_nbr = b_iface.neighbors.get(&Ipv4Addr::new(1, 1, 1, 1)).expect("b sees a");
    assert_eq!(a_nbr.state, NeighborState::Full);
    assert_eq!(b_nbr.state, NeighborState::Full);
}

#[test]
fn spf_installs_route_to_shared_segment_at_interface_cost() {
    let pair = BroadcastPair::new();
    pair.advance_secs(60);

    for engine in [&pair.a, &pair.b] {
        let routes = engine.run_spf_blocking();
        let segment = routes
            .iter()
            .find(|r| r.prefix == IpAddr::V4(Ipv4Addr::new(10, 0, 0, 0)) && r.prefix_len == 24)
            .unwrap_or_else(|| panic!("{} lacks segment route: {routes:?}", engine.router_id()));
        assert_eq!(segment.cost, 10, "cost equals the interface cost");
        assert_eq!(segment.interface, "eth0");
    }
}

#[test]
fn mismatched_dead_interval_forms_no_neighbors() {
    let pair = BroadcastPair::with_dead_intervals(40, 120);
    pair.advance_secs(90);
    assert_eq!(pair.a.neighbor_count(), 0);
    assert_eq!(pair.b.neighbor_count(), 0);
}

#[test]
fn silent_peer_is_dropped_within_one_dead_interval() {
    let pair = BroadcastPair::new();
    pair.advance_secs(60);
    assert_eq!(pair.a.neighbor_count(), 1);

    // B goes quiet: its interface drops without a goodbye.
    pair.b.deactivate_interface("eth0").unwrap();
    pair.advance_secs(41);
    assert_eq!(pair.a.neighbor_count(), 0, "dead timer reaps the neighbor");
}

#[test]
fn database_converges_to_identical_lsa_sets() {
    let pair = BroadcastPair::new();
    pair.advance_secs(60);

    let area = Ipv4Addr::UNSPECIFIED;
    let a_keys: Vec<_> =
        pair.a.database_snapshot(area).iter().map(|l| l.header.key()).collect();
    let b_keys: Vec<_> =
        pair.b.database_snapshot(area).iter().map(|l| l.header.key()).collect();
    assert_eq!(a_keys, b_keys, "databases must hold the same LSAs");
    // Both router LSAs plus the DR's network LSA.
    assert!(a_keys.len() >= 3, "expected router and network LSAs: {a_keys:?}");
}

#[test]
fn external_route_floods_and_lands_in_peer_table() {
    let pair = BroadcastPair::new();
    pair.advance_secs(60);

    pair.b.originate_external(Ipv4Addr::new(203, 0, 113, 0), 24, 20);
    pair.advance_secs(2);

    let routes = pair.a.run_spf_blocking();
    let external = routes
        .iter()
        .find(|r| r.prefix == IpAddr::V4(Ipv4Addr::new(203, 0, 113, 0)))
        .unwrap_or_else(|| panic!("external route missing: {routes:?}"));
    assert_eq!(external.cost, 30, "interface cost plus external metric");
    assert_eq!(external.next_hop, Some(IpAddr::V4(B_ADDR)));
}

#[test]
fn point_to_point_pair_reaches_full_without_election() {
    let clock = Arc::new(VirtualClock::new());
    let a = Arc::new(OspfEngine::new(OspfVersion::V2, Ipv4Addr::new(1, 1, 1, 1), clock.clone()));
    let b = Arc::new(OspfEngine::new(OspfVersion::V2, Ipv4Addr::new(2, 2, 2, 2), clock.clone()));

    for (engine, addr) in [(&a, A_ADDR), (&b, B_ADDR)] {
        let mut settings =
            InterfaceSettings::new("ptp0", IpAddr::V4(addr), 30, Ipv4Addr::UNSPECIFIED);
        settings.network_type = NetworkType::PointToPoint;
        engine.add_interface(settings).unwrap();
    }
    wire(&a, &b, IpAddr::V4(A_ADDR), IpAddr::V4(B_ADDR));
    wire(&b, &a, IpAddr::V4(B_ADDR), IpAddr::V4(A_ADDR));
    a.activate_interface("ptp0").unwrap();
    b.activate_interface("ptp0").unwrap();

    for _ in 0..30 {
        clock.advance(1000);
        a.tick();
        b.tick();
    }

    let a_iface = a.interface_snapshot("ptp0").unwrap();
    assert_eq!(a_iface.state, InterfaceState::PointToPoint);
    assert_eq!(
        a_iface.neighbors.get(&Ipv4Addr::new(2, 2, 2, 2)).unwrap().state,
        NeighborState::Full
    );

    let routes = a.run_spf_blocking();
    assert!(
        routes.iter().any(|r| r.prefix == IpAddr::V4(Ipv4Addr::new(10, 0, 0, 0))),
        "p2p stub subnet routed: {routes:?}"
    );
}

#[tokio::test]
async fn segment_transport_carries_hellos_between_engines() {
    let clock = Arc::new(VirtualClock::new());
    let a = Arc::new(OspfEngine::new(OspfVersion::V2, Ipv4Addr::new(1, 1, 1, 1), clock.clone()));
    let b = Arc::new(OspfEngine::new(OspfVersion::V2, Ipv4Addr::new(2, 2, 2, 2), clock.clone()));
    for (engine, addr) in [(&a, A_ADDR), (&b, B_ADDR)] {
        engine
            .add_interface(InterfaceSettings::new(
                "eth0",
                IpAddr::V4(addr),
                24,
                Ipv4Addr::UNSPECIFIED,
            ))
            .unwrap();
        engine.activate_interface("eth0").unwrap();
    }

    // No send callbacks: packets queue in each engine's outbox and are
    // pushed through the shared segment by hand.
    let segment = Segment::new();
    segment.attach(a.clone(), "eth0", IpAddr::V4(A_ADDR));
    segment.attach(b.clone(), "eth0", IpAddr::V4(B_ADDR));
    let a_port = segment.port(IpAddr::V4(A_ADDR));
    let b_port = segment.port(IpAddr::V4(B_ADDR));

    for _ in 0..15 {
        clock.advance(1000);
        a.tick();
        for (iface, dst, packet) in a.drain_outbox() {
            a_port.forward(&iface, dst, packet).await;
        }
        b.tick();
        for (iface, dst, packet) in b.drain_outbox() {
            b_port.forward(&iface, dst, packet).await;
        }
    }

    assert_eq!(a.neighbor_count(), 1);
    assert_eq!(b.neighbor_count(), 1);
}

#[test]
fn ospfv3_point_to_point_adjacency_and_v6_route() {
    let clock = Arc::new(VirtualClock::new());
    let a = Arc::new(OspfEngine::new(OspfVersion::V3, Ipv4Addr::new(1, 1, 1, 1), clock.clone()));
    let b = Arc::new(OspfEngine::new(OspfVersion::V3, Ipv4Addr::new(2, 2, 2, 2), clock.clone()));

    let a_addr: IpAddr = "2001:db8:1::1".parse().unwrap();
    let b_addr: IpAddr = "2001:db8:1::2".parse().unwrap();
    for (engine, addr) in [(&a, a_addr), (&b, b_addr)] {
        let mut settings = InterfaceSettings::new("ptp0", addr, 64, Ipv4Addr::UNSPECIFIED);
        settings.network_type = NetworkType::PointToPoint;
        engine.add_interface(settings).unwrap();
    }
    wire(&a, &b, a_addr, b_addr);
    wire(&b, &a, b_addr, a_addr);
    a.activate_interface("ptp0").unwrap();
    b.activate_interface("ptp0").unwrap();

    for _ in 0..30 {
        clock.advance(1000);
        a.tick();
        b.tick();
    }

    let a_iface = a.interface_snapshot("ptp0").unwrap();
    assert_eq!(
        a_iface.neighbors.get(&Ipv4Addr::new(2, 2, 2, 2)).unwrap().state,
        NeighborState::Full
    );

    let routes = a.run_spf_blocking();
    let v6_prefix: IpAddr = "2001:db8:1::".parse().unwrap();
    assert!(
        routes.iter().any(|r| r.prefix == v6_prefix && r.prefix_len == 64),
        "v6 prefix routed via intra-area-prefix lsa: {routes:?}"
    );
}
