//! Neighbor records and the adjacency state machine (RFC 2328 §10.1).

use std::net::IpAddr;

use num_derive::FromPrimitive;

use super::lsa::{LsaHeader, LsaKey};
use super::packet::DdFlags;
use super::RouterId;

/// Adjacency states, ordered: comparisons like `state >= TwoWay` follow
/// the RFC's progression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, FromPrimitive)]
pub enum NeighborState {
    Down = 0,
    Attempt = 1,
    Init = 2,
    TwoWay = 3,
    ExStart = 4,
    Exchange = 5,
    Loading = 6,
    Full = 7,
}

/// Events dispatched at a neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborEvent {
    HelloReceived,
    TwoWayReceived,
    NegotiationDone,
    ExchangeDone,
    LoadingDone,
    AdjOk,
    SeqNumberMismatch,
    BadLsReq,
    OneWay,
    KillNbr,
    InactivityTimer,
    LlDown,
}

/// Computes the successor state for `event` in `state`. Identity
/// transitions return the input state. `adjacency_required` feeds the
/// TwoWayReceived and AdjOK decisions; `request_list_empty` decides
/// whether ExchangeDone lands in Loading or Full.
pub fn transition(
    state: NeighborState,
    event: NeighborEvent,
    adjacency_required: bool,
    request_list_empty: bool,
) -> NeighborState {
    use NeighborEvent::*;
    use NeighborState::*;

    match event {
        HelloReceived => {
            if state <= Attempt {
                Init
            } else {
                state
            }
        }
        TwoWayReceived => {
            if state == Init {
                if adjacency_required {
                    ExStart
                } else {
                    TwoWay
                }
            } else {
                state
            }
        }
        NegotiationDone => {
            if state == ExStart {
                Exchange
            } else {
                state
            }
        }
        ExchangeDone => {
            if state == Exchange {
                if request_list_empty {
                    Full
                } else {
                    Loading
                }
            } else {
                state
            }
        }
        LoadingDone => {
            if state == Loading {
                Full
            } else {
                state
            }
        }
        AdjOk => match state {
            TwoWay if adjacency_required => ExStart,
            Exchange | Loading | Full if !adjacency_required => TwoWay,
            other => other,
        },
        SeqNumberMismatch | BadLsReq => {
            if state >= Exchange {
                ExStart
            } else {
                state
            }
        }
        OneWay => {
            if state >= TwoWay {
                Init
            } else {
                state
            }
        }
        KillNbr | InactivityTimer | LlDown => Down,
    }
}

/// One neighbor on one interface.
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub router_id: RouterId,
    /// The peer's interface address on the shared segment.
    pub address: IpAddr,
    pub state: NeighborState,
    pub priority: u8,
    /// DR/BDR the peer declared in its last hello, by interface address.
    pub declared_dr: Option<IpAddr>,
    pub declared_bdr: Option<IpAddr>,
    /// DD sequence number currently in use for the exchange.
    pub dd_sequence: u32,
    /// True when the local router is master for the DD exchange.
    pub local_is_master: bool,
    /// Last DD flags received, for duplicate detection during Exchange.
    pub last_dd_flags: DdFlags,
    /// Headers still to be sent in DD packets.
    pub summary_list: Vec<LsaHeader>,
    /// LSAs the peer has that are newer than ours; drained during Loading.
    pub request_list: Vec<LsaKey>,
    /// LSAs flooded to the peer and not yet acknowledged.
    pub retransmission_list: Vec<LsaKey>,
    /// Clock reading of the most recent hello.
    pub last_hello_ms: u64,
}

impl Neighbor {
    pub fn new(router_id: RouterId, address: IpAddr, now_ms: u64) -> Self {
        Neighbor {
            router_id,
            address,
            state: NeighborState::Down,
            priority: 0,
            declared_dr: None,
            declared_bdr: None,
            dd_sequence: 0,
            local_is_master: false,
            last_dd_flags: DdFlags::default(),
            summary_list: Vec::new(),
            request_list: Vec::new(),
            retransmission_list: Vec::new(),
            last_hello_ms: now_ms,
        }
    }

    /// Empties the exchange bookkeeping, as required when an adjacency is
    /// torn back to ExStart, TwoWay or Init.
    pub fn clear_lists(&mut self) {
        self.summary_list.clear();
        self.request_list.clear();
        self.retransmission_list.clear();
    }

    /// Whether the peer declared itself DR or BDR in its last hello.
    pub fn declares_dr(&self) -> bool {
        self.declared_dr == Some(self.address)
    }

    pub fn declares_bdr(&self) -> bool {
        self.declared_bdr == Some(self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::NeighborEvent::*;
    use super::NeighborState::*;
    use super::*;

    #[test]
    fn hello_brings_down_neighbor_to_init() {
        assert_eq!(transition(Down, HelloReceived, false, true), Init);
        assert_eq!(transition(Attempt, HelloReceived, false, true), Init);
        assert_eq!(transition(Full, HelloReceived, true, true), Full);
    }

    #[test]
    fn two_way_branches_on_adjacency_requirement() {
        assert_eq!(transition(Init, TwoWayReceived, true, true), ExStart);
        assert_eq!(transition(Init, TwoWayReceived, false, true), TwoWay);
    }

    #[test]
    fn exchange_done_branches_on_request_list() {
        assert_eq!(transition(Exchange, ExchangeDone, true, true), Full);
        assert_eq!(transition(Exchange, ExchangeDone, true, false), Loading);
        assert_eq!(transition(Loading, LoadingDone, true, true), Full);
    }

    #[test]
    fn adj_ok_promotes_and_demotes() {
        assert_eq!(transition(TwoWay, AdjOk, true, true), ExStart);
        assert_eq!(transition(TwoWay, AdjOk, false, true), TwoWay);
        assert_eq!(transition(Full, AdjOk, false, true), TwoWay);
        assert_eq!(transition(Exchange, AdjOk, true, true), Exchange);
    }

    #[test]
    fn mismatch_restarts_exchange() {
        assert_eq!(transition(Full, SeqNumberMismatch, true, true), ExStart);
        assert_eq!(transition(Loading, BadLsReq, true, true), ExStart);
        assert_eq!(transition(TwoWay, SeqNumberMismatch, true, true), TwoWay);
    }

    #[test]
    fn one_way_falls_back_to_init() {
        assert_eq!(transition(Full, OneWay, true, true), Init);
        assert_eq!(transition(TwoWay, OneWay, false, true), Init);
        assert_eq!(transition(Init, OneWay, false, true), Init);
    }

    #[test]
    fn kill_events_reach_down_from_anywhere() {
        for state in [Init, TwoWay, ExStart, Exchange, Loading, Full] {
            assert_eq!(transition(state, KillNbr, true, true), Down);
            assert_eq!(transition(state, InactivityTimer, true, true), Down);
            assert_eq!(transition(state, LlDown, true, true), Down);
        }
    }
}
