//! The group-messaging transport boundary (spec §1 "out of scope": TOTEMPG).
//!
//! The executive only needs three things from the transport: an admission
//! test (`send_ok`), a way to submit multicasts, and the two callbacks the
//! transport drives it with (wire delivery, configuration change). We model
//! the first two as a trait and the callbacks as plain closures the
//! bootstrap code owns — there is no real virtual-synchrony implementation
//! here, by design (§1 Non-goals).

use std::net::IpAddr;

/// A ring epoch (§3, GLOSSARY).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RingId {
    pub rep: IpAddr,
    pub seq: u64,
}

/// `Regular` configurations are stable memberships that the sync barrier
/// drives to completion; `Transitional` ones interrupt an in-progress sync
/// (§4.I).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigurationType {
    Regular,
    Transitional,
}

/// Membership delta passed through to every service's `confchg` hook and to
/// the sync orchestrator, unexamined otherwise (§3).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigurationChange {
    pub configuration_type: ConfigurationType,
    pub member_list: Vec<IpAddr>,
    pub left_list: Vec<IpAddr>,
    pub joined_list: Vec<IpAddr>,
    pub ring_id: RingId,
}

/// What the executive needs from the totem group-messaging layer.
pub trait GroupTransport {
    /// Admission test used by the flow-control gate (§4.E step 6): would a
    /// multicast of `size` additional bytes be accepted right now?
    fn send_ok(&self, size: usize) -> bool;

    /// Submit `payload` for totally-ordered, virtually synchronous
    /// multicast delivery within the current ring.
    fn multicast(&mut self, payload: &[u8]) -> std::io::Result<()>;
}

/// Single-node reference transport: multicasts are delivered back to the
/// caller-supplied sink synchronously, and admission is governed by a
/// configurable byte budget. Used by tests and by standalone (single-member
/// ring) operation; never virtually synchronous across real peers.
pub struct LoopbackTransport<D> {
    on_deliver: D,
    send_ok_budget: usize,
}

impl<D: FnMut(&[u8])> LoopbackTransport<D> {
    pub fn new(send_ok_budget: usize, on_deliver: D) -> Self {
        Self { on_deliver, send_ok_budget }
    }
}

impl<D: FnMut(&[u8])> GroupTransport for LoopbackTransport<D> {
    fn send_ok(&self, size: usize) -> bool {
        size <= self.send_ok_budget
    }

    fn multicast(&mut self, payload: &[u8]) -> std::io::Result<()> {
        (self.on_deliver)(payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_delivers_synchronously() {
        let mut received = Vec::new();
        {
            let mut transport = LoopbackTransport::new(1024, |msg: &[u8]| received.push(msg.to_vec()));
            transport.multicast(b"hello").unwrap();
        }
        assert_eq!(received, vec![b"hello".to_vec()]);
    }

    #[test]
    fn send_ok_respects_budget() {
        let transport = LoopbackTransport::new(100, |_: &[u8]| {});
        assert!(transport.send_ok(100));
        assert!(!transport.send_ok(101));
    }
}
