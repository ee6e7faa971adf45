//! A minimal membership-query service, standing in for the real `CLM`
//! service the reference daemon hosts (Non-goal: no real CLM body — this
//! exists purely to exercise the registry/dispatch contract end to end).

use std::net::IpAddr;

use exec_ipc::{Connection, DispatchOutcome};
use exec_services::{ServiceHandler, ack};
use exec_transport::{ConfigurationChange, RequestHeader};

/// Request opcodes this demo service answers.
pub const OP_GET_MEMBERS: u32 = 0;

pub struct MembershipService {
    members: Vec<IpAddr>,
}

impl MembershipService {
    pub fn new() -> Self {
        Self { members: Vec::new() }
    }
}

impl Default for MembershipService {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceHandler for MembershipService {
    fn name(&self) -> &'static str {
        "membership"
    }

    fn lib_init(&mut self, conn: &mut Connection, header: RequestHeader, _body: &[u8]) -> DispatchOutcome {
        ack(conn, header)
    }

    fn lib_dispatch(&mut self, conn: &mut Connection, header: RequestHeader, body: &[u8]) -> DispatchOutcome {
        match header.id {
            OP_GET_MEMBERS => {
                let body = self.members.iter().flat_map(|ip| ip.to_string().into_bytes()).collect::<Vec<_>>();
                if conn.outq_is_full() {
                    return DispatchOutcome::Disconnect;
                }
                let framed = exec_transport::ResponseHeader::framed(
                    (exec_transport::RESPONSE_HEADER_SIZE + body.len()) as u32,
                    header.id,
                    exec_transport::ERR_OK,
                    &body,
                );
                conn.enqueue(framed);
                DispatchOutcome::Ok
            }
            _ => {
                let _ = body;
                DispatchOutcome::Disconnect
            }
        }
    }

    fn flow_controlled(&self, opcode: u32) -> bool {
        // Membership queries are read-only and always answerable, even
        // mid-sync.
        opcode != OP_GET_MEMBERS
    }

    fn confchg(&mut self, change: &ConfigurationChange) {
        self.members = change.member_list.clone();
    }
}

#[cfg(test)]
mod tests {
    use std::{net::Ipv4Addr, os::unix::net::UnixStream};

    use exec_transport::{ConfigurationType, RingId};

    use super::*;

    #[test]
    fn confchg_updates_the_membership_snapshot() {
        let mut service = MembershipService::new();
        service.confchg(&ConfigurationChange {
            configuration_type: ConfigurationType::Regular,
            member_list: vec![IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))],
            left_list: vec![],
            joined_list: vec![IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))],
            ring_id: RingId { rep: IpAddr::V4(Ipv4Addr::LOCALHOST), seq: 1 },
        });
        assert_eq!(service.members, vec![IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))]);
    }

    #[test]
    fn get_members_responds_even_while_flow_controlled_ops_are_gated() {
        let mut service = MembershipService::new();
        assert!(!service.flow_controlled(OP_GET_MEMBERS));
        assert!(service.flow_controlled(OP_GET_MEMBERS + 1));

        let (_a, b) = UnixStream::pair().unwrap();
        let mut conn = Connection::new(b, None).unwrap();
        let outcome = service.lib_dispatch(&mut conn, RequestHeader { size: 8, id: OP_GET_MEMBERS }, &[]);
        assert_eq!(outcome, DispatchOutcome::Ok);
    }
}
