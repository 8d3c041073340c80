//! UDP transport for the Kademlia wire protocol.
//!
//! Reference: §6 (External Interfaces, UDP wire format).

use std::net::UdpSocket as StdUdpSocket;
use std::sync::Arc;

use crate::domain::identity::{IpAddr, Node, NodeId, SocketAddr, Timestamp, NODE_ID_LEN};
use crate::ports::{NetworkError, NetworkSocket};

/// No-op socket for unit tests that exercise domain logic without a real
/// network.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpNetworkSocket;

impl NetworkSocket for NoOpNetworkSocket {
    fn send_ping(&self, _target: SocketAddr, _local_id: NodeId) -> Result<(), NetworkError> {
        Ok(())
    }
    fn send_pong(&self, _target: SocketAddr, _local_id: NodeId) -> Result<(), NetworkError> {
        Ok(())
    }
    fn send_find_node(&self, _target: SocketAddr, _search_id: NodeId) -> Result<(), NetworkError> {
        Ok(())
    }
    fn send_neighbors(&self, _target: SocketAddr, _nodes: &[Node]) -> Result<(), NetworkError> {
        Ok(())
    }
}

/// Wire message discriminators. `Bootstrap` from the upstream protocol is
/// out of scope here; only the four Kademlia messages remain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Ping = 0x01,
    Pong = 0x02,
    FindNode = 0x03,
    Neighbors = 0x04,
}

impl MessageType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::Ping),
            0x02 => Some(Self::Pong),
            0x03 => Some(Self::FindNode),
            0x04 => Some(Self::Neighbors),
            _ => None,
        }
    }
}

fn encode_node(out: &mut Vec<u8>, node: &Node) {
    let id_bytes = node.id.map(|i| *i.as_bytes()).unwrap_or([0u8; NODE_ID_LEN]);
    out.extend_from_slice(&id_bytes);
    match (node.ipv4, node.ipv6) {
        (Some(v4), _) => {
            out.push(4);
            out.extend_from_slice(&v4);
        }
        (None, Some(v6)) => {
            out.push(6);
            out.extend_from_slice(&v6);
        }
        (None, None) => out.push(0),
    }
    out.extend_from_slice(&node.port.to_be_bytes());
    out.extend_from_slice(&node.network_id.to_be_bytes());
}

fn decode_node(buf: &[u8]) -> Option<(Node, usize)> {
    if buf.len() < NODE_ID_LEN + 1 {
        return None;
    }
    let mut id_arr = [0u8; NODE_ID_LEN];
    id_arr.copy_from_slice(&buf[..NODE_ID_LEN]);
    let id = NodeId::new(id_arr);
    let mut pos = NODE_ID_LEN;
    let ip_tag = buf[pos];
    pos += 1;
    let ip = match ip_tag {
        4 => {
            if buf.len() < pos + 4 {
                return None;
            }
            let mut b = [0u8; 4];
            b.copy_from_slice(&buf[pos..pos + 4]);
            pos += 4;
            IpAddr::V4(b)
        }
        6 => {
            if buf.len() < pos + 16 {
                return None;
            }
            let mut b = [0u8; 16];
            b.copy_from_slice(&buf[pos..pos + 16]);
            pos += 16;
            IpAddr::V6(b)
        }
        _ => return None,
    };
    if buf.len() < pos + 10 {
        return None;
    }
    let port = u16::from_be_bytes([buf[pos], buf[pos + 1]]);
    pos += 2;
    let network_id = u64::from_be_bytes(buf[pos..pos + 8].try_into().ok()?);
    pos += 8;
    Some((Node::new(id, ip, port, network_id, Timestamp::new(0)), pos))
}

pub fn decode_neighbors(buf: &[u8]) -> Vec<Node> {
    let mut nodes = Vec::new();
    let mut pos = 0;
    while pos < buf.len() {
        match decode_node(&buf[pos..]) {
            Some((node, consumed)) => {
                nodes.push(node);
                pos += consumed;
            }
            None => break,
        }
    }
    nodes
}

/// UDP-based network socket for the Kademlia wire protocol.
///
/// Wraps a non-blocking `std::net::UdpSocket`; the service layer polls
/// it from a dedicated tokio blocking task (see `service::kademlia`).
pub struct UdpNetworkSocket {
    socket: Arc<StdUdpSocket>,
}

impl UdpNetworkSocket {
    pub fn bind(bind_addr: &str) -> std::io::Result<Self> {
        let socket = StdUdpSocket::bind(bind_addr)?;
        socket.set_nonblocking(true)?;
        Ok(Self { socket: Arc::new(socket) })
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.socket.local_addr()
    }

    pub fn raw(&self) -> &StdUdpSocket {
        &self.socket
    }

    fn send_to(&self, data: &[u8], target: SocketAddr) -> Result<(), NetworkError> {
        let std_addr: std::net::SocketAddr = target.into();
        match self.socket.send_to(data, std_addr) {
            Ok(_) => Ok(()),
            Err(e) => match e.kind() {
                std::io::ErrorKind::WouldBlock => Err(NetworkError::Timeout),
                std::io::ErrorKind::ConnectionRefused => Err(NetworkError::ConnectionRefused),
                std::io::ErrorKind::InvalidInput => Err(NetworkError::InvalidAddress),
                _ => Err(NetworkError::Timeout),
            },
        }
    }
}

impl Clone for UdpNetworkSocket {
    fn clone(&self) -> Self {
        Self { socket: Arc::clone(&self.socket) }
    }
}

impl NetworkSocket for UdpNetworkSocket {
    fn send_ping(&self, target: SocketAddr, local_id: NodeId) -> Result<(), NetworkError> {
        let mut msg = Vec::with_capacity(1 + NODE_ID_LEN);
        msg.push(MessageType::Ping as u8);
        msg.extend_from_slice(local_id.as_bytes());
        self.send_to(&msg, target)
    }

    fn send_pong(&self, target: SocketAddr, local_id: NodeId) -> Result<(), NetworkError> {
        let mut msg = Vec::with_capacity(1 + NODE_ID_LEN);
        msg.push(MessageType::Pong as u8);
        msg.extend_from_slice(local_id.as_bytes());
        self.send_to(&msg, target)
    }

    fn send_find_node(&self, target: SocketAddr, search_id: NodeId) -> Result<(), NetworkError> {
        let mut msg = Vec::with_capacity(1 + NODE_ID_LEN);
        msg.push(MessageType::FindNode as u8);
        msg.extend_from_slice(search_id.as_bytes());
        self.send_to(&msg, target)
    }

    fn send_neighbors(&self, target: SocketAddr, nodes: &[Node]) -> Result<(), NetworkError> {
        if nodes.len() > 64 {
            return Err(NetworkError::MessageTooLarge);
        }
        let mut msg = vec![MessageType::Neighbors as u8];
        for node in nodes {
            encode_node(&mut msg, node);
        }
        self.send_to(&msg, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_round_trips_through_wire_encoding() {
        let node = Node::new(NodeId::new([3u8; NODE_ID_LEN]), IpAddr::v4(1, 2, 3, 4), 30303, 7, Timestamp::new(0));
        let mut buf = Vec::new();
        encode_node(&mut buf, &node);
        let (decoded, consumed) = decode_node(&buf).unwrap();
        assert_eq!(consumed, buf.len());
        assert_eq!(decoded.id, node.id);
        assert_eq!(decoded.ipv4, node.ipv4);
        assert_eq!(decoded.port, node.port);
        assert_eq!(decoded.network_id, node.network_id);
    }

    #[test]
    fn decode_neighbors_handles_multiple_nodes() {
        let a = Node::new(NodeId::new([1u8; NODE_ID_LEN]), IpAddr::v4(1, 1, 1, 1), 1, 1, Timestamp::new(0));
        let b = Node::new(NodeId::new([2u8; NODE_ID_LEN]), IpAddr::v4(2, 2, 2, 2), 2, 1, Timestamp::new(0));
        let mut buf = Vec::new();
        encode_node(&mut buf, &a);
        encode_node(&mut buf, &b);
        let nodes = decode_neighbors(&buf);
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn message_type_rejects_unknown_byte() {
        assert!(MessageType::from_byte(0xFF).is_none());
    }
}
