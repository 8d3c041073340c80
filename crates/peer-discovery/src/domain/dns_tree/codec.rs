//! Hashing and binary encodings used by the DNS tree: entry hashes and the
//! length-prefixed binary dump carried (base64-wrapped) in `nodes:` entries
//! and in the root entry's `{eRoot,lRoot,seq,signature}` record.
//!
//! Reference: §3 (DNS-Tree Sync data model), §6 (wire formats). §9
//! standardizes on the length-prefixed dump described in §6 rather than
//! either of the lineage's two historical textual encodings.

use data_encoding::{BASE32_NOPAD, BASE64};
use sha2::{Digest, Sha256};

use crate::domain::identity::{IpAddr, Node, NodeId, Timestamp};

use super::entry::HASH_LEN;

pub fn base32_decode(s: &str) -> Option<Vec<u8>> {
    BASE32_NOPAD.decode(s.to_uppercase().as_bytes()).ok()
}

pub fn base32_encode(bytes: &[u8]) -> String {
    BASE32_NOPAD.encode(bytes).to_lowercase()
}

pub fn base64_decode(s: &str) -> Option<Vec<u8>> {
    BASE64.decode(s.as_bytes()).ok()
}

pub fn base64_encode(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Hash of a non-root entry: the first `HASH_LEN` characters of the
/// base32 encoding of SHA-256(entry-text).
pub fn entry_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let encoded = base32_encode(&digest);
    encoded.chars().take(HASH_LEN).collect()
}

fn write_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn write_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn write_string(out: &mut Vec<u8>, s: &str) {
    write_u32(out, s.len() as u32);
    out.extend_from_slice(s.as_bytes());
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn read_u32(&mut self) -> Option<u32> {
        let slice = self.bytes.get(self.pos..self.pos + 4)?;
        self.pos += 4;
        Some(u32::from_be_bytes(slice.try_into().ok()?))
    }

    fn read_u64(&mut self) -> Option<u64> {
        let slice = self.bytes.get(self.pos..self.pos + 8)?;
        self.pos += 8;
        Some(u64::from_be_bytes(slice.try_into().ok()?))
    }

    fn read_u8(&mut self) -> Option<u8> {
        let b = *self.bytes.get(self.pos)?;
        self.pos += 1;
        Some(b)
    }

    fn read_bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        let slice = self.bytes.get(self.pos..self.pos + len)?;
        self.pos += len;
        Some(slice)
    }

    fn read_string(&mut self) -> Option<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).ok()
    }
}

fn format_ipv4(bytes: [u8; 4]) -> String {
    std::net::Ipv4Addr::from(bytes).to_string()
}

fn format_ipv6(bytes: [u8; 16]) -> String {
    std::net::Ipv6Addr::from(bytes).to_string()
}

fn parse_ipv4(s: &str) -> Option<[u8; 4]> {
    Some(s.parse::<std::net::Ipv4Addr>().ok()?.octets())
}

fn parse_ipv6(s: &str) -> Option<[u8; 16]> {
    Some(s.parse::<std::net::Ipv6Addr>().ok()?.octets())
}

/// Encode a list of nodes as the §6 dump: `u32 count`, then per entry
/// `bool hasId; [id]; string ipv4; string ipv6; u32 port`, base64-wrapped.
pub fn encode_node_list(nodes: &[Node]) -> String {
    let mut out = Vec::new();
    write_u32(&mut out, nodes.len() as u32);
    for n in nodes {
        match n.id {
            Some(id) => {
                out.push(1);
                out.extend_from_slice(id.as_bytes());
            }
            None => out.push(0),
        }
        write_string(&mut out, &n.ipv4.map(format_ipv4).unwrap_or_default());
        write_string(&mut out, &n.ipv6.map(format_ipv6).unwrap_or_default());
        write_u32(&mut out, n.port as u32);
    }
    base64_encode(&out)
}

pub fn decode_node_list(text: &str) -> Option<Vec<Node>> {
    let bytes = base64_decode(text)?;
    let mut reader = Reader::new(&bytes);
    let count = reader.read_u32()?;
    let mut nodes = Vec::with_capacity(count as usize);
    for _ in 0..count {
        nodes.push(decode_node_record(&mut reader)?);
    }
    Some(nodes)
}

fn decode_node_record(reader: &mut Reader<'_>) -> Option<Node> {
    let has_id = reader.read_u8()?;
    let id = if has_id != 0 {
        let bytes = reader.read_bytes(crate::domain::identity::NODE_ID_LEN)?;
        let mut arr = [0u8; crate::domain::identity::NODE_ID_LEN];
        arr.copy_from_slice(bytes);
        Some(NodeId::new(arr))
    } else {
        None
    };
    let ipv4_text = reader.read_string()?;
    let ipv6_text = reader.read_string()?;
    let ipv4 = if ipv4_text.is_empty() { None } else { Some(parse_ipv4(&ipv4_text)?) };
    let ipv6 = if ipv6_text.is_empty() { None } else { Some(parse_ipv6(&ipv6_text)?) };
    let port = reader.read_u32()? as u16;

    Some(Node {
        id,
        ipv4,
        ipv6,
        port,
        bind_port: port,
        network_id: 0,
        network_version: 1,
        update_time: Timestamp::new(0),
    })
}

/// Serialize the portion of the root record covered by the signature:
/// `string eRoot; string lRoot; u64 seq`. The full record (see
/// [`encode_root_record`]) appends a length-prefixed signature after this.
pub fn encode_root_signing_payload(e_root: &str, l_root: &str, seq: u64) -> Vec<u8> {
    let mut out = Vec::new();
    write_string(&mut out, e_root);
    write_string(&mut out, l_root);
    write_u64(&mut out, seq);
    out
}

/// Full `{eRoot,lRoot,seq,signature}` record, base64-wrapped, per §6.
pub fn encode_root_record(e_root: &str, l_root: &str, seq: u64, signature: &[u8; 65]) -> String {
    let mut out = encode_root_signing_payload(e_root, l_root, seq);
    write_string(&mut out, &base64_encode(signature));
    base64_encode(&out)
}

pub struct DecodedRoot {
    pub e_root: String,
    pub l_root: String,
    pub seq: u64,
    pub signature_b64: String,
}

pub fn decode_root_record(text: &str) -> Option<DecodedRoot> {
    let bytes = base64_decode(text)?;
    let mut reader = Reader::new(&bytes);
    let e_root = reader.read_string()?;
    let l_root = reader.read_string()?;
    let seq = reader.read_u64()?;
    let signature_b64 = reader.read_string()?;
    Some(DecodedRoot { e_root, l_root, seq, signature_b64 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::identity::NODE_ID_LEN;

    #[test]
    fn entry_hash_is_stable_and_truncated() {
        let h1 = entry_hash("tree-branch:a,b");
        let h2 = entry_hash("tree-branch:a,b");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), HASH_LEN);
    }

    #[test]
    fn different_text_yields_different_hash() {
        assert_ne!(entry_hash("a"), entry_hash("b"));
    }

    #[test]
    fn node_list_round_trips() {
        let node = Node::new(NodeId::new([7u8; NODE_ID_LEN]), IpAddr::v4(1, 2, 3, 4), 30303, 9, Timestamp::new(0));
        let encoded = encode_node_list(&[node.clone()]);
        let decoded = decode_node_list(&encoded).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].id, node.id);
        assert_eq!(decoded[0].ipv4, node.ipv4);
        assert_eq!(decoded[0].port, node.port);
    }

    #[test]
    fn node_without_id_round_trips() {
        let node = Node {
            id: None,
            ipv4: None,
            ipv6: Some([0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]),
            port: 9000,
            bind_port: 9000,
            network_id: 0,
            network_version: 1,
            update_time: Timestamp::new(0),
        };
        let encoded = encode_node_list(&[node.clone()]);
        let decoded = decode_node_list(&encoded).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].id, None);
        assert_eq!(decoded[0].ipv4, None);
        assert_eq!(decoded[0].ipv6, node.ipv6);
    }

    #[test]
    fn empty_node_list_round_trips() {
        let encoded = encode_node_list(&[]);
        assert_eq!(decode_node_list(&encoded).unwrap(), Vec::new());
    }

    #[test]
    fn root_record_round_trips() {
        let sig = [3u8; 65];
        let encoded = encode_root_record("e".repeat(HASH_LEN).as_str(), "l".repeat(HASH_LEN).as_str(), 7, &sig);
        let decoded = decode_root_record(&encoded).unwrap();
        assert_eq!(decoded.e_root, "e".repeat(HASH_LEN));
        assert_eq!(decoded.l_root, "l".repeat(HASH_LEN));
        assert_eq!(decoded.seq, 7);
        assert_eq!(base64_decode(&decoded.signature_b64).unwrap(), sig.to_vec());
    }
}
