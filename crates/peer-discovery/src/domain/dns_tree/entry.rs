//! Parsed forms of the four DNS tree entry kinds.
//!
//! Reference: §3 (DNS-Tree Sync data model), §4.4 (root/entry resolution).

use crate::domain::errors::DnsTreeError;
use crate::domain::identity::Node;

/// Length (in base32 characters) of a non-root entry hash.
pub const HASH_LEN: usize = 26;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootEntry {
    pub e_root: String,
    pub l_root: String,
    pub seq: u64,
    pub signature: [u8; 65],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchEntry {
    pub children: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEntry {
    pub public_key: Vec<u8>,
    pub domain: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodesEntry {
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TreeEntry {
    Branch(BranchEntry),
    Link(LinkEntry),
    Nodes(NodesEntry),
}

impl TreeEntry {
    pub fn is_branch(&self) -> bool {
        matches!(self, TreeEntry::Branch(_))
    }

    pub fn is_link(&self) -> bool {
        matches!(self, TreeEntry::Link(_))
    }

    pub fn is_nodes(&self) -> bool {
        matches!(self, TreeEntry::Nodes(_))
    }
}

/// Parse a joined (multi-chunk-concatenated) TXT record body by its
/// `prefix:` discriminator.
pub fn parse_entry(text: &str) -> Result<TreeEntry, DnsTreeError> {
    if let Some(rest) = text.strip_prefix("tree-branch:") {
        let children = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split(',').map(str::to_string).collect()
        };
        return Ok(TreeEntry::Branch(BranchEntry { children }));
    }
    if let Some(rest) = text.strip_prefix("tree://") {
        let (pubkey_b32, domain) = rest.split_once('@').ok_or(DnsTreeError::InvalidChild)?;
        let public_key = crate::domain::dns_tree::codec::base32_decode(pubkey_b32)
            .ok_or(DnsTreeError::InvalidChild)?;
        return Ok(TreeEntry::Link(LinkEntry {
            public_key,
            domain: domain.to_string(),
        }));
    }
    if let Some(rest) = text.strip_prefix("nodes:") {
        let nodes = crate::domain::dns_tree::codec::decode_node_list(rest)
            .ok_or(DnsTreeError::InvalidChild)?;
        return Ok(TreeEntry::Nodes(NodesEntry { nodes }));
    }
    Err(DnsTreeError::InvalidChild)
}

/// Parse and validate the root entry's structural fields (signature
/// length, hash lengths). Signature verification is performed separately
/// by the service layer via a [`crate::ports::outbound::Verifier`], since
/// it requires a cryptographic dependency the domain layer does not carry.
///
/// Wire format (§6): `tree-root-v1:` followed by the base64 encoding of a
/// `{eRoot, lRoot, seq, signature}` record (see
/// [`crate::domain::dns_tree::codec::decode_root_record`]).
pub fn parse_root(text: &str) -> Result<RootEntry, DnsTreeError> {
    let body = text.strip_prefix("tree-root-v1:").ok_or(DnsTreeError::InvalidRoot)?;
    let decoded = crate::domain::dns_tree::codec::decode_root_record(body)
        .ok_or(DnsTreeError::InvalidRoot)?;
    if decoded.e_root.len() != HASH_LEN || decoded.l_root.len() != HASH_LEN {
        return Err(DnsTreeError::InvalidRoot);
    }
    let sig_bytes = crate::domain::dns_tree::codec::base64_decode(&decoded.signature_b64)
        .ok_or(DnsTreeError::InvalidRoot)?;
    if sig_bytes.len() != 65 {
        return Err(DnsTreeError::SignatureInvalid);
    }
    let mut signature = [0u8; 65];
    signature.copy_from_slice(&sig_bytes);
    Ok(RootEntry {
        e_root: decoded.e_root,
        l_root: decoded.l_root,
        seq: decoded.seq,
        signature,
    })
}

/// The exact bytes whose SHA-256 digest the root signature covers: the
/// `{eRoot, lRoot, seq}` prefix of the record, before the signature field.
pub fn root_signing_payload(e_root: &str, l_root: &str, seq: u64) -> Vec<u8> {
    crate::domain::dns_tree::codec::encode_root_signing_payload(e_root, l_root, seq)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_branch_with_children() {
        let entry = parse_entry("tree-branch:abc,def").unwrap();
        assert_eq!(entry, TreeEntry::Branch(BranchEntry { children: vec!["abc".into(), "def".into()] }));
    }

    #[test]
    fn parses_empty_branch() {
        let entry = parse_entry("tree-branch:").unwrap();
        assert_eq!(entry, TreeEntry::Branch(BranchEntry { children: vec![] }));
    }

    #[test]
    fn rejects_unknown_prefix() {
        assert_eq!(parse_entry("garbage").unwrap_err(), DnsTreeError::InvalidChild);
    }

    #[test]
    fn root_rejects_garbled_payload() {
        assert_eq!(parse_root("tree-root-v1:not-base64!!").unwrap_err(), DnsTreeError::InvalidRoot);
    }

    #[test]
    fn root_rejects_wrong_hash_length() {
        let record = crate::domain::dns_tree::codec::encode_root_record("short", "short", 1, &[0u8; 65]);
        let text = format!("tree-root-v1:{record}");
        assert_eq!(parse_root(&text).unwrap_err(), DnsTreeError::InvalidRoot);
    }

    #[test]
    fn root_round_trips_through_parse_root() {
        let e_root = "e".repeat(HASH_LEN);
        let l_root = "l".repeat(HASH_LEN);
        let signature = [9u8; 65];
        let record = crate::domain::dns_tree::codec::encode_root_record(&e_root, &l_root, 3, &signature);
        let text = format!("tree-root-v1:{record}");
        let parsed = parse_root(&text).unwrap();
        assert_eq!(parsed.e_root, e_root);
        assert_eq!(parsed.l_root, l_root);
        assert_eq!(parsed.seq, 3);
        assert_eq!(parsed.signature, signature);
    }
}
