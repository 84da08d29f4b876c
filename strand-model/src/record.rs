//! The record model.
//!
//! A record is one entry in a writer's hash-linked chain. Its node is a
//! fixed binary payload (version, flags, prev/event/header/body cids)
//! signed by the log key and sealed under the thread's service key with
//! a keyed MAC. The event, header, and body nodes travel alongside as
//! opaque blobs; decrypting them is the read-key holder's business, not
//! this core's.
//!
//! Node layout: `payload (130) || signature (64) || mac (32)`, with
//! `cid = blake3(node)` and the signature over `blake3(payload)`.

use crate::crypto::{self, MAC_LEN};
use crate::types::{Cid, Key, PubKey, Signature};

const VERSION: u8 = 1;
const FLAG_HAS_PREV: u8 = 0b0000_0001;

const PAYLOAD_LEN: usize = 2 + 4 * Cid::LEN;
const NODE_LEN: usize = PAYLOAD_LEN + Signature::LEN + MAC_LEN;

/// Record decode/verification error.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("malformed record node: {0}")]
    Malformed(&'static str),

    #[error("unsupported record version {0}")]
    UnsupportedVersion(u8),

    #[error("record seal does not match the service key")]
    BadSeal,

    #[error("{0} node does not match its cid")]
    NodeMismatch(&'static str),

    #[error(transparent)]
    Signature(#[from] crypto::CryptoError),
}

/// A record with its sealed node and attached content blobs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    cid: Cid,
    prev: Option<Cid>,
    event: Cid,
    header: Cid,
    body: Cid,
    sig: Signature,
    node: Vec<u8>,
    event_node: Vec<u8>,
    header_node: Vec<u8>,
    body_node: Vec<u8>,
}

impl Record {
    /// Build, sign, and seal a new record extending `prev`.
    pub fn create(
        signing_key: &ed25519_dalek::SigningKey,
        service_key: &Key,
        prev: Option<Cid>,
        event_node: Vec<u8>,
        header_node: Vec<u8>,
        body_node: Vec<u8>,
    ) -> Self {
        let event = crypto::content_hash(&event_node);
        let header = crypto::content_hash(&header_node);
        let body = crypto::content_hash(&body_node);

        let mut node = Vec::with_capacity(NODE_LEN);
        node.push(VERSION);
        node.push(if prev.is_some() { FLAG_HAS_PREV } else { 0 });
        node.extend_from_slice(prev.unwrap_or(Cid([0u8; 32])).as_bytes());
        node.extend_from_slice(event.as_bytes());
        node.extend_from_slice(header.as_bytes());
        node.extend_from_slice(body.as_bytes());

        let sig = crypto::sign_hash(signing_key, &crypto::content_hash(&node));
        node.extend_from_slice(&sig.0);
        let mac = crypto::keyed_mac(service_key, &node);
        node.extend_from_slice(&mac);

        Self {
            cid: crypto::content_hash(&node),
            prev,
            event,
            header,
            body,
            sig,
            node,
            event_node,
            header_node,
            body_node,
        }
    }

    /// Open a sealed record node received from the wire.
    ///
    /// Verifies the service-key MAC and the content addresses of the
    /// attached blobs; the author signature is checked separately with
    /// [`Record::verify`] once the log's public key is known.
    pub fn open(
        service_key: &Key,
        node: Vec<u8>,
        event_node: Vec<u8>,
        header_node: Vec<u8>,
        body_node: Vec<u8>,
    ) -> Result<Self, RecordError> {
        if node.len() != NODE_LEN {
            return Err(RecordError::Malformed("wrong node length"));
        }
        let (sealed, mac) = node.split_at(NODE_LEN - MAC_LEN);
        if crypto::keyed_mac(service_key, sealed).as_slice() != mac {
            return Err(RecordError::BadSeal);
        }

        let version = node[0];
        if version != VERSION {
            return Err(RecordError::UnsupportedVersion(version));
        }
        let flags = node[1];

        let cid_at = |i: usize| {
            let start = 2 + i * Cid::LEN;
            Cid::try_from(&node[start..start + Cid::LEN])
                .map_err(|_| RecordError::Malformed("truncated cid"))
        };
        let prev = if flags & FLAG_HAS_PREV != 0 {
            Some(cid_at(0)?)
        } else {
            None
        };
        let event = cid_at(1)?;
        let header = cid_at(2)?;
        let body = cid_at(3)?;

        let sig = Signature::try_from(&node[PAYLOAD_LEN..PAYLOAD_LEN + Signature::LEN])
            .map_err(|_| RecordError::Malformed("truncated signature"))?;

        if crypto::content_hash(&event_node) != event {
            return Err(RecordError::NodeMismatch("event"));
        }
        if crypto::content_hash(&header_node) != header {
            return Err(RecordError::NodeMismatch("header"));
        }
        if crypto::content_hash(&body_node) != body {
            return Err(RecordError::NodeMismatch("body"));
        }

        Ok(Self {
            cid: crypto::content_hash(&node),
            prev,
            event,
            header,
            body,
            sig,
            node,
            event_node,
            header_node,
            body_node,
        })
    }

    /// Verify the author signature against the log's public key.
    pub fn verify(&self, log_pub_key: &PubKey) -> Result<(), RecordError> {
        let payload_hash = crypto::content_hash(&self.node[..PAYLOAD_LEN]);
        crypto::verify_hash_strict(log_pub_key, &payload_hash, &self.sig)?;
        Ok(())
    }

    pub fn cid(&self) -> Cid {
        self.cid
    }

    pub fn prev(&self) -> Option<Cid> {
        self.prev
    }

    pub fn event(&self) -> Cid {
        self.event
    }

    pub fn header(&self) -> Cid {
        self.header
    }

    pub fn body(&self) -> Cid {
        self.body
    }

    pub fn sig(&self) -> &Signature {
        &self.sig
    }

    /// The sealed node bytes as transmitted on the wire.
    pub fn node(&self) -> &[u8] {
        &self.node
    }

    pub fn event_node(&self) -> &[u8] {
        &self.event_node
    }

    pub fn header_node(&self) -> &[u8] {
        &self.header_node
    }

    pub fn body_node(&self) -> &[u8] {
        &self.body_node
    }
}
