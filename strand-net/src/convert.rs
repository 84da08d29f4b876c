//! Conversions between wire messages and model types.

use crate::error::NetError;
use crate::proto;
use strand_model::{Cid, Key, LogInfo, PeerId, PubKey, Record, ThreadId};

pub fn thread_id(bytes: &[u8]) -> Result<ThreadId, NetError> {
    ThreadId::try_from(bytes).map_err(|_| NetError::InvalidArgument("invalid thread id".into()))
}

pub fn peer_id(bytes: &[u8]) -> Result<PeerId, NetError> {
    PeerId::try_from(bytes).map_err(|_| NetError::InvalidArgument("invalid peer id".into()))
}

pub fn key(bytes: &[u8]) -> Result<Key, NetError> {
    Key::try_from(bytes).map_err(|_| NetError::InvalidArgument("invalid key".into()))
}

/// Parse an optional cid; the empty byte string means "none".
pub fn opt_cid(bytes: &[u8]) -> Result<Option<Cid>, NetError> {
    if bytes.is_empty() {
        return Ok(None);
    }
    Cid::try_from(bytes)
        .map(Some)
        .map_err(|_| NetError::InvalidArgument("invalid cid".into()))
}

pub fn opt_cid_bytes(cid: Option<Cid>) -> Vec<u8> {
    cid.map(|c| c.as_bytes().to_vec()).unwrap_or_default()
}

pub fn log_to_wire(log: &LogInfo) -> proto::Log {
    proto::Log {
        id: log.id.as_bytes().to_vec(),
        pub_key: log.pub_key.as_bytes().to_vec(),
        addrs: log.addrs.clone(),
        head: opt_cid_bytes(log.head),
    }
}

pub fn log_from_wire(log: &proto::Log) -> Result<LogInfo, NetError> {
    let id = peer_id(&log.id)?;
    let pub_key = PubKey::try_from(log.pub_key.as_slice())
        .map_err(|_| NetError::InvalidArgument("invalid log public key".into()))?;
    if id != PeerId::from_pub_key(&pub_key) {
        return Err(NetError::InvalidArgument(
            "log id does not match its public key".into(),
        ));
    }
    Ok(LogInfo {
        id,
        pub_key,
        addrs: log.addrs.clone(),
        head: opt_cid(&log.head)?,
    })
}

pub fn record_to_wire(record: &Record) -> proto::Record {
    proto::Record {
        record_node: record.node().to_vec(),
        event_node: record.event_node().to_vec(),
        header_node: record.header_node().to_vec(),
        body_node: record.body_node().to_vec(),
    }
}

/// Open a wire record under the thread's service key.
///
/// A record that fails to open is a storage-level concern (either a
/// corrupt relay or a key mismatch on a thread we believe we know), so
/// the failure surfaces as `Internal`, matching the handler contract.
pub fn record_from_wire(record: &proto::Record, service_key: &Key) -> Result<Record, NetError> {
    Record::open(
        service_key,
        record.record_node.clone(),
        record.event_node.clone(),
        record.header_node.clone(),
        record.body_node.clone(),
    )
    .map_err(NetError::internal)
}
