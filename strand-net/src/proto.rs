//! Wire protocol messages.
//!
//! Five unary sync operations, each a signed request and a plain
//! reply, multiplexed over a stream through the `RpcRequest` /
//! `RpcReply` envelopes. Messages are defined directly in prost's
//! derive form; prost encodes fields in tag order, so encoding a given
//! body is deterministic — that is what makes the signed body bytes
//! canonical on both ends.

/// Canonical reply status codes (the gRPC numbering).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum RpcCode {
    Ok = 0,
    InvalidArgument = 3,
    NotFound = 5,
    Internal = 13,
    Unauthenticated = 16,
}

/// Request header: the caller's public key and its detached signature
/// over the canonical body bytes.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Header {
    #[prost(bytes = "vec", tag = "1")]
    pub pub_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub signature: Vec<u8>,
}

/// Wire form of a log descriptor.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Log {
    #[prost(bytes = "vec", tag = "1")]
    pub id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub pub_key: Vec<u8>,
    #[prost(string, repeated, tag = "3")]
    pub addrs: Vec<String>,
    /// Head cid; empty for an empty log.
    #[prost(bytes = "vec", tag = "4")]
    pub head: Vec<u8>,
}

/// Wire form of a record: the sealed record node plus its three
/// content blobs.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Record {
    #[prost(bytes = "vec", tag = "1")]
    pub record_node: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub event_node: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub header_node: Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub body_node: Vec<u8>,
}

// ==================== GetLogs ====================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetLogsRequest {
    #[prost(message, optional, tag = "1")]
    pub header: Option<Header>,
    #[prost(message, optional, tag = "2")]
    pub body: Option<GetLogsBody>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetLogsBody {
    #[prost(bytes = "vec", tag = "1")]
    pub thread_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub service_key: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetLogsReply {
    #[prost(message, repeated, tag = "1")]
    pub logs: Vec<Log>,
}

// ==================== PushLog ====================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PushLogRequest {
    #[prost(message, optional, tag = "1")]
    pub header: Option<Header>,
    #[prost(message, optional, tag = "2")]
    pub body: Option<PushLogBody>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PushLogBody {
    #[prost(bytes = "vec", tag = "1")]
    pub thread_id: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub log: Option<Log>,
    /// Optional key material for uptake on the receiving side.
    #[prost(bytes = "vec", tag = "3")]
    pub service_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub read_key: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PushLogReply {}

// ==================== GetRecords ====================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetRecordsRequest {
    #[prost(message, optional, tag = "1")]
    pub header: Option<Header>,
    #[prost(message, optional, tag = "2")]
    pub body: Option<GetRecordsBody>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetRecordsBody {
    #[prost(bytes = "vec", tag = "1")]
    pub thread_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub service_key: Vec<u8>,
    #[prost(message, repeated, tag = "3")]
    pub logs: Vec<LogQuery>,
}

/// Per-log portion of a records request: everything after `offset`,
/// up to `limit`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LogQuery {
    #[prost(bytes = "vec", tag = "1")]
    pub log_id: Vec<u8>,
    /// Last cid the caller already holds; empty to read from the start.
    #[prost(bytes = "vec", tag = "2")]
    pub offset: Vec<u8>,
    #[prost(uint64, tag = "3")]
    pub limit: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetRecordsReply {
    #[prost(message, repeated, tag = "1")]
    pub logs: Vec<LogBatch>,
}

/// Per-log portion of a records reply. `log` is attached when the
/// caller did not know the log exists.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LogBatch {
    #[prost(bytes = "vec", tag = "1")]
    pub log_id: Vec<u8>,
    #[prost(message, repeated, tag = "2")]
    pub records: Vec<Record>,
    #[prost(message, optional, tag = "3")]
    pub log: Option<Log>,
}

// ==================== PushRecord ====================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PushRecordRequest {
    #[prost(message, optional, tag = "1")]
    pub header: Option<Header>,
    #[prost(message, optional, tag = "2")]
    pub body: Option<PushRecordBody>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PushRecordBody {
    #[prost(bytes = "vec", tag = "1")]
    pub thread_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub log_id: Vec<u8>,
    #[prost(message, optional, tag = "3")]
    pub record: Option<Record>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PushRecordReply {}

// ==================== ExchangeEdges ====================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExchangeEdgesRequest {
    #[prost(message, optional, tag = "1")]
    pub header: Option<Header>,
    #[prost(message, optional, tag = "2")]
    pub body: Option<ExchangeEdgesBody>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExchangeEdgesBody {
    #[prost(message, repeated, tag = "1")]
    pub threads: Vec<ThreadEdges>,
}

/// The caller's view of one thread's edges.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ThreadEdges {
    #[prost(bytes = "vec", tag = "1")]
    pub thread_id: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub addrs_edge: u64,
    #[prost(uint64, tag = "3")]
    pub heads_edge: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExchangeEdgesReply {
    #[prost(message, repeated, tag = "1")]
    pub edges: Vec<ThreadEdgesStatus>,
}

/// The replying side's view of one thread's edges. Edges are only
/// meaningful when `exists` is set.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ThreadEdgesStatus {
    #[prost(bytes = "vec", tag = "1")]
    pub thread_id: Vec<u8>,
    #[prost(bool, tag = "2")]
    pub exists: bool,
    #[prost(uint64, tag = "3")]
    pub addrs_edge: u64,
    #[prost(uint64, tag = "4")]
    pub heads_edge: u64,
}

// ==================== Envelopes ====================

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpcRequest {
    #[prost(oneof = "rpc_request::Request", tags = "1, 2, 3, 4, 5")]
    pub request: Option<rpc_request::Request>,
}

pub mod rpc_request {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Request {
        #[prost(message, tag = "1")]
        GetLogs(super::GetLogsRequest),
        #[prost(message, tag = "2")]
        PushLog(super::PushLogRequest),
        #[prost(message, tag = "3")]
        GetRecords(super::GetRecordsRequest),
        #[prost(message, tag = "4")]
        PushRecord(super::PushRecordRequest),
        #[prost(message, tag = "5")]
        ExchangeEdges(super::ExchangeEdgesRequest),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RpcReply {
    #[prost(enumeration = "RpcCode", tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: String,
    #[prost(oneof = "rpc_reply::Reply", tags = "3, 4, 5, 6, 7")]
    pub reply: Option<rpc_reply::Reply>,
}

pub mod rpc_reply {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Reply {
        #[prost(message, tag = "3")]
        GetLogs(super::GetLogsReply),
        #[prost(message, tag = "4")]
        PushLog(super::PushLogReply),
        #[prost(message, tag = "5")]
        GetRecords(super::GetRecordsReply),
        #[prost(message, tag = "6")]
        PushRecord(super::PushRecordReply),
        #[prost(message, tag = "7")]
        ExchangeEdges(super::ExchangeEdgesReply),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn body_encoding_is_deterministic() {
        let body = GetRecordsBody {
            thread_id: vec![1; 32],
            service_key: vec![2; 32],
            logs: vec![LogQuery {
                log_id: vec![3; 32],
                offset: vec![],
                limit: 500,
            }],
        };
        assert_eq!(body.encode_to_vec(), body.encode_to_vec());
    }

    #[test]
    fn envelope_roundtrip() {
        let req = RpcRequest {
            request: Some(rpc_request::Request::GetLogs(GetLogsRequest {
                header: Some(Header {
                    pub_key: vec![7; 32],
                    signature: vec![8; 64],
                }),
                body: Some(GetLogsBody {
                    thread_id: vec![9; 32],
                    service_key: vec![10; 32],
                }),
            })),
        };
        let decoded = RpcRequest::decode(&req.encode_to_vec()[..]).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn code_conversions() {
        let reply = RpcReply {
            code: RpcCode::Unauthenticated as i32,
            message: "bad signature".into(),
            reply: None,
        };
        let decoded = RpcReply::decode(&reply.encode_to_vec()[..]).unwrap();
        assert_eq!(RpcCode::try_from(decoded.code), Ok(RpcCode::Unauthenticated));
    }
}
