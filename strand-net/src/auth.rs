//! Request signing and verification discipline.
//!
//! Every request header carries the caller's public key and a detached
//! signature over the canonical (prost-encoded) body bytes. The server
//! re-encodes the body, verifies the signature, and uses the key's
//! fingerprint as the authenticated caller id; there is no separate
//! session or token. Verification is CPU work and runs on the blocking
//! pool so it cannot starve the I/O workers.

use crate::error::NetError;
use crate::proto;
use strand_model::{crypto, Identity, PeerId, PubKey, Record, Signature};

/// Sign a request body, producing its header.
pub fn sign_request<M: prost::Message>(identity: &Identity, body: &M) -> proto::Header {
    let payload = body.encode_to_vec();
    let sig = identity.sign_hash(&crypto::content_hash(&payload));
    proto::Header {
        pub_key: identity.pub_key().as_bytes().to_vec(),
        signature: sig.0.to_vec(),
    }
}

/// Verify a request's signature and derive the caller's identity.
///
/// Failure modes: missing header or body is `InvalidArgument`, an
/// unparseable public key is `InvalidArgument`, a signature that does
/// not check out is `Unauthenticated`.
pub async fn verify_request<M: prost::Message>(
    header: Option<&proto::Header>,
    body: Option<&M>,
) -> Result<(PeerId, PubKey), NetError> {
    let (Some(header), Some(body)) = (header, body) else {
        return Err(NetError::InvalidArgument("bad request".into()));
    };
    let payload = body.encode_to_vec();

    let pub_key = PubKey::try_from(header.pub_key.as_slice())
        .map_err(|_| NetError::InvalidArgument("invalid public key".into()))?;
    let sig = Signature::try_from(header.signature.as_slice())
        .map_err(|_| NetError::Unauthenticated("bad signature".into()))?;

    tokio::task::spawn_blocking(move || {
        crypto::verify_hash(&pub_key, &crypto::content_hash(&payload), &sig)
    })
    .await
    .map_err(NetError::internal)?
    .map_err(|_| NetError::Unauthenticated("bad signature".into()))?;

    Ok((PeerId::from_pub_key(&pub_key), pub_key))
}

/// Verify a record's author signature on the blocking pool.
pub async fn verify_record(record: Record, log_pub_key: PubKey) -> Result<(), NetError> {
    tokio::task::spawn_blocking(move || record.verify(&log_pub_key))
        .await
        .map_err(NetError::internal)?
        .map_err(|e| NetError::Unauthenticated(e.to_string()))
}
