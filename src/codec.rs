//! Wrapper envelope encoding.
//!
//! Every value stored in the authoritative store is wrapped with the
//! originating node's id so the change feed can suppress self-echo. The
//! wrapper is opaque to the global store itself — only this crate's ends
//! encode and decode it.

use serde::{Deserialize, Serialize};

use crate::node_id::NodeId;
use crate::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Wrapper {
    source_id: String,
    payload: Vec<u8>,
}

/// Encode `value` plus the writing node's id into an opaque byte wrapper.
pub fn encode<T: Serialize>(origin: NodeId, value: &T) -> Result<Vec<u8>, Error> {
    let payload =
        bincode::serialize(value).map_err(|e| Error::Serialization(e.to_string()))?;
    let wrapper = Wrapper {
        source_id: origin.to_string(),
        payload,
    };
    bincode::serialize(&wrapper).map_err(|e| Error::Serialization(e.to_string()))
}

/// Decode a wrapper produced by [`encode`], returning the originating node's
/// id (if parseable) and the inner value.
pub fn decode<T: for<'de> Deserialize<'de>>(
    bytes: &[u8],
) -> Result<(Option<NodeId>, T), Error> {
    let wrapper: Wrapper =
        bincode::deserialize(bytes).map_err(|e| Error::Serialization(e.to_string()))?;
    let value = bincode::deserialize(&wrapper.payload)
        .map_err(|e| Error::Serialization(e.to_string()))?;
    Ok((NodeId::from_source_id(&wrapper.source_id), value))
}

/// Decode just the source id from a wrapper, without touching the payload.
/// Used by the change feed, which only needs to know who wrote a record.
pub fn decode_source_id(bytes: &[u8]) -> Result<Option<NodeId>, Error> {
    let wrapper: Wrapper =
        bincode::deserialize(bytes).map_err(|e| Error::Serialization(e.to_string()))?;
    Ok(NodeId::from_source_id(&wrapper.source_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_value_and_origin() {
        let node = NodeId::generate();
        let bytes = encode(node, &"hello".to_string()).unwrap();
        let (origin, value): (Option<NodeId>, String) = decode(&bytes).unwrap();
        assert_eq!(origin, Some(node));
        assert_eq!(value, "hello");
    }

    #[test]
    fn decode_source_id_matches_full_decode() {
        let node = NodeId::generate();
        let bytes = encode(node, &42u32).unwrap();
        assert_eq!(decode_source_id(&bytes).unwrap(), Some(node));
    }
}
