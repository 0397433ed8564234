//! A thin wrapper around the self-describing binary codec.
//!
//! CBOR is the concrete choice via `ciborium`. The contract callers depend
//! on: canonical encoding of the same value yields the same bytes, and maps
//! encode with sorted keys. We get the latter for free by only ever
//! serializing `BTreeMap`-backed types; `ciborium` preserves field/element
//! order as produced by `serde`, so sorted input implies sorted output.

use crate::error::{WarpError, Result};
use serde::{de::DeserializeOwned, Serialize};

/// Encodes `value` to its canonical binary representation.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::ser::into_writer(value, &mut buf).map_err(|err| WarpError::Codec {
        reason: err.to_string(),
    })?;
    Ok(buf)
}

/// Decodes `bytes` previously produced by [`encode`].
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::de::from_reader(bytes).map_err(|err| WarpError::Codec {
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::BTreeMap;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Sample {
        map: BTreeMap<String, u64>,
        list: Vec<i64>,
    }

    #[test]
    fn round_trip() {
        let mut map = BTreeMap::new();
        map.insert("b".to_string(), 2);
        map.insert("a".to_string(), 1);
        let sample = Sample {
            map,
            list: vec![1, -2, 3],
        };
        let bytes = encode(&sample).unwrap();
        let decoded: Sample = decode(&bytes).unwrap();
        assert_eq!(sample, decoded);
    }

    #[test]
    fn canonical_encoding_is_deterministic() {
        let mut map = BTreeMap::new();
        map.insert("z".to_string(), 1u64);
        map.insert("a".to_string(), 2u64);
        let sample = Sample {
            map,
            list: vec![],
        };
        let bytes1 = encode(&sample).unwrap();
        let bytes2 = encode(&sample).unwrap();
        assert_eq!(bytes1, bytes2);
    }
}
