//! Conversion between the raw bytes of the transport and the typed keys and values of the
//! topology.

use std::marker::PhantomData;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

pub trait Deserializer<T>: Send + Sync {
    fn deserialize(&self, topic: &str, data: &Bytes) -> Result<T>;
}

pub trait Serializer<T>: Send + Sync {
    fn serialize(&self, topic: &str, data: &T) -> Result<Bytes>;
}

/// UTF-8 strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringCodec;

impl Deserializer<String> for StringCodec {
    fn deserialize(&self, topic: &str, data: &Bytes) -> Result<String> {
        String::from_utf8(data.to_vec()).map_err(|e| {
            Error::Deserialization(format!("invalid utf-8 record from topic {topic}: {e}"))
        })
    }
}

impl Serializer<String> for StringCodec {
    fn serialize(&self, _topic: &str, data: &String) -> Result<Bytes> {
        Ok(Bytes::from(data.clone()))
    }
}

/// Pass-through for stages that work on raw payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesCodec;

impl Deserializer<Bytes> for BytesCodec {
    fn deserialize(&self, _topic: &str, data: &Bytes) -> Result<Bytes> {
        Ok(data.clone())
    }
}

impl Serializer<Bytes> for BytesCodec {
    fn serialize(&self, _topic: &str, data: &Bytes) -> Result<Bytes> {
        Ok(data.clone())
    }
}

/// JSON encoding for any serde type.
#[derive(Debug)]
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> Deserializer<T> for JsonCodec<T> {
    fn deserialize(&self, topic: &str, data: &Bytes) -> Result<T> {
        serde_json::from_slice(data).map_err(|e| {
            Error::Deserialization(format!("invalid json record from topic {topic}: {e}"))
        })
    }
}

impl<T: Serialize> Serializer<T> for JsonCodec<T> {
    fn serialize(&self, topic: &str, data: &T) -> Result<Bytes> {
        serde_json::to_vec(data).map(Bytes::from).map_err(|e| {
            Error::Serialization(format!("failed to encode record for topic {topic}: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Click {
        user: String,
        count: u32,
    }

    #[test]
    fn test_string_codec_rejects_invalid_utf8() {
        let result = StringCodec.deserialize("clicks", &Bytes::from_static(&[0xff, 0xfe]));
        assert!(matches!(result, Err(Error::Deserialization(_))));
    }

    #[test]
    fn test_json_codec() {
        let codec = JsonCodec::<Click>::new();
        let click = Click {
            user: "alice".to_string(),
            count: 3,
        };
        let bytes = codec.serialize("clicks", &click).unwrap();
        assert_eq!(&bytes[..], br#"{"user":"alice","count":3}"#);
        assert_eq!(codec.deserialize("clicks", &bytes).unwrap(), click);

        let err = codec
            .deserialize("clicks", &Bytes::from_static(b"{\"user\":"))
            .unwrap_err();
        assert!(err.to_string().contains("clicks"));
    }
}
