use crate::core::error::{LoaderError, LoaderResult};

/// A value that can be decoded from one entry of an opened bundle.
pub trait Resource: Send + Sync + Sized + 'static {
    fn decode(name: &str, bytes: Vec<u8>) -> LoaderResult<Self>;
}

/// Entry bytes, untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAsset {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Resource for RawAsset {
    fn decode(name: &str, bytes: Vec<u8>) -> LoaderResult<Self> {
        Ok(Self {
            name: name.to_string(),
            bytes,
        })
    }
}

/// UTF-8 text entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextAsset {
    pub name: String,
    pub text: String,
}

impl Resource for TextAsset {
    fn decode(name: &str, bytes: Vec<u8>) -> LoaderResult<Self> {
        let text = String::from_utf8(bytes).map_err(|e| LoaderError::Decode {
            asset: name.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            name: name.to_string(),
            text,
        })
    }
}

/// JSON document entry.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonAsset {
    pub name: String,
    pub value: serde_json::Value,
}

impl Resource for JsonAsset {
    fn decode(name: &str, bytes: Vec<u8>) -> LoaderResult<Self> {
        let value = serde_json::from_slice(&bytes).map_err(|e| LoaderError::Decode {
            asset: name.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            name: name.to_string(),
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_rejects_invalid_utf8() {
        let err = TextAsset::decode("readme", vec![0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, LoaderError::Decode { ref asset, .. } if asset == "readme"));
    }

    #[test]
    fn json_decodes_document() {
        let asset = JsonAsset::decode("settings", br#"{"volume": 7}"#.to_vec()).unwrap();
        assert_eq!(asset.value["volume"], 7);
    }
}
