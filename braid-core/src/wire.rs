//! HTTP/2 wire form of metadata.
//!
//! Binary header values (keys ending in `-bin`) are base64 on the wire;
//! everything else must be printable ASCII (0x20..=0x7E). Decoding accepts
//! both padded and unpadded base64.

use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;

use crate::metadata::{is_binary_key, Metadata};
use crate::status::{Code, Status};

/// Standard-alphabet engine that emits padding and decodes either form.
const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encode metadata into wire header pairs.
///
/// Binary values are base64-encoded. Non-binary values that are not
/// printable ASCII are dropped with a warning; the pair disappears from
/// the output.
pub fn to_wire(metadata: &Metadata) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut pairs = Vec::with_capacity(metadata.len());
    for (key, value) in metadata.iter() {
        if is_binary_key(key) {
            pairs.push((key.as_bytes().to_vec(), BASE64.encode(value).into_bytes()));
        } else if is_printable_ascii(value) {
            pairs.push((key.as_bytes().to_vec(), value.to_vec()));
        } else {
            tracing::warn!(
                key,
                value = ?String::from_utf8_lossy(value),
                "metadata value contains invalid ASCII characters, dropping"
            );
        }
    }
    pairs
}

/// Decode wire header pairs back into metadata.
///
/// Binary values are base64-decoded; invalid base64 is an INTERNAL error.
pub fn from_wire<I>(pairs: I) -> Result<Metadata, Status>
where
    I: IntoIterator<Item = (Vec<u8>, Vec<u8>)>,
{
    let mut metadata = Metadata::new();
    for (key, value) in pairs {
        let key = String::from_utf8(key).map_err(|e| {
            Status::new(Code::Internal).with_description(format!("non-ASCII header key: {e}"))
        })?;
        if is_binary_key(&key) {
            let decoded = BASE64.decode(&value).map_err(|e| {
                Status::new(Code::Internal)
                    .with_description(format!("invalid base64 in {key}: {e}"))
            })?;
            metadata.insert(&key, decoded);
        } else {
            metadata.insert(&key, value);
        }
    }
    Ok(metadata)
}

/// Extract the fully-qualified method name from a request path.
///
/// Returns `None` for a malformed path (one not starting with `/`),
/// otherwise the trimmed `<service>/<method>` form.
pub fn method_from_path(path: &str) -> Option<&str> {
    path.strip_prefix('/')
}

fn is_printable_ascii(value: &[u8]) -> bool {
    value.iter().all(|&b| (0x20..=0x7e).contains(&b))
}
