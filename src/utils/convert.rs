use crate::ConvertError;
use crate::Result;

/// Converts a `u64` to an 8-byte array in little-endian byte order.
///
/// # Examples
/// ```
/// use diskkv::convert::encode_u64;
///
/// let bytes = encode_u64(0x1234_5678_9ABC_DEF0);
/// assert_eq!(bytes, [0xF0, 0xDE, 0xBC, 0x9A, 0x78, 0x56, 0x34, 0x12]);
/// ```
pub const fn encode_u64(num: u64) -> [u8; 8] {
    num.to_le_bytes()
}

pub fn decode_u64<K: AsRef<[u8]>>(bytes: K) -> Result<u64> {
    let bytes = bytes.as_ref();
    let array: [u8; 8] = bytes
        .try_into()
        .map_err(|_| ConvertError::InvalidLength(bytes.len()))?;
    Ok(u64::from_le_bytes(array))
}

pub fn bytes_to_string(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|e| ConvertError::from(e).into())
}
