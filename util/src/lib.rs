//! Utility functions and types for BLAST
//!
//! Hex helpers that understand the byte-reversed display order used for
//! 256-bit hashes, plus timestamp formatting.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UtilError {
    #[error("Hex decoding error: {0}")]
    HexError(#[from] hex::FromHexError),
    
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Converts a hex string to bytes
pub fn hex_to_bytes(hex: &str) -> Result<Vec<u8>, UtilError> {
    Ok(hex::decode(hex.trim())?)
}

/// Parses a 256-bit hash written in display order (most significant byte
/// first, optional `0x` prefix) into its little-endian byte form.
///
/// Short inputs are left-padded with zeros, so `"0x00"` is the null hash.
pub fn hash_from_hex(s: &str) -> Result<[u8; 32], UtilError> {
    let digits = s.trim();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(digits);
    
    if digits.len() > 64 {
        return Err(UtilError::InvalidFormat(format!(
            "hash literal has {} hex digits, at most 64 allowed",
            digits.len()
        )));
    }
    
    let padded = format!("{:0>64}", digits);
    let mut bytes = [0u8; 32];
    hex::decode_to_slice(&padded, &mut bytes)?;
    bytes.reverse();
    Ok(bytes)
}

/// Renders a little-endian 256-bit hash in display order
pub fn hash_to_hex(hash: &[u8; 32]) -> String {
    let mut reversed = *hash;
    reversed.reverse();
    hex::encode(reversed)
}

/// Formats a timestamp as an ISO 8601 string
pub fn format_timestamp(timestamp: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| "Invalid timestamp".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    
    #[test]
    fn test_hash_hex_display_order() {
        let hash = hash_from_hex("0x00000000a6a47e28b4fea2ab47262d9a420bb1600dee375cad30fa54c9f6ec90").unwrap();
        assert_eq!(hash[0], 0x90);
        assert_eq!(hash[31], 0x00);
        assert_eq!(
            hash_to_hex(&hash),
            "00000000a6a47e28b4fea2ab47262d9a420bb1600dee375cad30fa54c9f6ec90"
        );
    }
    
    #[test]
    fn test_short_literals_are_padded() {
        assert_eq!(hash_from_hex("0x00").unwrap(), [0u8; 32]);
        
        let one = hash_from_hex("1").unwrap();
        assert_eq!(one[0], 1);
        assert!(one[1..].iter().all(|b| *b == 0));
    }
    
    #[test]
    fn test_invalid_literals() {
        assert!(matches!(hash_from_hex("zz"), Err(UtilError::HexError(_))));
        assert!(matches!(
            hash_from_hex(&"f".repeat(65)),
            Err(UtilError::InvalidFormat(_))
        ));
    }
    
    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(1512550966), "2017-12-06T09:02:46Z");
    }
}
