//! Address codec between account words and native address text
//!
//! EVM ledgers use hex addresses with an EIP-55 checksum. Cosmos ledgers use
//! bech32 text (`hrp` + `1` + data + 6-symbol checksum). Both map to the same
//! 32-byte account word: the 20 raw bytes right-aligned behind 12 zero bytes.
//!
//! The bech32 decoder follows the bridge contract: it splits on the last `1`
//! and drops the checksum symbols without verifying them before regrouping
//! the 5-bit symbols into bytes. Encoding goes through `bech32::encode`.
//! [`verify_bech32_checksum`] checks text strictly where that matters.

use alloy::primitives::Address;
use bech32::{u5, FromBase32, ToBase32, Variant};

use crate::error::CodecError;
use crate::hash::{address_to_word, word_to_address};
use crate::types::LedgerFamily;

const BECH32_CHARSET: &[u8] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const BECH32_CHECKSUM_LEN: usize = 6;

// ============================================================================
// EVM Addresses
// ============================================================================

/// Parse an EVM address (0x prefix optional, any case) into raw bytes
pub fn parse_evm_address(addr: &str) -> Result<[u8; 20], CodecError> {
    let hex_str = addr.strip_prefix("0x").unwrap_or(addr);
    if hex_str.len() != 40 {
        return Err(CodecError::InvalidEvmAddress(format!(
            "expected 40 hex characters, got {}",
            hex_str.len()
        )));
    }
    let bytes =
        hex::decode(hex_str).map_err(|e| CodecError::InvalidEvmAddress(e.to_string()))?;
    let mut result = [0u8; 20];
    result.copy_from_slice(&bytes);
    Ok(result)
}

/// Encode raw bytes as an EIP-55 checksummed address
pub fn encode_evm_address(bytes: &[u8; 20]) -> String {
    Address::from(*bytes).to_checksum(None)
}

pub fn evm_address_to_word(addr: &str) -> Result<[u8; 32], CodecError> {
    parse_evm_address(addr).map(|raw| address_to_word(&raw))
}

/// Checksummed address from an account word; fails on non-zero padding
pub fn word_to_evm_address(word: &[u8; 32]) -> Result<String, CodecError> {
    word_to_address(word).map(|raw| encode_evm_address(&raw))
}

// ============================================================================
// Bech32 Addresses
// ============================================================================

/// Decode a bech32 address into its raw bytes and human-readable prefix
///
/// Accepts 20-byte accounts and 32-byte contract addresses.
pub fn decode_bech32_raw(addr: &str) -> Result<(Vec<u8>, String), CodecError> {
    if !addr.is_ascii() {
        return Err(CodecError::InvalidBech32("non-ASCII character".to_string()));
    }
    let has_lower = addr.bytes().any(|b| b.is_ascii_lowercase());
    let has_upper = addr.bytes().any(|b| b.is_ascii_uppercase());
    if has_lower && has_upper {
        return Err(CodecError::InvalidBech32("mixed case".to_string()));
    }
    let addr = addr.to_ascii_lowercase();

    let (hrp, data_part) = addr
        .rsplit_once('1')
        .ok_or_else(|| CodecError::InvalidBech32("missing separator".to_string()))?;
    if hrp.is_empty() {
        return Err(CodecError::InvalidBech32("empty prefix".to_string()));
    }
    if data_part.len() <= BECH32_CHECKSUM_LEN {
        return Err(CodecError::InvalidBech32("data too short".to_string()));
    }

    let payload = &data_part[..data_part.len() - BECH32_CHECKSUM_LEN];
    let symbols = bech32_symbols(payload)?;
    let bytes = Vec::<u8>::from_base32(&symbols)
        .map_err(|e| CodecError::InvalidBech32(format!("invalid base32 data: {}", e)))?;

    if bytes.len() != 20 && bytes.len() != 32 {
        return Err(CodecError::InvalidLength {
            what: "bech32 address",
            expected: 20,
            actual: bytes.len(),
        });
    }
    Ok((bytes, hrp.to_string()))
}

/// Decode a bech32 account address into exactly 20 bytes
pub fn decode_bech32_address(addr: &str) -> Result<([u8; 20], String), CodecError> {
    let (bytes, hrp) = decode_bech32_raw(addr)?;
    let raw: [u8; 20] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| CodecError::InvalidLength {
            what: "bech32 account",
            expected: 20,
            actual: bytes.len(),
        })?;
    Ok((raw, hrp))
}

/// Encode raw bytes as bech32 text with a freshly computed checksum
pub fn encode_bech32_address(bytes: &[u8], hrp: &str) -> Result<String, CodecError> {
    bech32::encode(&hrp.to_ascii_lowercase(), bytes.to_base32(), Variant::Bech32)
        .map_err(|e| CodecError::InvalidBech32(format!("failed to encode with prefix {:?}: {}", hrp, e)))
}

pub fn bech32_to_word(addr: &str) -> Result<[u8; 32], CodecError> {
    decode_bech32_address(addr).map(|(raw, _)| address_to_word(&raw))
}

/// Bech32 text from an account word; fails with `NonZeroPadding` if the high 12 bytes are set
pub fn word_to_bech32(word: &[u8; 32], hrp: &str) -> Result<String, CodecError> {
    let raw = word_to_address(word)?;
    encode_bech32_address(&raw, hrp)
}

/// Strict validation, checksum included
pub fn verify_bech32_checksum(addr: &str) -> Result<(), CodecError> {
    match bech32::decode(addr) {
        Ok((_, _, Variant::Bech32)) => Ok(()),
        Ok((_, _, variant)) => Err(CodecError::InvalidBech32(format!(
            "unexpected variant {:?}",
            variant
        ))),
        Err(e) => Err(CodecError::InvalidBech32(e.to_string())),
    }
}

fn bech32_symbols(data: &str) -> Result<Vec<u5>, CodecError> {
    data.chars()
        .map(|c| {
            let idx = BECH32_CHARSET
                .iter()
                .position(|&x| x as char == c)
                .ok_or_else(|| CodecError::InvalidBech32(format!("invalid character {:?}", c)))?;
            u5::try_from_u8(idx as u8).map_err(|e| CodecError::InvalidBech32(e.to_string()))
        })
        .collect()
}

// ============================================================================
// Family Dispatch
// ============================================================================

/// Parse account text in the family's native format into an account word
pub fn parse_account(family: LedgerFamily, text: &str) -> Result<[u8; 32], CodecError> {
    match family {
        LedgerFamily::Evm => evm_address_to_word(text),
        LedgerFamily::Cosmos => bech32_to_word(text),
    }
}

/// Render an account word in the family's native format
///
/// Cosmos ledgers need their bech32 prefix.
pub fn format_account(
    family: LedgerFamily,
    word: &[u8; 32],
    hrp: Option<&str>,
) -> Result<String, CodecError> {
    match family {
        LedgerFamily::Evm => word_to_evm_address(word),
        LedgerFamily::Cosmos => {
            let hrp =
                hrp.ok_or_else(|| CodecError::InvalidBech32("missing bech32 prefix".to_string()))?;
            word_to_bech32(word, hrp)
        }
    }
}
