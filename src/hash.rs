//! Canonical transfer hash
//!
//! The hash must match, byte for byte, the implementations inside the bridge
//! contracts on every ledger family. The preimage is seven 32-byte words:
//!
//! ```text
//! offset  word
//!      0  srcChain     bytes4, left-aligned, 28 zero bytes
//!     32  destChain    bytes4, left-aligned, 28 zero bytes
//!     64  srcAccount   bytes32
//!     96  destAccount  bytes32
//!    128  token        bytes32
//!    160  amount       uint256, big-endian
//!    192  nonce        uint256, big-endian
//! ```
//!
//! `keccak256` over the 224-byte buffer is the transfer hash.

use alloy::primitives::U256;
use tiny_keccak::{Hasher, Keccak};

use crate::address_codec::decode_bech32_raw;
use crate::error::CodecError;
use crate::types::ChainId;

/// Size of the hash preimage in bytes
pub const TRANSFER_HASH_PREIMAGE_LEN: usize = 7 * 32;

/// Compute keccak256 hash of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut output = [0u8; 32];
    hasher.finalize(&mut output);
    output
}

// ============================================================================
// Word Encoding
// ============================================================================

/// Left-align a chain ID in a 32-byte word
pub fn chain_id_to_word(id: &ChainId) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[0..4].copy_from_slice(&id.0);
    word
}

/// Build a chain ID from big-endian bytes of at most 4 bytes
pub fn chain_id_from_bytes(bytes: &[u8]) -> Result<ChainId, CodecError> {
    if bytes.len() > 4 {
        return Err(CodecError::InvalidLength {
            what: "chain id",
            expected: 4,
            actual: bytes.len(),
        });
    }
    let mut id = [0u8; 4];
    id[4 - bytes.len()..].copy_from_slice(bytes);
    Ok(ChainId(id))
}

/// Chain word from raw bytes; fails if more than 4 bytes are given
pub fn chain_id_word_from_bytes(bytes: &[u8]) -> Result<[u8; 32], CodecError> {
    chain_id_from_bytes(bytes).map(|id| chain_id_to_word(&id))
}

/// Left-pad a 20-byte account into a 32-byte word
pub fn address_to_word(addr: &[u8; 20]) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..32].copy_from_slice(addr);
    word
}

/// Account word from raw bytes; exactly 20 bytes are required
pub fn account_to_word(account: &[u8]) -> Result<[u8; 32], CodecError> {
    let addr: [u8; 20] = account.try_into().map_err(|_| CodecError::InvalidLength {
        what: "account",
        expected: 20,
        actual: account.len(),
    })?;
    Ok(address_to_word(&addr))
}

/// Low 20 bytes of an account word; the 12 high bytes must be zero
pub fn word_to_address(word: &[u8; 32]) -> Result<[u8; 20], CodecError> {
    if word[..12].iter().any(|&b| b != 0) {
        return Err(CodecError::NonZeroPadding);
    }
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&word[12..32]);
    Ok(addr)
}

/// How a token is named on its ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRef<'a> {
    /// ERC20 or CW20 contract account bytes (20 bytes)
    Address(&'a [u8]),
    /// Native asset denomination, e.g. `uluna`
    Denom(&'a str),
}

/// Token word: account encoding for contract tokens, keccak256(denom) for native ones
pub fn token_to_word(token: &TokenRef<'_>) -> Result<[u8; 32], CodecError> {
    match token {
        TokenRef::Address(bytes) => account_to_word(bytes),
        TokenRef::Denom(denom) => {
            if denom.is_empty() {
                return Err(CodecError::InvalidLength {
                    what: "denom",
                    expected: 1,
                    actual: 0,
                });
            }
            Ok(keccak256(denom.as_bytes()))
        }
    }
}

/// Token word for a token string as a Cosmos bridge stores it
///
/// A bech32 CW20 address maps to its account word (20-byte accounts are
/// left-padded, 32-byte contract addresses are used as-is). Anything else is a
/// native denom and hashes to keccak256(denom).
pub fn cosmos_token_to_word(token: &str) -> [u8; 32] {
    match decode_bech32_raw(token) {
        Ok((bytes, _)) if bytes.len() == 20 => {
            let mut word = [0u8; 32];
            word[12..].copy_from_slice(&bytes);
            word
        }
        Ok((bytes, _)) if bytes.len() == 32 => {
            let mut word = [0u8; 32];
            word.copy_from_slice(&bytes);
            word
        }
        _ => keccak256(token.as_bytes()),
    }
}

// ============================================================================
// Transfer Hash
// ============================================================================

/// Compute the canonical transfer hash
///
/// Any reordering or padding change here breaks agreement with the contracts.
#[allow(clippy::too_many_arguments)]
pub fn compute_transfer_hash(
    src_chain: &ChainId,
    dest_chain: &ChainId,
    src_account: &[u8; 32],
    dest_account: &[u8; 32],
    token: &[u8; 32],
    amount: U256,
    nonce: U256,
) -> [u8; 32] {
    let mut data = [0u8; TRANSFER_HASH_PREIMAGE_LEN];

    data[0..32].copy_from_slice(&chain_id_to_word(src_chain));
    data[32..64].copy_from_slice(&chain_id_to_word(dest_chain));
    data[64..96].copy_from_slice(src_account);
    data[96..128].copy_from_slice(dest_account);
    data[128..160].copy_from_slice(token);
    data[160..192].copy_from_slice(&amount.to_be_bytes::<32>());
    data[192..224].copy_from_slice(&nonce.to_be_bytes::<32>());

    keccak256(&data)
}

// ============================================================================
// Hex Helpers
// ============================================================================

/// Convert bytes32 to hex string with 0x prefix
pub fn bytes32_to_hex(bytes: &[u8; 32]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Convert bytes4 to hex string with 0x prefix
pub fn bytes4_to_hex(bytes: &[u8; 4]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Parse a 32-byte hex word (0x prefix optional)
pub fn hex_to_bytes32(text: &str) -> Result<[u8; 32], CodecError> {
    let stripped = text.strip_prefix("0x").unwrap_or(text);
    let bytes = hex::decode(stripped).map_err(|e| CodecError::InvalidHex {
        what: "bytes32",
        reason: e.to_string(),
    })?;
    bytes.as_slice().try_into().map_err(|_| CodecError::InvalidLength {
        what: "bytes32",
        expected: 32,
        actual: bytes.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_hash() -> [u8; 32] {
        compute_transfer_hash(
            &ChainId::from_u32(1),
            &ChainId::from_u32(2),
            &address_to_word(&[0xaa; 20]),
            &address_to_word(&[0xbb; 20]),
            &token_to_word(&TokenRef::Denom("uluna")).unwrap(),
            U256::from(1_000_000u64),
            U256::from(1u64),
        )
    }

    #[test]
    fn test_keccak256_basic() {
        // keccak256("hello")
        assert_eq!(
            bytes32_to_hex(&keccak256(b"hello")),
            "0x1c8aff950685c2ed4bc3174f3472287b56d9517b9c948127319a09a7a36deac8"
        );
    }

    #[test]
    fn test_vector_all_zeros() {
        let zero = [0u8; 32];
        let result = compute_transfer_hash(
            &ChainId::from_u32(0),
            &ChainId::from_u32(0),
            &zero,
            &zero,
            &zero,
            U256::ZERO,
            U256::ZERO,
        );
        // keccak256 of 224 zero bytes
        assert_eq!(
            bytes32_to_hex(&result),
            "0x868e09d528a16744c1f38ea3c10cc2251e01a456434f91172247695087d129b7"
        );
    }

    #[test]
    fn test_vector_max_values() {
        let max = [0xffu8; 32];
        let result = compute_transfer_hash(
            &ChainId([0xff; 4]),
            &ChainId([0xff; 4]),
            &max,
            &max,
            &max,
            U256::MAX,
            U256::MAX,
        );
        assert_eq!(
            bytes32_to_hex(&result),
            "0xddc2083b4d4fb060eeac481a83f37beb273e1f343e2de0141abbb9df640214ea"
        );
    }

    #[test]
    fn test_vector_uluna_scenario() {
        assert_eq!(
            bytes32_to_hex(&scenario_hash()),
            "0xb6a53b3a1dc136f31f7149da4955fae3a775867d75e06440bd2a73a7f1cc8b1b"
        );
    }

    #[test]
    fn test_native_denom_token_word() {
        assert_eq!(
            bytes32_to_hex(&token_to_word(&TokenRef::Denom("uluna")).unwrap()),
            "0x56fa6c6fbc36d8c245b0a852a43eb5d644e8b4c477b27bfab9537c10945939da"
        );
        assert!(token_to_word(&TokenRef::Denom("")).is_err());
    }

    #[test]
    fn test_chain_id_word_left_aligned() {
        let word = chain_id_to_word(&ChainId::from_u32(56));
        assert_eq!(&word[0..4], &[0, 0, 0, 0x38]);
        assert_eq!(&word[4..], &[0u8; 28]);
    }

    #[test]
    fn test_chain_id_word_from_bytes_length() {
        assert_eq!(
            chain_id_word_from_bytes(&[0x38]).unwrap(),
            chain_id_to_word(&ChainId::from_u32(56))
        );
        assert!(chain_id_word_from_bytes(&[0, 0, 0, 0, 1]).is_err());
    }

    #[test]
    fn test_account_word_padding() {
        let word = account_to_word(&[0x11; 20]).unwrap();
        assert_eq!(&word[..12], &[0u8; 12]);
        assert_eq!(&word[12..], &[0x11; 20]);

        assert!(account_to_word(&[0x11; 19]).is_err());
        assert!(account_to_word(&[0x11; 32]).is_err());
    }

    #[test]
    fn test_word_to_address_rejects_padding() {
        let mut word = address_to_word(&[0x22; 20]);
        assert_eq!(word_to_address(&word).unwrap(), [0x22; 20]);
        word[0] = 1;
        assert_eq!(word_to_address(&word), Err(CodecError::NonZeroPadding));
    }

    #[test]
    fn test_cosmos_token_word_native_and_cw20() {
        assert_eq!(cosmos_token_to_word("uluna"), keccak256(b"uluna"));

        // terra1 + 20 bytes of 0x01..0x14
        let cw20 = "terra1qypqxpq9qcrsszg2pvxq6rs0zqg3yyc5exk7yu";
        let mut expected = [0u8; 32];
        for (i, b) in expected[12..].iter_mut().enumerate() {
            *b = (i + 1) as u8;
        }
        assert_eq!(cosmos_token_to_word(cw20), expected);
    }

    #[test]
    fn test_cosmos_token_word_non_ascii_denom() {
        let denom = format!("a1{}\u{e9}qqqqq", "q".repeat(40));
        assert_eq!(cosmos_token_to_word(&denom), keccak256(denom.as_bytes()));
    }

    #[test]
    fn test_determinism() {
        assert_eq!(scenario_hash(), scenario_hash());
    }

    #[test]
    fn test_sensitivity_to_every_field() {
        let base = scenario_hash();
        let a = address_to_word(&[0xaa; 20]);
        let b = address_to_word(&[0xbb; 20]);
        let t = token_to_word(&TokenRef::Denom("uluna")).unwrap();
        let one = ChainId::from_u32(1);
        let two = ChainId::from_u32(2);
        let amount = U256::from(1_000_000u64);
        let nonce = U256::from(1u64);

        let variants = [
            compute_transfer_hash(&ChainId::from_u32(3), &two, &a, &b, &t, amount, nonce),
            compute_transfer_hash(&one, &ChainId::from_u32(3), &a, &b, &t, amount, nonce),
            compute_transfer_hash(&one, &two, &b, &b, &t, amount, nonce),
            compute_transfer_hash(&one, &two, &a, &a, &t, amount, nonce),
            compute_transfer_hash(&one, &two, &a, &b, &keccak256(b"uusd"), amount, nonce),
            compute_transfer_hash(&one, &two, &a, &b, &t, amount + U256::from(1u64), nonce),
            compute_transfer_hash(&one, &two, &a, &b, &t, amount, U256::from(2u64)),
        ];
        for v in variants {
            assert_ne!(v, base);
        }
    }

    #[test]
    fn test_hex_roundtrip() {
        let hash = scenario_hash();
        let text = bytes32_to_hex(&hash);
        assert_eq!(hex_to_bytes32(&text).unwrap(), hash);
        assert_eq!(hex_to_bytes32(&text[2..]).unwrap(), hash);
        assert!(hex_to_bytes32("0x1234").is_err());
        assert_eq!(bytes4_to_hex(&[0, 0, 0, 1]), "0x00000001");
    }
}
