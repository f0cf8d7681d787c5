//! Canonical string forms for chain-derived values.
//!
//! Channel ids arrive as hex (`0x1a`) from the event feed and as decimal
//! strings from the index; amounts may carry leading zeros; addresses may be
//! checksummed. Everything is converted to one representation before it is
//! stored or compared:
//!
//! - integers (ids, amounts): base-10 without leading zeros
//! - addresses: `0x` followed by 40 lowercase hex digits

use std::str::FromStr;

use alloy_primitives::{Address, U256};

use crate::constants::{ABI_WORD_LEN, ADDRESS_LEN};
use crate::error::ChannelError;

/// Parse a non-negative 256-bit integer from decimal or `0x`-prefixed hex.
pub fn parse_u256(raw: &str) -> Option<U256> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some("") => None,
        Some(hex_digits) => U256::from_str_radix(hex_digits, 16).ok(),
        None => U256::from_str_radix(s, 10).ok(),
    }
}

/// Canonical decimal form of a channel id.
pub fn canonical_id(raw: &str) -> Result<String, ChannelError> {
    parse_u256(raw)
        .map(|v| v.to_string())
        .ok_or_else(|| ChannelError::InvalidId(raw.to_string()))
}

/// Canonical decimal form of a monetary amount.
pub fn normalize_amount(raw: &str) -> Result<String, ChannelError> {
    parse_u256(raw)
        .map(|v| v.to_string())
        .ok_or_else(|| ChannelError::InvalidAmount(raw.to_string()))
}

/// Canonical lowercase form of an account address.
pub fn normalize_address(raw: &str) -> Result<String, ChannelError> {
    let addr = Address::from_str(raw.trim())
        .map_err(|_| ChannelError::InvalidAddress(raw.to_string()))?;
    Ok(format_address(&addr))
}

fn format_address(addr: &Address) -> String {
    format!("0x{}", hex::encode(addr.as_slice()))
}

/// `total - remain`, the amount settled when a channel is finalized.
pub fn settled_amount(total: &str, remain: &str) -> Result<String, ChannelError> {
    let t = parse_u256(total).ok_or_else(|| ChannelError::InvalidAmount(total.to_string()))?;
    let r = parse_u256(remain).ok_or_else(|| ChannelError::InvalidAmount(remain.to_string()))?;
    t.checked_sub(r)
        .map(|v| v.to_string())
        .ok_or_else(|| ChannelError::SettlementUnderflow {
            total: t.to_string(),
            remain: r.to_string(),
        })
}

/// Decode an ABI-encoded `address` from an open-event callback payload.
///
/// Returns `None` when the payload is not a valid encoding: shorter than one
/// word, or with non-zero bytes above the 20-byte address.
pub fn decode_delegate(callback: &[u8]) -> Option<String> {
    if callback.len() < ABI_WORD_LEN {
        return None;
    }
    let word = &callback[..ABI_WORD_LEN];
    let (padding, body) = word.split_at(ABI_WORD_LEN - ADDRESS_LEN);
    if padding.iter().any(|b| *b != 0) {
        return None;
    }
    Some(format_address(&Address::from_slice(body)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ADDR: &str = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";
    const ADDR_CHECKSUM: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    fn encode_word(addr_hex: &str) -> Vec<u8> {
        let mut word = vec![0u8; 12];
        word.extend(hex::decode(addr_hex.trim_start_matches("0x")).unwrap());
        word
    }

    // ------------------------------------------------------------------
    // Integers
    // ------------------------------------------------------------------

    #[test]
    fn canonical_id_from_hex() {
        assert_eq!(canonical_id("0x1a").unwrap(), "26");
        assert_eq!(canonical_id("0X1A").unwrap(), "26");
    }

    #[test]
    fn canonical_id_from_decimal() {
        assert_eq!(canonical_id("26").unwrap(), "26");
        assert_eq!(canonical_id("0026").unwrap(), "26");
    }

    #[test]
    fn canonical_id_rejects_garbage() {
        assert!(canonical_id("").is_err());
        assert!(canonical_id("0x").is_err());
        assert!(canonical_id("abc").is_err());
        assert!(canonical_id("-1").is_err());
    }

    #[test]
    fn canonical_id_handles_full_width_hash() {
        let raw = format!("0x{}", "ff".repeat(32));
        assert_eq!(canonical_id(&raw).unwrap(), U256::MAX.to_string());
    }

    #[test]
    fn amount_strips_leading_zeros() {
        assert_eq!(normalize_amount("05").unwrap(), "5");
        assert_eq!(normalize_amount("0").unwrap(), "0");
        assert_eq!(normalize_amount("000").unwrap(), "0");
    }

    #[test]
    fn settled_amount_subtracts() {
        assert_eq!(settled_amount("100", "30").unwrap(), "70");
        assert_eq!(settled_amount("100", "100").unwrap(), "0");
    }

    #[test]
    fn settled_amount_underflow_is_error() {
        let err = settled_amount("10", "11").unwrap_err();
        assert!(matches!(err, ChannelError::SettlementUnderflow { .. }));
    }

    // ------------------------------------------------------------------
    // Addresses
    // ------------------------------------------------------------------

    #[test]
    fn address_lowercases_checksum() {
        assert_eq!(normalize_address(ADDR_CHECKSUM).unwrap(), ADDR);
        assert_eq!(normalize_address(ADDR).unwrap(), ADDR);
    }

    #[test]
    fn address_rejects_short_input() {
        assert!(normalize_address("0x1234").is_err());
        assert!(normalize_address("").is_err());
    }

    #[test]
    fn delegate_decodes_padded_word() {
        let payload = encode_word(ADDR);
        assert_eq!(decode_delegate(&payload).as_deref(), Some(ADDR));
    }

    #[test]
    fn delegate_ignores_trailing_words() {
        let mut payload = encode_word(ADDR);
        payload.extend([0xAB; 32]);
        assert_eq!(decode_delegate(&payload).as_deref(), Some(ADDR));
    }

    #[test]
    fn delegate_rejects_empty_payload() {
        assert_eq!(decode_delegate(&[]), None);
    }

    #[test]
    fn delegate_rejects_dirty_padding() {
        let mut payload = encode_word(ADDR);
        payload[0] = 1;
        assert_eq!(decode_delegate(&payload), None);
    }

    #[test]
    fn delegate_rejects_short_payload() {
        assert_eq!(decode_delegate(&[0u8; 20]), None);
    }

    proptest! {
        #[test]
        fn leading_zeros_never_change_amounts(value in any::<u128>(), zeros in 0usize..8) {
            let padded = format!("{}{}", "0".repeat(zeros), value);
            prop_assert_eq!(normalize_amount(&padded).unwrap(), value.to_string());
        }

        #[test]
        fn hex_and_decimal_ids_agree(value in any::<u128>()) {
            let hex_form = format!("0x{value:x}");
            prop_assert_eq!(canonical_id(&hex_form).unwrap(), canonical_id(&value.to_string()).unwrap());
        }
    }
}
