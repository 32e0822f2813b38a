//! Minimal contract ABI encoding for the registry's functions.
//!
//! Only the shapes the registry uses are supported: `address`, `uint256` and a
//! dynamic `string` argument, plus single-word `address`, `bool` and
//! `uint256` return values and the standard `Error(string)` revert payload.

use registry_probe::Address;
use sha3::{Digest, Keccak256};
use thiserror::Error;

const WORD: usize = 32;

/// Selector of the standard `Error(string)` revert payload
pub const ERROR_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// ABI decoding failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiError {
    #[error("return data truncated: need {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("value does not fit in 64 bits")]
    Overflow,

    #[error("invalid boolean word")]
    InvalidBool,
}

/// One call argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    Address(Address),
    Uint(u64),
    String(&'a str),
}

/// First four bytes of the Keccak-256 hash of a canonical signature
pub fn selector(signature: &str) -> [u8; 4] {
    let digest = Keccak256::digest(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&digest[..4]);
    out
}

/// Selector followed by the encoded arguments
pub fn encode_call(signature: &str, tokens: &[Token<'_>]) -> Vec<u8> {
    let mut out = selector(signature).to_vec();
    out.extend(encode(tokens));
    out
}

/// Head/tail encoding of `tokens`
pub fn encode(tokens: &[Token<'_>]) -> Vec<u8> {
    let head_len = tokens.len() * WORD;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        match token {
            Token::Address(address) => {
                head.extend_from_slice(&[0u8; 12]);
                head.extend_from_slice(address.as_bytes());
            }
            Token::Uint(value) => head.extend_from_slice(&uint_word(*value)),
            Token::String(text) => {
                head.extend_from_slice(&uint_word((head_len + tail.len()) as u64));
                tail.extend_from_slice(&uint_word(text.len() as u64));
                tail.extend_from_slice(text.as_bytes());
                let padding = (WORD - text.len() % WORD) % WORD;
                tail.extend(std::iter::repeat(0u8).take(padding));
            }
        }
    }

    head.extend(tail);
    head
}

fn uint_word(value: u64) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 8..].copy_from_slice(&value.to_be_bytes());
    word
}

fn word_at(data: &[u8], offset: usize) -> Result<&[u8], AbiError> {
    let end = offset.checked_add(WORD).ok_or(AbiError::Overflow)?;
    data.get(offset..end).ok_or(AbiError::Truncated {
        expected: end,
        actual: data.len(),
    })
}

fn word_to_u64(word: &[u8]) -> Result<u64, AbiError> {
    if word[..WORD - 8].iter().any(|b| *b != 0) {
        return Err(AbiError::Overflow);
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&word[WORD - 8..]);
    Ok(u64::from_be_bytes(bytes))
}

pub fn decode_uint(data: &[u8]) -> Result<u64, AbiError> {
    word_to_u64(word_at(data, 0)?)
}

pub fn decode_bool(data: &[u8]) -> Result<bool, AbiError> {
    match decode_uint(data) {
        Ok(0) => Ok(false),
        Ok(1) => Ok(true),
        Ok(_) | Err(AbiError::Overflow) => Err(AbiError::InvalidBool),
        Err(err) => Err(err),
    }
}

pub fn decode_address(data: &[u8]) -> Result<Address, AbiError> {
    let word = word_at(data, 0)?;
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&word[12..]);
    Ok(Address::new(bytes))
}

/// Reason string of an `Error(string)` revert payload
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    let body = data.strip_prefix(&ERROR_SELECTOR[..])?;
    let offset = usize::try_from(word_to_u64(word_at(body, 0).ok()?).ok()?).ok()?;
    let length = usize::try_from(word_to_u64(word_at(body, offset).ok()?).ok()?).ok()?;
    let start = offset.checked_add(WORD)?;
    let text = body.get(start..start.checked_add(length)?)?;
    Some(String::from_utf8_lossy(text).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_selectors() {
        assert_eq!(hex::encode(selector("transfer(address,uint256)")), "a9059cbb");
        assert_eq!(selector("Error(string)"), ERROR_SELECTOR);
    }

    #[test]
    fn test_encode_address_argument() {
        let target: Address = "0x00000000000000000000000000000000000000aa".parse().unwrap();
        let data = encode_call("registerVehicle(address)", &[Token::Address(target)]);

        assert_eq!(data.len(), 4 + WORD);
        assert_eq!(&data[..4], &selector("registerVehicle(address)"));
        assert!(data[4..35].iter().all(|b| *b == 0));
        assert_eq!(data[35], 0xaa);
    }

    #[test]
    fn test_encode_string_and_uint() {
        let data = encode(&[Token::String("Crash Hwy 1"), Token::Uint(1_700_000_000)]);

        // two head words, then length word and one padded data word
        assert_eq!(data.len(), 4 * WORD);
        assert_eq!(decode_uint(&data[..WORD]).unwrap(), 64);
        assert_eq!(decode_uint(&data[WORD..]).unwrap(), 1_700_000_000);
        assert_eq!(decode_uint(&data[2 * WORD..]).unwrap(), 11);
        assert_eq!(&data[3 * WORD..3 * WORD + 11], b"Crash Hwy 1");
        assert!(data[3 * WORD + 11..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_decode_return_words() {
        let mut word = [0u8; WORD];
        word[31] = 1;
        assert!(decode_bool(&word).unwrap());
        assert_eq!(decode_uint(&word).unwrap(), 1);

        word[31] = 2;
        assert_eq!(decode_bool(&word), Err(AbiError::InvalidBool));

        word[0] = 1;
        assert_eq!(decode_uint(&word), Err(AbiError::Overflow));

        assert!(matches!(decode_uint(&[0u8; 4]), Err(AbiError::Truncated { .. })));
    }

    #[test]
    fn test_decode_revert_reason() {
        let mut payload = ERROR_SELECTOR.to_vec();
        payload.extend(encode(&[Token::String("Access Denied: Vehicle not authorized")]));

        assert_eq!(
            decode_revert_reason(&payload).as_deref(),
            Some("Access Denied: Vehicle not authorized")
        );
        assert_eq!(decode_revert_reason(&payload[..40]), None);
        assert_eq!(decode_revert_reason(&[0xde, 0xad, 0xbe, 0xef]), None);
    }
}
