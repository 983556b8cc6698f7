//! Remote ids in a form usable as a case-insensitive URI authority.
//!
//! Remote ids use `[0-9a-zA-Z_]`. Host authorities are lowercased, so ids are re-encoded
//! from base 63 into base 36 before they are placed in a URI and decoded on the way back.

use crate::error::{MirrorError, Result};

const BASE63: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ_";
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Encode a remote id into lowercase base 36.
pub fn encode_id(id: &str) -> Result<String> {
    convert(id, BASE63, BASE36)
}

/// Decode an id produced by [`encode_id`].
pub fn decode_id(encoded: &str) -> Result<String> {
    convert(encoded, BASE36, BASE63)
}

fn convert(input: &str, from: &[u8], to: &[u8]) -> Result<String> {
    if input.is_empty() {
        return Ok(String::new());
    }

    let mut digits = Vec::with_capacity(input.len());
    for byte in input.bytes() {
        let digit = from.iter().position(|&c| c == byte).ok_or_else(|| {
            MirrorError::invalid_input(format!(
                "character '{}' is not valid in id \"{input}\"",
                byte as char
            ))
        })?;
        digits.push(digit as u32);
    }

    // Leading zero digits carry no value; keep their count so encoding is reversible.
    let leading_zeros = digits.iter().take_while(|&&digit| digit == 0).count();

    let from_base = from.len() as u32;
    let to_base = to.len() as u32;
    let mut output = Vec::new();
    let mut number = digits[leading_zeros..].to_vec();
    while !number.is_empty() {
        let mut quotient = Vec::with_capacity(number.len());
        let mut remainder = 0u32;
        for digit in number {
            let accumulator = remainder * from_base + digit;
            let next = accumulator / to_base;
            remainder = accumulator % to_base;
            if !quotient.is_empty() || next != 0 {
                quotient.push(next);
            }
        }
        output.push(to[remainder as usize]);
        number = quotient;
    }
    output.extend(std::iter::repeat_n(to[0], leading_zeros));
    output.reverse();

    String::from_utf8(output).map_err(|e| MirrorError::internal(e.to_string()))
}
