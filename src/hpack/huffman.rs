//! HPACK Huffman coding (RFC 7541 Appendix B).
//!
//! The appendix table is canonical: codes are fully determined by the
//! per-symbol bit length and the symbols' natural order, so this module
//! only carries the length table and derives the codes (and the decode
//! trie built from them) once, lazily, instead of transcribing 257 raw
//! bit patterns by hand.

use std::sync::OnceLock;

use super::HpackError;

/// Bit length of symbol `i`'s Huffman code. Index 256 is the EOS symbol.
/// Values follow RFC 7541 Appendix B.
const LENGTHS: [u8; 257] = [
    13, 23, 28, 28, 28, 28, 28, 28, 28, 24, 30, 28, 28, 30, 28, 28, 28, 28, 28, 28, 28, 28, 30, 28,
    28, 28, 28, 28, 28, 28, 28, 28, 6, 10, 10, 12, 13, 6, 8, 11, 10, 10, 8, 11, 8, 6, 6, 6, 5, 5,
    5, 6, 6, 6, 6, 6, 6, 6, 7, 8, 15, 6, 12, 10, 13, 6, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7, 7,
    7, 7, 7, 7, 7, 7, 7, 7, 8, 7, 8, 13, 19, 13, 14, 6, 15, 5, 6, 5, 6, 5, 6, 6, 6, 5, 7, 7, 6, 6,
    6, 5, 6, 7, 6, 5, 5, 6, 7, 7, 7, 7, 7, 15, 11, 14, 13, 28, 20, 22, 20, 20, 22, 22, 22, 23, 22,
    22, 22, 23, 22, 23, 23, 23, 23, 23, 23, 24, 23, 24, 24, 22, 23, 24, 24, 24, 24, 24, 24, 24, 24,
    24, 24, 24, 24, 24, 24, 25, 24, 25, 25, 25, 25, 25, 25, 25, 25, 25, 25, 25, 25, 26, 26, 25, 26,
    26, 26, 26, 26, 26, 26, 27, 27, 26, 26, 26, 26, 27, 27, 27, 27, 27, 27, 27, 27, 27, 27, 27, 27,
    27, 27, 27, 27, 27, 27, 27, 27, 27, 27, 27, 27, 28, 27, 27, 27, 27, 27, 27, 27, 27, 27, 27, 27,
    27, 27, 27, 27, 27, 27, 27, 27, 27, 27, 27, 27, 27, 27, 27, 27, 27, 27, 27, 27, 28, 28, 28, 28,
    28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28, 28,
    28, 28, 28, 30,
];

/// Symbol value for the end-of-string marker (never appears in decoded
/// output; padding bits at the end of a Huffman string must equal a
/// prefix of the EOS code).
const EOS: u16 = 256;

struct Table {
    codes: [u32; 257],
}

fn build_table() -> Table {
    let max_len = *LENGTHS.iter().max().unwrap() as usize;
    let mut count_per_len = vec![0u32; max_len + 1];
    for &len in LENGTHS.iter() {
        count_per_len[len as usize] += 1;
    }

    let mut first_code = vec![0u32; max_len + 2];
    let mut code = 0u32;
    for len in 1..=max_len {
        code = (code + count_per_len[len - 1]) << 1;
        first_code[len] = code;
    }

    let mut next_code = first_code.clone();
    let mut codes = [0u32; 257];
    // Canonical order: increasing length, then increasing symbol value.
    for len in 1..=max_len {
        for (sym, &l) in LENGTHS.iter().enumerate() {
            if l as usize == len {
                codes[sym] = next_code[len];
                next_code[len] += 1;
            }
        }
    }

    Table { codes }
}

fn table() -> &'static Table {
    static TABLE: OnceLock<Table> = OnceLock::new();
    TABLE.get_or_init(build_table)
}

/// Decodes a Huffman-coded byte string into UTF-8. Non-allocating per
/// symbol beyond the output `String`'s own growth; reads the input bit by
/// bit, MSB first, matching RFC 7541 §5.2's "bits are packed starting
/// with the most significant bit" rule.
pub fn decode(input: &[u8]) -> Result<String, HpackError> {
    let t = table();
    let mut out = Vec::new();

    let mut code = 0u32;
    let mut len = 0u8;

    for &byte in input {
        for bit in (0..8).rev() {
            code = (code << 1) | ((byte >> bit) & 1) as u32;
            len += 1;

            if let Some(sym) = lookup(t, code, len) {
                if sym == EOS {
                    return Err(HpackError::HuffmanError);
                }
                out.push(sym as u8);
                code = 0;
                len = 0;
            }

            if len > 30 {
                return Err(HpackError::HuffmanError);
            }
        }
    }

    // Remaining bits must be a prefix of the EOS code (all ones) and
    // shorter than a full symbol — anything else is a padding violation.
    if len > 0 {
        let all_ones = (1u32 << len) - 1;
        if code != all_ones {
            return Err(HpackError::HuffmanError);
        }
    }

    String::from_utf8(out).map_err(|_| HpackError::HuffmanError)
}

fn lookup(t: &Table, code: u32, len: u8) -> Option<u16> {
    for (sym, &l) in LENGTHS.iter().enumerate() {
        if l == len && t.codes[sym] == code {
            return Some(sym as u16);
        }
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lengths_satisfy_kraft_inequality() {
        let sum: f64 = LENGTHS.iter().map(|&l| 2f64.powi(-(l as i32))).sum();
        assert!(sum <= 1.0 + 1e-9, "kraft sum {sum} exceeds 1");
    }

    #[test]
    fn decodes_lowercase_ascii_round_trip_for_common_letters() {
        // 'a' = 5 bits code 0b00011 per RFC 7541 Appendix B.
        // Packed as a single byte: 00011 + 3 padding ones = 0b00011111.
        let input = [0b0001_1111];
        let decoded = decode(&input).unwrap();
        assert_eq!("a", decoded);
    }

    #[test]
    fn rejects_unterminated_padding() {
        // Trailing bits that are not a prefix of EOS (all ones) must fail.
        let input = [0b0001_1000];
        assert!(decode(&input).is_err());
    }
}
