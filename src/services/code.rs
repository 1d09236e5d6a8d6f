use rand::{CryptoRng, Rng};

/// Uppercase alphanumerics without the look-alikes `0/O` and `1/I`, so
/// codes survive URLs, QR payloads and being read aloud at a desk.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub const DEFAULT_CODE_LENGTH: usize = 10;
pub const MIN_CODE_LENGTH: usize = 6;
pub const MAX_CODE_LENGTH: usize = 32;

pub fn mint_code(length: usize) -> String {
    mint_code_with(&mut rand::thread_rng(), length)
}

pub fn mint_code_with<R: Rng + CryptoRng>(rng: &mut R, length: usize) -> String {
    (0..length)
        .map(|_| char::from(CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())]))
        .collect()
}

/// Normalises typed or scanned input before an exact-match lookup.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

pub fn is_well_formed(code: &str) -> bool {
    !code.is_empty() && code.bytes().all(|b| CODE_ALPHABET.contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn test_minted_codes_are_unique_in_practice() {
        let codes: HashSet<String> = (0..10_000).map(|_| mint_code(DEFAULT_CODE_LENGTH)).collect();
        assert_eq!(codes.len(), 10_000);
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("  k3qz92ab7x\n"), "K3QZ92AB7X");
        assert!(is_well_formed("K3QZ92AB7X"));
        assert!(!is_well_formed("K3QZ-91"));
        assert!(!is_well_formed(""));
    }

    #[test]
    fn test_alphabet_has_no_look_alikes() {
        for ambiguous in [b'0', b'O', b'1', b'I'] {
            assert!(!CODE_ALPHABET.contains(&ambiguous));
        }
        assert!(!is_well_formed("K3QZ0OAB7X"));
    }

    proptest! {
        #[test]
        fn minted_code_has_requested_length_and_alphabet(length in 1usize..32) {
            let code = mint_code(length);
            prop_assert_eq!(code.len(), length);
            prop_assert!(is_well_formed(&code));
        }
    }
}
