//! Construction and mutation of the 20-byte peer id a session advertises
//! in its handshakes and tracker announces.

use rand::Rng;

/// Azureus-style fingerprint this engine advertises (`-DT0100-`).
pub const FINGERPRINT: &[u8] = b"-DT0100-";

const FILLER_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz-_.!~*'()";

const EXT_SUFFIX: &[u8] = b"ext";
const EXT_SUFFIX_START: usize = 17;

/// Builds a fresh 20-byte peer id: fingerprint, then random printable
/// filler, then `"ext"` at bytes 17..20 iff `extensions_enabled`.
pub fn generate(extensions_enabled: bool) -> [u8; 20] {
    let mut id = [0u8; 20];
    id[..FINGERPRINT.len()].copy_from_slice(FINGERPRINT);
    fill_random(&mut id[FINGERPRINT.len()..]);
    if extensions_enabled {
        apply_ext_suffix(&mut id);
    }
    id
}

/// Re-randomizes bytes 17..20 from the filler alphabet, clearing the
/// `"ext"` suffix. Leaves the fingerprint and the rest of the filler intact.
pub fn disable_extensions(peer_id: &mut [u8; 20]) {
    let mut rng = rand::thread_rng();
    for byte in &mut peer_id[EXT_SUFFIX_START..] {
        *byte = FILLER_ALPHABET[rng.gen_range(0..FILLER_ALPHABET.len())];
    }
}

/// Overwrites bytes 17..20 with `"ext"`.
pub fn enable_extensions(peer_id: &mut [u8; 20]) {
    apply_ext_suffix(peer_id);
}

/// True iff bytes 17..20 are exactly `"ext"`.
pub fn extensions_enabled(peer_id: &[u8; 20]) -> bool {
    &peer_id[EXT_SUFFIX_START..] == EXT_SUFFIX
}

fn apply_ext_suffix(peer_id: &mut [u8; 20]) {
    peer_id[EXT_SUFFIX_START..].copy_from_slice(EXT_SUFFIX);
}

fn fill_random(slice: &mut [u8]) {
    let mut rng = rand::thread_rng();
    for byte in slice.iter_mut() {
        *byte = FILLER_ALPHABET[rng.gen_range(0..FILLER_ALPHABET.len())];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_always_intact() {
        let id = generate(true);
        assert_eq!(&id[..FINGERPRINT.len()], FINGERPRINT);
        let id = generate(false);
        assert_eq!(&id[..FINGERPRINT.len()], FINGERPRINT);
    }

    #[test]
    fn ext_suffix_present_iff_extensions_enabled() {
        let with_ext = generate(true);
        assert!(extensions_enabled(&with_ext));

        let without_ext = generate(false);
        assert!(!extensions_enabled(&without_ext));
    }

    #[test]
    fn disable_extensions_clears_ext_suffix() {
        let mut id = generate(true);
        assert!(extensions_enabled(&id));
        disable_extensions(&mut id);
        assert!(!extensions_enabled(&id));
        assert_eq!(&id[..FINGERPRINT.len()], FINGERPRINT);
    }

    #[test]
    fn enable_extensions_sets_ext_suffix() {
        let mut id = generate(false);
        assert!(!extensions_enabled(&id));
        enable_extensions(&mut id);
        assert!(extensions_enabled(&id));
    }
}
