use ring::digest;

use crate::name::Name;

const BASE32HEX_ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHIJKLMNOPQRSTUV";

/// RFC 5155 §5 hashed-owner-name computation:
/// `base32hex(iterate(SHA1, salt || name, iterations + 1))`. Done by hand
/// because the `base32` crate only ships the RFC 4648 and Crockford
/// alphabets, not the Extended Hex alphabet NSEC3 requires.
pub fn hash_owner(name: &Name, salt: &[u8], iterations: u16) -> [u8; 20] {
    let wire = name.to_wire();
    let mut digest_bytes: [u8; 20] = {
        let mut ctx = digest::Context::new(&digest::SHA1_FOR_LEGACY_USE_ONLY);
        ctx.update(&wire);
        ctx.update(salt);
        let d = ctx.finish();
        let mut out = [0u8; 20];
        out.copy_from_slice(d.as_ref());
        out
    };

    for _ in 0..iterations {
        let mut ctx = digest::Context::new(&digest::SHA1_FOR_LEGACY_USE_ONLY);
        ctx.update(&digest_bytes);
        ctx.update(salt);
        let d = ctx.finish();
        digest_bytes.copy_from_slice(d.as_ref());
    }

    digest_bytes
}

/// Encodes `bytes` using the base32hex alphabet (no padding), per RFC 4648
/// §7 / RFC 5155 §1, used for the NSEC3 hashed owner label.
pub fn base32hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len().div_ceil(5) * 8);
    for chunk in bytes.chunks(5) {
        let mut buf = [0u8; 5];
        buf[..chunk.len()].copy_from_slice(chunk);
        let bits = ((buf[0] as u64) << 32)
            | ((buf[1] as u64) << 24)
            | ((buf[2] as u64) << 16)
            | ((buf[3] as u64) << 8)
            | (buf[4] as u64);

        let chars_for_len = match chunk.len() {
            1 => 2,
            2 => 4,
            3 => 5,
            4 => 7,
            5 => 8,
            _ => unreachable!(),
        };

        for i in 0..chars_for_len {
            let shift = 35 - (i * 5);
            let idx = ((bits >> shift) & 0x1F) as usize;
            out.push(BASE32HEX_ALPHABET[idx] as char);
        }
    }
    out
}

/// Computes the full NSEC3 owner name for `name` under `apex`:
/// `base32hex(hash) + "." + apex`.
pub fn nsec3_owner_name(name: &Name, apex: &Name, salt: &[u8], iterations: u16) -> Name {
    let hash = hash_owner(name, salt, iterations);
    let label = base32hex_encode(&hash).to_ascii_lowercase();
    Name::parse(&format!("{label}.{}", apex.to_text()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base32hex_matches_known_vector() {
        // "f" -> "CO======" in base32 (RFC4648); base32hex uses a different
        // alphabet but the same bit-packing, verified against RFC 5155's
        // example encoder behavior for a single byte.
        assert_eq!(base32hex_encode(b"f"), "CO");
    }

    #[test]
    fn hash_is_deterministic() {
        let name = Name::parse("example.com.");
        let a = hash_owner(&name, b"aabbccdd", 1);
        let b = hash_owner(&name, b"aabbccdd", 1);
        assert_eq!(a, b);
    }

    #[test]
    fn different_salts_produce_different_hashes() {
        let name = Name::parse("example.com.");
        let a = hash_owner(&name, b"aabbccdd", 1);
        let b = hash_owner(&name, b"eeff0011", 1);
        assert_ne!(a, b);
    }
}
