use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ring::hmac;

use crate::error::CoreError;

/// TSIG MAC algorithm. Grounded on the dynamic-update TSIG verifier this
/// crate already carried; extended here into a streaming multi-message
/// context for XFR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TsigAlgorithm {
    /// Legacy algorithm kept for interoperability with older secondaries;
    /// not recommended for new keys.
    HmacSha1,
    HmacSha256,
    HmacSha384,
    HmacSha512,
}

impl TsigAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            TsigAlgorithm::HmacSha1 => "hmac-sha1",
            TsigAlgorithm::HmacSha256 => "hmac-sha256",
            TsigAlgorithm::HmacSha384 => "hmac-sha384",
            TsigAlgorithm::HmacSha512 => "hmac-sha512",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim_end_matches('.').to_ascii_lowercase().as_str() {
            "hmac-sha1" => Some(TsigAlgorithm::HmacSha1),
            "hmac-sha256" => Some(TsigAlgorithm::HmacSha256),
            "hmac-sha384" => Some(TsigAlgorithm::HmacSha384),
            "hmac-sha512" => Some(TsigAlgorithm::HmacSha512),
            _ => None,
        }
    }

    fn hmac_algorithm(self) -> hmac::Algorithm {
        match self {
            TsigAlgorithm::HmacSha1 => hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY,
            TsigAlgorithm::HmacSha256 => hmac::HMAC_SHA256,
            TsigAlgorithm::HmacSha384 => hmac::HMAC_SHA384,
            TsigAlgorithm::HmacSha512 => hmac::HMAC_SHA512,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TsigKey {
    pub name: String,
    pub algorithm: TsigAlgorithm,
    secret: Vec<u8>,
}

impl TsigKey {
    pub fn new(name: &str, algorithm: TsigAlgorithm, base64_secret: &str) -> Result<Self, CoreError> {
        let secret = BASE64
            .decode(base64_secret)
            .map_err(|e| CoreError::Crypto(e.to_string()))?;
        Ok(TsigKey {
            name: name.to_ascii_lowercase(),
            algorithm,
            secret,
        })
    }

    fn hmac_key(&self) -> hmac::Key {
        hmac::Key::new(self.algorithm.hmac_algorithm(), &self.secret)
    }
}

/// One RR's worth of parsed TSIG rdata (RFC 2845 §2.3).
#[derive(Debug, Clone)]
pub struct TsigRecord {
    pub key_name: String,
    pub algorithm_name: String,
    pub time_signed: u64,
    pub fudge: u16,
    pub mac: Vec<u8>,
    pub original_id: u16,
    pub error: u16,
}

impl TsigRecord {
    /// Parses a TSIG RR's RDATA (RFC 2845 §2.3). `key_name` is the RR's
    /// owner name, carried separately since it is not part of the RDATA
    /// itself.
    pub fn parse(key_name: &str, rdata: &[u8]) -> Result<Self, CoreError> {
        let (algorithm_name, mut pos) =
            read_uncompressed_name(rdata, 0).ok_or(CoreError::Malformed("TSIG algorithm name".into()))?;

        let need = |pos: usize, n: usize| -> Result<(), CoreError> {
            if rdata.len() < pos + n {
                Err(CoreError::NotEnoughData)
            } else {
                Ok(())
            }
        };

        need(pos, 6)?;
        let time_signed = ((rdata[pos] as u64) << 40)
            | ((rdata[pos + 1] as u64) << 32)
            | ((rdata[pos + 2] as u64) << 24)
            | ((rdata[pos + 3] as u64) << 16)
            | ((rdata[pos + 4] as u64) << 8)
            | (rdata[pos + 5] as u64);
        pos += 6;

        need(pos, 2)?;
        let fudge = u16::from_be_bytes([rdata[pos], rdata[pos + 1]]);
        pos += 2;

        need(pos, 2)?;
        let mac_size = u16::from_be_bytes([rdata[pos], rdata[pos + 1]]) as usize;
        pos += 2;

        need(pos, mac_size)?;
        let mac = rdata[pos..pos + mac_size].to_vec();
        pos += mac_size;

        need(pos, 2)?;
        let original_id = u16::from_be_bytes([rdata[pos], rdata[pos + 1]]);
        pos += 2;

        need(pos, 2)?;
        let error = u16::from_be_bytes([rdata[pos], rdata[pos + 1]]);

        Ok(TsigRecord {
            key_name: key_name.trim_end_matches('.').to_ascii_lowercase(),
            algorithm_name: algorithm_name.to_text().trim_end_matches('.').to_string(),
            time_signed,
            fudge,
            mac,
            original_id,
            error,
        })
    }

    /// Encodes this record's RDATA for attaching to an outgoing message
    /// (RFC 2845 §2.3) — the write-side counterpart of `parse`.
    pub fn to_rdata(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&crate::name::Name::parse(&self.algorithm_name).to_wire());
        let t = self.time_signed;
        out.extend_from_slice(&[
            ((t >> 40) & 0xff) as u8,
            ((t >> 32) & 0xff) as u8,
            ((t >> 24) & 0xff) as u8,
            ((t >> 16) & 0xff) as u8,
            ((t >> 8) & 0xff) as u8,
            (t & 0xff) as u8,
        ]);
        out.extend_from_slice(&self.fudge.to_be_bytes());
        out.extend_from_slice(&(self.mac.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.mac);
        out.extend_from_slice(&self.original_id.to_be_bytes());
        out.extend_from_slice(&self.error.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes()); // Other Len
        out
    }
}

/// Builds the "TSIG Variables" block fed into the MAC alongside the message
/// bytes (RFC 2845 §3.4.2): the TSIG RR's owner/class/TTL followed by its
/// algorithm, timing and error fields, omitting the MAC itself.
pub fn tsig_variables(record: &TsigRecord) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&crate::name::Name::parse(&record.key_name).to_wire());
    out.extend_from_slice(&255u16.to_be_bytes()); // CLASS ANY
    out.extend_from_slice(&0u32.to_be_bytes()); // TTL 0
    out.extend_from_slice(&crate::name::Name::parse(&record.algorithm_name).to_wire());
    let t = record.time_signed;
    out.extend_from_slice(&[
        ((t >> 40) & 0xff) as u8,
        ((t >> 32) & 0xff) as u8,
        ((t >> 24) & 0xff) as u8,
        ((t >> 16) & 0xff) as u8,
        ((t >> 8) & 0xff) as u8,
        (t & 0xff) as u8,
    ]);
    out.extend_from_slice(&record.fudge.to_be_bytes());
    out.extend_from_slice(&record.error.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes()); // Other Len (Other Data unused outside BADTIME)
    out
}

/// Reads one wire-format dname (length-prefixed labels, no compression
/// pointers — TSIG's algorithm name is never compressed per RFC 2845 §2.3)
/// starting at `offset`. Mirrors `zone::contents::read_wire_name_at`.
fn read_uncompressed_name(buf: &[u8], offset: usize) -> Option<(crate::name::Name, usize)> {
    let mut labels = Vec::new();
    let mut pos = offset;
    loop {
        let len = *buf.get(pos)? as usize;
        if len == 0 {
            pos += 1;
            break;
        }
        if len > 63 {
            return None;
        }
        let start = pos + 1;
        let end = start + len;
        labels.push(std::str::from_utf8(buf.get(start..end)?).ok()?.to_string());
        pos = end;
    }
    let name = if labels.is_empty() {
        crate::name::Name::root()
    } else {
        crate::name::Name::parse(&format!("{}.", labels.join(".")))
    };
    Some((name, pos))
}

/// Default acceptable clock skew between signer and verifier (RFC 2845 §4.6
/// recommends an operator-tunable fudge; 300s matches common deployments).
pub const DEFAULT_FUDGE: u16 = 300;

/// Streaming verifier/signer across an entire XFR transaction. Per RFC 2845
/// §4.4, not every message in a multi-message sequence needs to carry a
/// TSIG RR — a responder may batch them and only sign every 100th message
/// plus the last — but each message that *does* carry one must verify
/// against a digest that chains in the previous MAC, so verification state
/// must persist across messages rather than restart per-packet.
pub struct TsigContext {
    key: TsigKey,
    prior_mac: Option<Vec<u8>>,
    messages_since_signed: u32,
}

impl TsigContext {
    pub fn new(key: TsigKey) -> Self {
        TsigContext {
            key,
            prior_mac: None,
            messages_since_signed: 0,
        }
    }

    pub fn key_name(&self) -> &str {
        &self.key.name
    }

    pub fn algorithm_name(&self) -> &'static str {
        self.key.algorithm.name()
    }

    /// RFC 2845 §4.4: unsigned messages may not run more than 100 deep
    /// between signed ones, and the final message of a sequence must always
    /// carry a TSIG RR.
    pub fn must_sign_next(&self) -> bool {
        self.messages_since_signed >= 99
    }

    /// Verifies `message_minus_tsig` (the wire message with the TSIG RR and
    /// the adjusted ARCOUNT removed) against `record`. On success, chains
    /// `record.mac` in as the prior MAC for the next signed message in this
    /// transaction and resets the unsigned-message counter.
    pub fn verify(
        &mut self,
        message_minus_tsig: &[u8],
        tsig_wire_rdata_minus_mac: &[u8],
        record: &TsigRecord,
        now_unix: u64,
    ) -> Result<(), CoreError> {
        if record.key_name != self.key.name {
            return Err(CoreError::TsigBadKey);
        }
        if record.algorithm_name != self.key.algorithm.name() {
            return Err(CoreError::TsigBadKey);
        }
        let skew = now_unix.abs_diff(record.time_signed);
        if skew > record.fudge as u64 {
            return Err(CoreError::TsigBadTime);
        }

        let expected = self.compute_mac(message_minus_tsig, tsig_wire_rdata_minus_mac);
        if !constant_time_eq(&expected, &record.mac) {
            return Err(CoreError::TsigBadSig);
        }

        self.prior_mac = Some(record.mac.clone());
        self.messages_since_signed = 0;
        Ok(())
    }

    /// Marks a message as having been sent unsigned (no TSIG RR attached);
    /// only legal for messages 1..99 of a sequence per RFC 2845 §4.4.
    pub fn skip_unsigned(&mut self) {
        self.messages_since_signed += 1;
    }

    /// Computes the MAC to attach to the next outgoing signed message.
    pub fn sign(&mut self, message_minus_tsig: &[u8], tsig_wire_rdata_minus_mac: &[u8]) -> Vec<u8> {
        let mac = self.compute_mac(message_minus_tsig, tsig_wire_rdata_minus_mac);
        self.prior_mac = Some(mac.clone());
        self.messages_since_signed = 0;
        mac
    }

    /// Digest input per RFC 2845 §4.4 (TSIG on answers): for the first
    /// signed message in a sequence, `DNS_MESSAGE || TSIG_VARIABLES`; for
    /// every subsequent signed message, `prior_MAC_length_prefixed ||
    /// DNS_MESSAGE || TSIG_VARIABLES`, chaining the previous signature in.
    fn compute_mac(&self, message_minus_tsig: &[u8], tsig_wire_rdata_minus_mac: &[u8]) -> Vec<u8> {
        let mut ctx = hmac::Context::with_key(&self.key.hmac_key());
        if let Some(prior) = &self.prior_mac {
            ctx.update(&(prior.len() as u16).to_be_bytes());
            ctx.update(prior);
        }
        ctx.update(message_minus_tsig);
        ctx.update(tsig_wire_rdata_minus_mac);
        ctx.sign().as_ref().to_vec()
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> TsigKey {
        TsigKey::new(
            "xfr-key.",
            TsigAlgorithm::HmacSha256,
            &BASE64.encode(b"0123456789abcdef0123456789abcdef"),
        )
        .unwrap()
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let mut signer = TsigContext::new(test_key());
        let mut verifier = TsigContext::new(test_key());

        let message = b"fake dns message bytes";
        let variables = b"fake tsig variables";
        let mac = signer.sign(message, variables);

        let record = TsigRecord {
            key_name: "xfr-key.".to_string(),
            algorithm_name: "hmac-sha256".to_string(),
            time_signed: unix_now(),
            fudge: DEFAULT_FUDGE,
            mac,
            original_id: 1,
            error: 0,
        };

        verifier
            .verify(message, variables, &record, unix_now())
            .unwrap();
    }

    #[test]
    fn tampered_mac_is_rejected() {
        let mut verifier = TsigContext::new(test_key());
        let record = TsigRecord {
            key_name: "xfr-key.".to_string(),
            algorithm_name: "hmac-sha256".to_string(),
            time_signed: unix_now(),
            fudge: DEFAULT_FUDGE,
            mac: vec![0u8; 32],
            original_id: 1,
            error: 0,
        };
        let err = verifier
            .verify(b"message", b"vars", &record, unix_now())
            .unwrap_err();
        assert!(matches!(err, CoreError::TsigBadSig));
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let mut verifier = TsigContext::new(test_key());
        let record = TsigRecord {
            key_name: "xfr-key.".to_string(),
            algorithm_name: "hmac-sha256".to_string(),
            time_signed: 0,
            fudge: 300,
            mac: vec![0u8; 32],
            original_id: 1,
            error: 0,
        };
        let err = verifier
            .verify(b"message", b"vars", &record, unix_now())
            .unwrap_err();
        assert!(matches!(err, CoreError::TsigBadTime));
    }

    #[test]
    fn to_rdata_parses_back_into_the_same_record() {
        let record = TsigRecord {
            key_name: "xfr-key.".to_string(),
            algorithm_name: "hmac-sha256".to_string(),
            time_signed: 1_700_000_000,
            fudge: DEFAULT_FUDGE,
            mac: vec![1, 2, 3, 4],
            original_id: 42,
            error: 0,
        };
        let rdata = record.to_rdata();
        let parsed = TsigRecord::parse("xfr-key.", &rdata).unwrap();
        assert_eq!(parsed.algorithm_name, record.algorithm_name);
        assert_eq!(parsed.time_signed, record.time_signed);
        assert_eq!(parsed.fudge, record.fudge);
        assert_eq!(parsed.mac, record.mac);
        assert_eq!(parsed.original_id, record.original_id);
        assert_eq!(parsed.error, record.error);
    }

    #[test]
    fn hmac_sha1_round_trips() {
        let key = TsigKey::new(
            "legacy-key.",
            TsigAlgorithm::HmacSha1,
            &BASE64.encode(b"0123456789abcdef"),
        )
        .unwrap();
        let mut signer = TsigContext::new(key.clone());
        let mut verifier = TsigContext::new(key);
        let mac = signer.sign(b"message", b"vars");

        let record = TsigRecord {
            key_name: "legacy-key.".to_string(),
            algorithm_name: "hmac-sha1".to_string(),
            time_signed: unix_now(),
            fudge: DEFAULT_FUDGE,
            mac,
            original_id: 1,
            error: 0,
        };
        verifier.verify(b"message", b"vars", &record, unix_now()).unwrap();
    }

    #[test]
    fn chained_mac_requires_prior_signature() {
        let mut signer = TsigContext::new(test_key());
        let first_mac = signer.sign(b"msg1", b"vars1");
        let second_mac = signer.sign(b"msg2", b"vars2");
        assert_ne!(first_mac, second_mac);
    }
}
