pub const PORT: u16 = 53;
pub const MAX_UDP_PACKET_SIZE: usize = 512;
pub const EDNS_VERSION: u8 = 0;
pub const EDNS_UDP_SIZE: u16 = 4096;
pub const SERVER_COOKIE: [u8; 8] = [0xde, 0xad, 0xbe, 0xef, 0xca, 0xfe, 0xba, 0xbe];

/// Maximum number of unsigned messages RFC 2845 §4.4 allows between two
/// TSIG-signed messages in a multi-message exchange (AXFR/IXFR response
/// streams).
pub const MAX_UNSIGNED_TSIG_MESSAGES: u32 = 99;

/// Default fallback retry window before a failed zone transfer is retried,
/// used when a zone's SOA RR doesn't carry a usable `retry` value.
pub const DEFAULT_XFR_RETRY_SECS: u64 = 60;
