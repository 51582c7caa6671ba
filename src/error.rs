use thiserror::Error;

use crate::dns::enums::{ResponseCode, TsigErrorCode};

pub type Result<T> = std::result::Result<T, CoreError>;

/// Flat error taxonomy for the zone core and XFR orchestrator.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    #[error("out of memory")]
    OutOfMemory,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("not enough data")]
    NotEnoughData,
    #[error("no space left in buffer")]
    NoSpace,
    #[error("malformed input: {0}")]
    Malformed(String),
    #[error("cryptographic error: {0}")]
    Crypto(String),
    #[error("zone has no NSEC3PARAM record")]
    NoNsec3Param,
    #[error("name is out of zone")]
    OutOfZone,
    #[error("duplicate entry: {0}")]
    Duplicate(String),
    #[error("hash computation failed")]
    HashFail,
    #[error("zone insert failed: {0}")]
    ZoneInsert(String),
    #[error("no such zone: {0}")]
    NoZone(String),
    #[error("node not found")]
    NoNode,
    #[error("zone {0} has no usable SOA record")]
    NoSoa(String),
    #[error("compression pointer target out of range")]
    DnamePtrTooLarge,
    #[error("payload exceeds transport limit")]
    PayloadTooLarge,
    #[error("checksum mismatch")]
    CrcFail,
    #[error("connection refused by {0}")]
    ConnectionRefused(String),
    #[error("TSIG key unknown")]
    TsigBadKey,
    #[error("TSIG signature verification failed")]
    TsigBadSig,
    #[error("TSIG time outside acceptable fudge window")]
    TsigBadTime,
    #[error("transfer refused")]
    XfrRefused,
    #[error("IXFR not available, falling back to AXFR")]
    NoIxfr,
    #[error("no transfer in progress")]
    NoXfr,
    #[error("zone already up to date")]
    UpToDate,
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Io(e.to_string())
    }
}

impl From<crate::dns::ParseError> for CoreError {
    fn from(e: crate::dns::ParseError) -> Self {
        CoreError::Malformed(e.to_string())
    }
}

/// Errors raised while loading and validating the daemon's TOML config file.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(String),
    #[error("failed to parse config file: {0}")]
    Parse(String),
    #[error("invalid bind address: {0}")]
    InvalidBindAddress(String),
    #[error("invalid master address: {0}")]
    InvalidMasterAddress(String),
    #[error("invalid base64 TSIG secret for key '{0}'")]
    InvalidTsigSecret(String),
    #[error("zone references unknown TSIG key '{0}'")]
    UnknownTsigKey(String),
    #[error("zone '{0}' declared more than once")]
    DuplicateZone(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e.to_string())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e.to_string())
    }
}

impl CoreError {
    /// Maps a core error onto the RCODE carried back to the querying peer.
    pub fn to_rcode(&self) -> ResponseCode {
        match self {
            CoreError::Malformed(_) | CoreError::NotEnoughData | CoreError::DnamePtrTooLarge => {
                ResponseCode::FormErr
            }
            CoreError::NoZone(_) | CoreError::NoNode => ResponseCode::NxDomain,
            CoreError::XfrRefused
            | CoreError::TsigBadKey
            | CoreError::TsigBadSig
            | CoreError::TsigBadTime => ResponseCode::Refused,
            CoreError::OutOfZone => ResponseCode::NotZone,
            _ => ResponseCode::ServFail,
        }
    }

    /// Maps TSIG-related core errors onto RFC 2845 §4.5 extended error codes.
    /// Returns `None` when the error has no TSIG error-code equivalent.
    pub fn to_tsig_error(&self) -> Option<TsigErrorCode> {
        match self {
            CoreError::TsigBadKey => Some(TsigErrorCode::BadKey),
            CoreError::TsigBadSig => Some(TsigErrorCode::BadSig),
            CoreError::TsigBadTime => Some(TsigErrorCode::BadTime),
            _ => None,
        }
    }
}
