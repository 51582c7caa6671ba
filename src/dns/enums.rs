use std::fmt;

use super::ParseError;

/// RR types the zone core understands structurally. Anything else round-trips
/// as opaque rdata (see `RdataRecord` in `zone::rrset`) — scope matches
/// spec.md's Non-goal on DNSSEC signing and full RR coverage.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DNSResourceType {
    #[default]
    Unknown,
    A,
    NS,
    CNAME,
    SOA,
    PTR,
    MX,
    TXT,
    AAAA,
    SRV,
    CAA,
    DS,
    DNSKEY,
    RRSIG,
    NSEC,
    NSEC3,
    NSEC3PARAM,
    OPT,
    TSIG,
    AXFR,
    IXFR,
    ANY,
}

impl DNSResourceType {
    pub fn to_u16(self) -> u16 {
        match self {
            DNSResourceType::Unknown => 0,
            DNSResourceType::A => 1,
            DNSResourceType::NS => 2,
            DNSResourceType::CNAME => 5,
            DNSResourceType::SOA => 6,
            DNSResourceType::PTR => 12,
            DNSResourceType::MX => 15,
            DNSResourceType::TXT => 16,
            DNSResourceType::AAAA => 28,
            DNSResourceType::SRV => 33,
            DNSResourceType::NSEC => 47,
            DNSResourceType::DS => 43,
            DNSResourceType::RRSIG => 46,
            DNSResourceType::DNSKEY => 48,
            DNSResourceType::NSEC3 => 50,
            DNSResourceType::NSEC3PARAM => 51,
            DNSResourceType::TSIG => 250,
            DNSResourceType::IXFR => 251,
            DNSResourceType::AXFR => 252,
            DNSResourceType::ANY => 255,
            DNSResourceType::CAA => 257,
            DNSResourceType::OPT => 41,
        }
    }

    pub fn from_u16(v: u16) -> Self {
        match v {
            1 => DNSResourceType::A,
            2 => DNSResourceType::NS,
            5 => DNSResourceType::CNAME,
            6 => DNSResourceType::SOA,
            12 => DNSResourceType::PTR,
            15 => DNSResourceType::MX,
            16 => DNSResourceType::TXT,
            28 => DNSResourceType::AAAA,
            33 => DNSResourceType::SRV,
            41 => DNSResourceType::OPT,
            43 => DNSResourceType::DS,
            46 => DNSResourceType::RRSIG,
            47 => DNSResourceType::NSEC,
            48 => DNSResourceType::DNSKEY,
            50 => DNSResourceType::NSEC3,
            51 => DNSResourceType::NSEC3PARAM,
            250 => DNSResourceType::TSIG,
            251 => DNSResourceType::IXFR,
            252 => DNSResourceType::AXFR,
            255 => DNSResourceType::ANY,
            257 => DNSResourceType::CAA,
            _ => DNSResourceType::Unknown,
        }
    }

    /// Types whose rdata embeds a dname that must be located during
    /// `adjust()` for name-compression and table purposes (spec.md §9 note ii).
    pub fn embeds_dname(self) -> bool {
        matches!(
            self,
            DNSResourceType::NS
                | DNSResourceType::CNAME
                | DNSResourceType::PTR
                | DNSResourceType::SOA
                | DNSResourceType::MX
                | DNSResourceType::SRV
        )
    }
}

impl fmt::Display for DNSResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DNSResourceClass {
    #[default]
    IN,
    CH,
    ANY,
    Unknown(u16),
}

impl DNSResourceClass {
    pub fn to_u16(self) -> u16 {
        match self {
            DNSResourceClass::IN => 1,
            DNSResourceClass::CH => 3,
            DNSResourceClass::ANY => 255,
            DNSResourceClass::Unknown(v) => v,
        }
    }

    pub fn from_u16(v: u16) -> Self {
        match v {
            1 => DNSResourceClass::IN,
            3 => DNSResourceClass::CH,
            255 => DNSResourceClass::ANY,
            other => DNSResourceClass::Unknown(other),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ResponseCode {
    #[default]
    NoError,
    FormErr,
    ServFail,
    NxDomain,
    NotImp,
    Refused,
    NotAuth,
    NotZone,
}

impl ResponseCode {
    pub fn to_u8(self) -> u8 {
        match self {
            ResponseCode::NoError => 0,
            ResponseCode::FormErr => 1,
            ResponseCode::ServFail => 2,
            ResponseCode::NxDomain => 3,
            ResponseCode::NotImp => 4,
            ResponseCode::Refused => 5,
            ResponseCode::NotAuth => 9,
            ResponseCode::NotZone => 10,
        }
    }

    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => ResponseCode::NoError,
            1 => ResponseCode::FormErr,
            2 => ResponseCode::ServFail,
            3 => ResponseCode::NxDomain,
            4 => ResponseCode::NotImp,
            5 => ResponseCode::Refused,
            9 => ResponseCode::NotAuth,
            10 => ResponseCode::NotZone,
            _ => ResponseCode::ServFail,
        }
    }
}

/// RFC 2845 §4.5 extended RCODEs carried in the TSIG RR, not the header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TsigErrorCode {
    NoError,
    BadSig,
    BadKey,
    BadTime,
}

impl TsigErrorCode {
    pub fn to_u16(self) -> u16 {
        match self {
            TsigErrorCode::NoError => 0,
            TsigErrorCode::BadSig => 16,
            TsigErrorCode::BadKey => 17,
            TsigErrorCode::BadTime => 18,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Opcode {
    #[default]
    Query,
    Notify,
    Update,
}

impl Opcode {
    pub fn to_u8(self) -> u8 {
        match self {
            Opcode::Query => 0,
            Opcode::Notify => 4,
            Opcode::Update => 5,
        }
    }

    pub fn from_u8(v: u8) -> Result<Self, ParseError> {
        match v {
            0 => Ok(Opcode::Query),
            4 => Ok(Opcode::Notify),
            5 => Ok(Opcode::Update),
            _ => Err(ParseError::InvalidLabel),
        }
    }
}
