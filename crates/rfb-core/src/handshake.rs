//! RFB handshake messages.
//!
//! # Message Flow
//!
//! ```text
//!   server                                  client
//!     |  ProtocolVersion "RFB 003.008\n" (12) |
//!     |-------------------------------------->|
//!     |  ProtocolVersion (12)                 |
//!     |<--------------------------------------|
//!     |  count (1) + security types (count)   |
//!     |-------------------------------------->|
//!     |  selected type (1)                    |
//!     |<--------------------------------------|
//!     |  challenge (16)            [type 2]   |
//!     |-------------------------------------->|
//!     |  response (16)             [type 2]   |
//!     |<--------------------------------------|
//!     |  SecurityResult u32 BE (4)            |
//!     |-------------------------------------->|
//! ```

use crate::{RfbError, SECURITY_RESULT_SIZE, VERSION_BANNER_SIZE};

const BANNER_PREFIX: &[u8; 4] = b"RFB ";

/// Protocol version carried in the 12-byte banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
}

impl ProtocolVersion {
    pub const V3_3: Self = Self::new(3, 3);
    pub const V3_7: Self = Self::new(3, 7);
    pub const V3_8: Self = Self::new(3, 8);

    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }

    /// Parse a banner of the exact form `"RFB xxx.yyy\n"`.
    pub fn parse(buf: &[u8]) -> Result<Self, RfbError> {
        if buf.len() < VERSION_BANNER_SIZE {
            return Err(RfbError::TooShort(buf.len(), VERSION_BANNER_SIZE));
        }
        let mut banner = [0u8; VERSION_BANNER_SIZE];
        banner.copy_from_slice(&buf[..VERSION_BANNER_SIZE]);

        if &banner[0..4] != BANNER_PREFIX || banner[7] != b'.' || banner[11] != b'\n' {
            return Err(RfbError::BadBanner(banner));
        }

        let major = parse_digits(&banner[4..7]).ok_or(RfbError::BadBanner(banner))?;
        let minor = parse_digits(&banner[8..11]).ok_or(RfbError::BadBanner(banner))?;
        Ok(Self { major, minor })
    }

    /// Encode as a 12-byte banner. Fields above 999 are clamped.
    pub fn encode(&self) -> [u8; VERSION_BANNER_SIZE] {
        let mut out = [0u8; VERSION_BANNER_SIZE];
        out[0..4].copy_from_slice(BANNER_PREFIX);
        write_digits(&mut out[4..7], self.major.min(999));
        out[7] = b'.';
        write_digits(&mut out[8..11], self.minor.min(999));
        out[11] = b'\n';
        out
    }

    /// Versions from 3.7 on negotiate security through a server-sent list
    /// and a one-byte client selection. 3.3 lets the server dictate a u32.
    pub fn supports_security_list(&self) -> bool {
        *self >= Self::V3_7
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

fn parse_digits(field: &[u8]) -> Option<u16> {
    field.iter().try_fold(0u16, |acc, b| {
        if b.is_ascii_digit() {
            Some(acc * 10 + u16::from(b - b'0'))
        } else {
            None
        }
    })
}

fn write_digits(out: &mut [u8], mut value: u16) {
    for slot in out.iter_mut().rev() {
        *slot = b'0' + (value % 10) as u8;
        value /= 10;
    }
}

/// Security type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityType {
    Invalid,
    None,
    /// DES challenge/response ("VNC Authentication").
    VncAuth,
    Other(u8),
}

impl SecurityType {
    pub fn code(self) -> u8 {
        match self {
            Self::Invalid => 0,
            Self::None => 1,
            Self::VncAuth => 2,
            Self::Other(code) => code,
        }
    }
}

impl From<u8> for SecurityType {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Invalid,
            1 => Self::None,
            2 => Self::VncAuth,
            other => Self::Other(other),
        }
    }
}

/// The list of security types a server offers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityTypes(Vec<SecurityType>);

impl SecurityTypes {
    /// A list offering only VNC authentication.
    pub fn vnc_auth_only() -> Self {
        Self(vec![SecurityType::VncAuth])
    }

    pub fn contains(&self, ty: SecurityType) -> bool {
        self.0.contains(&ty)
    }

    pub fn as_slice(&self) -> &[SecurityType] {
        &self.0
    }

    /// Encode as `count` followed by one code per type. At most 255 types
    /// are written.
    pub fn encode(&self) -> Vec<u8> {
        let count = self.0.len().min(u8::MAX as usize);
        let mut out = Vec::with_capacity(1 + count);
        out.push(count as u8);
        out.extend(self.0.iter().take(count).map(|ty| ty.code()));
        out
    }

    /// Decode the body that follows a count byte. A count of zero is how a
    /// server signals that the connection failed.
    pub fn decode(count: u8, body: &[u8]) -> Result<Self, RfbError> {
        if count == 0 {
            return Err(RfbError::NoSecurityTypes);
        }
        let count = count as usize;
        if body.len() < count {
            return Err(RfbError::TooShort(body.len(), count));
        }
        Ok(Self(body[..count].iter().copied().map(SecurityType::from).collect()))
    }
}

/// SecurityResult message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityResult {
    Ok,
    Failed(u32),
}

impl SecurityResult {
    pub fn failed() -> Self {
        Self::Failed(crate::SECURITY_RESULT_FAILED)
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    pub fn encode(&self) -> [u8; SECURITY_RESULT_SIZE] {
        let value = match self {
            Self::Ok => crate::SECURITY_RESULT_OK,
            Self::Failed(code) => *code,
        };
        value.to_be_bytes()
    }

    pub fn decode(buf: &[u8]) -> Result<Self, RfbError> {
        if buf.len() < SECURITY_RESULT_SIZE {
            return Err(RfbError::TooShort(buf.len(), SECURITY_RESULT_SIZE));
        }
        let value = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        Ok(match value {
            crate::SECURITY_RESULT_OK => Self::Ok,
            code => Self::Failed(code),
        })
    }
}
