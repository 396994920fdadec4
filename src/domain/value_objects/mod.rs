//! Value Objects for the order engine

use serde::{Deserialize, Serialize};
use std::fmt;

const MOBILE_PREFIXES: [&str; 7] = ["013", "014", "015", "016", "017", "018", "019"];

/// Bangladeshi mobile number, normalized to the local 11 digit form (`01XXXXXXXXX`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Accepts `01XXXXXXXXX`, `8801XXXXXXXXX` and `+8801XXXXXXXXX`.
    pub fn parse(value: &str) -> Result<Self, PhoneError> {
        let value = value.trim();
        let local = match value.len() {
            11 => value,
            13 if value.starts_with("88") => &value[2..],
            14 if value.starts_with("+88") => &value[3..],
            13 | 14 => return Err(PhoneError::CountryCode),
            _ => return Err(PhoneError::Length),
        };
        if !local.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PhoneError::NotNumeric);
        }
        if !MOBILE_PREFIXES.iter().any(|prefix| local.starts_with(prefix)) {
            return Err(PhoneError::UnknownOperator);
        }
        Ok(Self(local.to_string()))
    }

    pub fn as_str(&self) -> &str { &self.0 }

    /// Trailing four digits, used as the order id suffix.
    pub fn last_four(&self) -> &str { &self.0[self.0.len() - 4..] }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<String> for PhoneNumber {
    type Error = PhoneError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::parse(&value) }
}

impl From<PhoneNumber> for String {
    fn from(phone: PhoneNumber) -> Self { phone.0 }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum PhoneError { Length, CountryCode, NotNumeric, UnknownOperator }
impl std::error::Error for PhoneError {}
impl fmt::Display for PhoneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Length => write!(f, "phone number must be 11, 13 or 14 characters"),
            Self::CountryCode => write!(f, "phone number has an unexpected country code"),
            Self::NotNumeric => write!(f, "phone number must contain only digits"),
            Self::UnknownOperator => write!(f, "phone number has an unknown mobile prefix"),
        }
    }
}

/// Quantity value object. Never negative.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quantity(u32);

impl Quantity {
    pub const ZERO: Quantity = Quantity(0);

    pub fn new(value: u32) -> Self { Self(value) }

    /// Clamps a client supplied count into range; negatives become zero.
    pub fn clamped(value: i64) -> Self { Self(value.clamp(0, i64::from(u32::MAX)) as u32) }

    pub fn value(&self) -> u32 { self.0 }
    pub fn is_zero(&self) -> bool { self.0 == 0 }
    pub fn min(self, other: Quantity) -> Quantity { Self(self.0.min(other.0)) }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}
