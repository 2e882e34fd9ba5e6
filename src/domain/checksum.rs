//! Order number checksum validation

use std::str::FromStr;

use super::{DomainError, OrderNumber};

/// Luhn (mod 10) check over a string of ASCII digits.
pub fn luhn_valid(digits: &str) -> bool {
    if digits.is_empty() {
        return false;
    }

    let mut sum = 0u32;
    for (idx, byte) in digits.bytes().rev().enumerate() {
        if !byte.is_ascii_digit() {
            return false;
        }
        let mut digit = u32::from(byte - b'0');
        if idx % 2 == 1 {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
    }

    sum % 10 == 0
}

/// Which checksum incoming order numbers must satisfy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChecksumPolicy {
    #[default]
    Luhn,
    /// Accept any well-formed number
    Disabled,
}

impl ChecksumPolicy {
    pub fn validate(&self, number: &OrderNumber) -> Result<(), DomainError> {
        match self {
            ChecksumPolicy::Luhn if !luhn_valid(number.as_str()) => {
                Err(DomainError::InvalidChecksum(number.to_string()))
            }
            _ => Ok(()),
        }
    }
}

impl FromStr for ChecksumPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "luhn" => Ok(ChecksumPolicy::Luhn),
            "none" | "disabled" => Ok(ChecksumPolicy::Disabled),
            other => Err(format!("unknown checksum policy: {}", other)),
        }
    }
}
