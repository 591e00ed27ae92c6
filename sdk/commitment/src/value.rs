//! Shielded values.
//!
//! Fungible amounts are 128-bit and travel as `0x` + 32 hex digits; NFT token
//! ids are 256-bit and travel as `0x` + 64 hex digits.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::str::FromStr;

use crate::error::ValueError;
use crate::hexfmt::checked_digits;

/// Fungible amount held in a commitment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FtValue(pub u128);

impl FtValue {
    pub const ZERO: FtValue = FtValue(0);
    pub const HEX_DIGITS: usize = 32;

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: FtValue) -> Result<FtValue, ValueError> {
        self.0
            .checked_add(other.0)
            .map(FtValue)
            .ok_or(ValueError::Overflow)
    }

    pub fn checked_sub(self, other: FtValue) -> Result<FtValue, ValueError> {
        self.0
            .checked_sub(other.0)
            .map(FtValue)
            .ok_or(ValueError::Underflow {
                minuend: self.0,
                subtrahend: other.0,
            })
    }

    /// Sum with overflow detection.
    pub fn total<'a>(values: impl IntoIterator<Item = &'a FtValue>) -> Result<FtValue, ValueError> {
        values
            .into_iter()
            .try_fold(FtValue::ZERO, |acc, v| acc.checked_add(*v))
    }

    pub fn to_be_bytes(&self) -> [u8; 16] {
        self.0.to_be_bytes()
    }

    pub fn to_hex(&self) -> String {
        format!("0x{:032x}", self.0)
    }
}

impl From<u128> for FtValue {
    fn from(v: u128) -> Self {
        FtValue(v)
    }
}

impl FromStr for FtValue {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = checked_digits(s, Self::HEX_DIGITS)?;
        u128::from_str_radix(digits, 16)
            .map(FtValue)
            .map_err(|_| ValueError::MalformedHex(s.to_string()))
    }
}

impl fmt::Display for FtValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Sum for FtValue {
    /// Saturates; callers that must detect overflow use [`FtValue::total`].
    fn sum<I: Iterator<Item = FtValue>>(iter: I) -> Self {
        FtValue(iter.fold(0u128, |acc, v| acc.saturating_add(v.0)))
    }
}

impl Serialize for FtValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for FtValue {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

fixed_hex!(
    /// 256-bit NFT token id.
    TokenId,
    32
);

/// Which ledger partition a commitment lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Fungible,
    NonFungible,
}

impl AssetClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetClass::Fungible => "ft",
            AssetClass::NonFungible => "nft",
        }
    }
}

/// The hidden part of a commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum AssetValue {
    Fungible {
        value: FtValue,
    },
    NonFungible {
        token_id: TokenId,
        #[serde(default)]
        token_uri: String,
    },
}

impl AssetValue {
    pub fn ft(value: impl Into<FtValue>) -> Self {
        AssetValue::Fungible {
            value: value.into(),
        }
    }

    pub fn nft(token_id: TokenId, token_uri: impl Into<String>) -> Self {
        AssetValue::NonFungible {
            token_id,
            token_uri: token_uri.into(),
        }
    }

    pub fn class(&self) -> AssetClass {
        match self {
            AssetValue::Fungible { .. } => AssetClass::Fungible,
            AssetValue::NonFungible { .. } => AssetClass::NonFungible,
        }
    }

    pub fn as_ft(&self) -> Option<FtValue> {
        match self {
            AssetValue::Fungible { value } => Some(*value),
            AssetValue::NonFungible { .. } => None,
        }
    }

    pub fn token_id(&self) -> Option<&TokenId> {
        match self {
            AssetValue::Fungible { .. } => None,
            AssetValue::NonFungible { token_id, .. } => Some(token_id),
        }
    }

    /// Zero-valued fungible outputs are padding and never notified.
    pub fn is_zero(&self) -> bool {
        matches!(self, AssetValue::Fungible { value } if value.is_zero())
    }

    /// Bytes hashed into the commitment.
    pub fn commitment_bytes(&self) -> Vec<u8> {
        match self {
            AssetValue::Fungible { value } => value.to_be_bytes().to_vec(),
            AssetValue::NonFungible { token_id, .. } => token_id.as_bytes().to_vec(),
        }
    }
}
