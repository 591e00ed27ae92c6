//! Fixed-width big-endian hex, the wire format for every key, salt, hash and
//! value crossing a service boundary.

use crate::error::ValueError;

pub(crate) fn strip_prefix(input: &str) -> &str {
    input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input)
}

/// Validate hex digits (with or without `0x`) no wider than `max_digits`.
pub(crate) fn checked_digits(input: &str, max_digits: usize) -> Result<&str, ValueError> {
    let digits = strip_prefix(input);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ValueError::MalformedHex(input.to_string()));
    }
    if digits.len() > max_digits {
        return Err(ValueError::TooWide {
            input: input.to_string(),
            max_digits,
        });
    }
    Ok(digits)
}

/// Parse into an `N`-byte buffer, left-padding short input with zeros.
pub(crate) fn parse_padded<const N: usize>(input: &str) -> Result<[u8; N], ValueError> {
    let digits = checked_digits(input, N * 2)?;
    let padded = format!("{:0>width$}", digits, width = N * 2);

    let mut out = [0u8; N];
    hex::decode_to_slice(&padded, &mut out)
        .map_err(|_| ValueError::MalformedHex(input.to_string()))?;
    Ok(out)
}

/// Declares a fixed-size byte newtype that travels as `0x`-prefixed hex.
macro_rules! fixed_hex {
    (@common $name:ident, $len:expr) => {
        impl $name {
            pub const LEN: usize = $len;

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                format!("0x{}", hex::encode(self.0))
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::error::ValueError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $crate::hexfmt::parse_padded::<$len>(s).map(Self)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = <String as serde::Deserialize>::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };

    // Secrets never print their bytes.
    (secret $(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq)]
        pub struct $name(pub [u8; $len]);

        fixed_hex!(@common $name, $len);

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}(<redacted>)", stringify!($name))
            }
        }
    };

    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub [u8; $len]);

        fixed_hex!(@common $name, $len);

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.to_hex())
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex())
            }
        }
    };
}
