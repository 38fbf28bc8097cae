//! String to field type conversion.
//!
//! | target                 | rule                                              |
//! |------------------------|---------------------------------------------------|
//! | `String`, `PathBuf`    | copied verbatim                                   |
//! | `bool`                 | true iff the value starts with `t` (any case)     |
//! | integers and floats    | `str::parse`, locale independent                  |
//! | `Duration`             | `300ms`, `5s`, `1h30m`, `1.5h` ...                |
//! | `Vec<u8>`              | raw bytes of the value                            |
//! | `Vec<String>`          | split on `,`, trimmed, empty entries dropped      |
//! | `Option<T>`            | `Some` of the inner conversion                    |
//! | `Json<T>`              | JSON object literal decoded with `serde_json`     |
//!
//! Other types implement [`FromParam`] themselves, or are bound with
//! `#[config(from_str)]` to reuse their `FromStr` impl.

use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::error::CoerceError;

/// Conversion from a raw flag, env or default string.
pub trait FromParam: Sized {
    /// Boolean fields may be given as a bare `--flag` and default to `false`.
    const IS_BOOL: bool = false;

    fn from_param(raw: &str) -> Result<Self, CoerceError>;
}

impl FromParam for String {
    fn from_param(raw: &str) -> Result<Self, CoerceError> {
        Ok(raw.to_string())
    }
}

impl FromParam for PathBuf {
    fn from_param(raw: &str) -> Result<Self, CoerceError> {
        Ok(PathBuf::from(raw))
    }
}

impl FromParam for bool {
    const IS_BOOL: bool = true;

    fn from_param(raw: &str) -> Result<Self, CoerceError> {
        Ok(raw
            .chars()
            .next()
            .is_some_and(|c| c.eq_ignore_ascii_case(&'t')))
    }
}

macro_rules! int_from_param {
    ($($t:ty),*) => {
        $(
            impl FromParam for $t {
                fn from_param(raw: &str) -> Result<Self, CoerceError> {
                    raw.parse::<$t>().map_err(|source| CoerceError::Int {
                        value: raw.to_string(),
                        source,
                    })
                }
            }
        )*
    };
}

macro_rules! float_from_param {
    ($($t:ty),*) => {
        $(
            impl FromParam for $t {
                fn from_param(raw: &str) -> Result<Self, CoerceError> {
                    raw.parse::<$t>().map_err(|source| CoerceError::Float {
                        value: raw.to_string(),
                        source,
                    })
                }
            }
        )*
    };
}

int_from_param!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize);
float_from_param!(f32, f64);

impl FromParam for Duration {
    fn from_param(raw: &str) -> Result<Self, CoerceError> {
        parse_duration(raw)
    }
}

impl FromParam for Vec<u8> {
    fn from_param(raw: &str) -> Result<Self, CoerceError> {
        Ok(raw.as_bytes().to_vec())
    }
}

impl FromParam for Vec<String> {
    fn from_param(raw: &str) -> Result<Self, CoerceError> {
        Ok(raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect())
    }
}

impl<T: FromParam> FromParam for Option<T> {
    const IS_BOOL: bool = T::IS_BOOL;

    fn from_param(raw: &str) -> Result<Self, CoerceError> {
        T::from_param(raw).map(Some)
    }
}

/// A struct-valued field set from a JSON object literal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Json<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Json<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T: DeserializeOwned> FromParam for Json<T> {
    fn from_param(raw: &str) -> Result<Self, CoerceError> {
        from_json(raw).map(Json)
    }
}

/// Decode a JSON object literal. Anything not starting with `{` is rejected
/// before it reaches the decoder.
pub fn from_json<T: DeserializeOwned>(raw: &str) -> Result<T, CoerceError> {
    if !raw.starts_with('{') {
        return Err(CoerceError::NotJson);
    }
    Ok(serde_json::from_str(raw)?)
}

const NANOS_PER_UNIT: &[(&str, u128)] = &[
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("μs", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60_000_000_000),
    ("h", 3_600_000_000_000),
];

/// Parse a duration such as `300ms`, `1.5h` or `2h45m10s`.
///
/// Every magnitude needs a unit, except for a plain `0`.
pub fn parse_duration(raw: &str) -> Result<Duration, CoerceError> {
    let invalid = || CoerceError::Duration(raw.to_string());
    let mut rest = raw.trim();
    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let int_len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let (int_part, tail) = rest.split_at(int_len);
        let (frac_part, tail) = match tail.strip_prefix('.') {
            Some(after) => {
                let frac_len = after
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(after.len());
                after.split_at(frac_len)
            }
            None => ("", tail),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let &(_, scale) = NANOS_PER_UNIT
            .iter()
            .find(|(name, _)| *name == unit)
            .ok_or_else(invalid)?;

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| invalid())?
        };
        let mut nanos = whole.checked_mul(scale).ok_or_else(invalid)?;
        if !frac_part.is_empty() {
            // Digits past 1e-18 of a unit cannot change the result.
            let digits = &frac_part[..frac_part.len().min(18)];
            let frac: u128 = digits.parse().map_err(|_| invalid())?;
            nanos += frac * scale / 10u128.pow(digits.len() as u32);
        }
        total = total.checked_add(nanos).ok_or_else(invalid)?;
        rest = tail;
    }

    let nanos = u64::try_from(total).map_err(|_| invalid())?;
    Ok(Duration::from_nanos(nanos))
}
