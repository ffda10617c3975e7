//! Numeric parameter marshaling.
//!
//! Every BFM parameter crosses the simulator boundary as one raw 64-bit word.
//! A [`ParamType`] is what a method declares; at registration it is reduced
//! to a [`ParamKind`] (signedness and bit width), which drives both
//! directions:
//!
//! - [`pack`] range-checks a value against the kind and encodes it as a
//!   two's-complement word truncated to the kind's width.
//! - [`unpack`] takes the low `width` bits of a word and sign- or
//!   zero-extends them.

use crate::error::{Error, ErrorKind};
use core::fmt;
use serde::Serialize;

/// A declared parameter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    /// Unsigned 8-bit.
    U8,
    /// Unsigned 16-bit.
    U16,
    /// Unsigned 32-bit.
    U32,
    /// Unsigned 64-bit.
    U64,
    /// Signed 8-bit.
    I8,
    /// Signed 16-bit.
    I16,
    /// Signed 32-bit.
    I32,
    /// Signed 64-bit.
    I64,
    /// Arbitrary width from 1 to 64 bits.
    Bits {
        /// Width in bits.
        width: u8,
        /// Two's-complement when true.
        signed: bool,
    },
}

impl ParamType {
    /// Reduces the declaration to its marshaling kind.
    pub const fn kind(self) -> Result<ParamKind, MarshalError> {
        let (signed, width) = match self {
            Self::U8 => (false, 8),
            Self::U16 => (false, 16),
            Self::U32 => (false, 32),
            Self::U64 => (false, 64),
            Self::I8 => (true, 8),
            Self::I16 => (true, 16),
            Self::I32 => (true, 32),
            Self::I64 => (true, 64),
            Self::Bits { width, signed } => (signed, width),
        };
        ParamKind::new(signed, width)
    }
}

/// Signedness and width of a marshaled parameter.
///
/// Only constructible with a width of 1 to 64 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ParamKind {
    signed: bool,
    width: u8,
}

impl ParamKind {
    /// Builds a kind, rejecting widths outside 1 to 64.
    pub const fn new(signed: bool, width: u8) -> Result<Self, MarshalError> {
        if width == 0 || width > 64 {
            return Err(MarshalError::InvalidWidth(width));
        }
        Ok(Self { signed, width })
    }

    /// Two's-complement when true.
    #[must_use]
    pub const fn signed(self) -> bool {
        self.signed
    }

    /// Width in bits.
    #[must_use]
    pub const fn width(self) -> u8 {
        self.width
    }

    /// Bits of a word that carry the value.
    #[must_use]
    pub const fn mask(self) -> u64 {
        if self.width >= 64 {
            u64::MAX
        } else {
            (1u64 << self.width) - 1
        }
    }

    /// Smallest and largest representable values.
    #[must_use]
    pub const fn range(self) -> (i128, i128) {
        if self.signed {
            let half = 1i128 << (self.width - 1);
            (-half, half - 1)
        } else {
            (0, self.mask() as i128)
        }
    }
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.signed { 'i' } else { 'u' };
        write!(f, "{prefix}{}", self.width)
    }
}

/// A parameter value on the host side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamValue {
    /// A zero-extended value.
    Unsigned(u64),
    /// A sign-extended value.
    Signed(i64),
}

impl ParamValue {
    /// The value widened to `i128`.
    #[must_use]
    pub const fn as_i128(self) -> i128 {
        match self {
            Self::Unsigned(v) => v as i128,
            Self::Signed(v) => v as i128,
        }
    }

    /// Converts into a concrete integer type.
    pub fn to<T: TryFrom<i128>>(self) -> Result<T, MarshalError> {
        let value = self.as_i128();
        T::try_from(value).map_err(|_| MarshalError::Conversion {
            value,
            target: std::any::type_name::<T>(),
        })
    }
}

macro_rules! param_value_from {
    ($variant:ident as $wide:ty: $($t:ty),*) => {
        $(
            impl From<$t> for ParamValue {
                fn from(v: $t) -> Self {
                    Self::$variant(<$wide>::from(v))
                }
            }
        )*
    };
}

param_value_from!(Unsigned as u64: u8, u16, u32, u64, bool);
param_value_from!(Signed as i64: i8, i16, i32, i64);

/// Why a parameter could not be marshaled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarshalError {
    /// The value does not fit the declared kind.
    #[error("value {value} does not fit {kind}")]
    OutOfRange {
        /// The offending value.
        value: i128,
        /// The declared kind.
        kind: ParamKind,
    },
    /// Wrong number of parameters.
    #[error("expected {expected} parameters, got {got}")]
    Arity {
        /// Declared count.
        expected: usize,
        /// Supplied count.
        got: usize,
    },
    /// A declared width outside 1..=64.
    #[error("invalid parameter width {0}")]
    InvalidWidth(u8),
    /// An unpacked value does not fit the requested host type.
    #[error("value {value} does not fit {target}")]
    Conversion {
        /// The offending value.
        value: i128,
        /// The requested type.
        target: &'static str,
    },
}

impl From<MarshalError> for Error {
    #[track_caller]
    fn from(err: MarshalError) -> Self {
        Self::new(ErrorKind::Marshal)
            .with_message(err.to_string())
            .with_source(err)
    }
}

/// Encodes `value` as a raw word of `kind`'s width.
#[allow(clippy::cast_sign_loss)]
pub fn pack(value: ParamValue, kind: ParamKind) -> Result<u64, MarshalError> {
    let wide = value.as_i128();
    let (min, max) = kind.range();
    if wide < min || wide > max {
        return Err(MarshalError::OutOfRange { value: wide, kind });
    }
    Ok((wide as u64) & kind.mask())
}

/// Decodes a raw word per `kind`, ignoring bits above its width.
#[allow(clippy::cast_possible_wrap)]
pub fn unpack(word: u64, kind: ParamKind) -> ParamValue {
    let mask = kind.mask();
    let bits = word & mask;
    if !kind.signed {
        return ParamValue::Unsigned(bits);
    }
    let sign_bit = 1u64 << (kind.width - 1);
    if bits & sign_bit == 0 {
        ParamValue::Signed(bits as i64)
    } else {
        ParamValue::Signed((bits | !mask) as i64)
    }
}

/// Packs a parameter list, checking its length first.
pub fn pack_all(values: &[ParamValue], kinds: &[ParamKind]) -> Result<Vec<u64>, MarshalError> {
    check_arity(values.len(), kinds.len())?;
    values
        .iter()
        .zip(kinds)
        .map(|(value, kind)| pack(*value, *kind))
        .collect()
}

/// Unpacks a parameter list, checking its length first.
pub fn unpack_all(words: &[u64], kinds: &[ParamKind]) -> Result<Vec<ParamValue>, MarshalError> {
    check_arity(words.len(), kinds.len())?;
    Ok(words
        .iter()
        .zip(kinds)
        .map(|(word, kind)| unpack(*word, *kind))
        .collect())
}

const fn check_arity(got: usize, expected: usize) -> Result<(), MarshalError> {
    if got == expected {
        Ok(())
    } else {
        Err(MarshalError::Arity { expected, got })
    }
}
