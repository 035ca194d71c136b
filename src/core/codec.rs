//! # Wire Codec
//!
//! Composable, self-describing binary encodings used for every message on the
//! wire. Each Rust type that can travel implements [`Wire`]; the mapping from
//! types to wire shapes is:
//!
//! | Shape                | Rust type                  | Encoding                                   |
//! |----------------------|----------------------------|--------------------------------------------|
//! | Unit                 | `()`                       | nothing                                    |
//! | FixedBuf(n)          | `[u8; N]`                  | `N` raw bytes                              |
//! | VarBuf               | [`Bytes`]                  | `u64` BE length + bytes                    |
//! | Str                  | `String`                   | VarBuf holding UTF-8                       |
//! | List(T)              | `Vec<T>`                   | `u64` BE count + elements                  |
//! | Set(T)               | `BTreeSet<T>`              | same as List, duplicates collapse          |
//! | Maybe(T)             | `Option<T>`                | `u8` flag (1 = present) + element          |
//! | FixedWidthNumber     | `u8`..`u64`, [`Le`]        | big-endian, or little-endian via `Le`      |
//! | BigInt               | [`BigInt`]                 | `u8` length + minimal BE magnitude         |
//! | Record               | [`wire_record!`] structs   | fields in declared order                   |
//! | Union                | [`wire_union!`] enums      | `u8` discriminant + member                 |
//!
//! New Record and Union shapes are declared with the macros and never need
//! changes to the [`Parser`].
//!
//! [`wire_record!`]: crate::wire_record
//! [`wire_union!`]: crate::wire_union

use std::collections::BTreeSet;
use std::fmt;

use bytes::{BufMut, Bytes};
use num_bigint::BigUint;

use crate::core::parser::Parser;
use crate::error::{ProtocolError, Result};

pub use bytes::BytesMut;

/// A value with a symmetric binary encoding.
///
/// Implementations must satisfy `decode(encode(x)) == x` and must consume
/// exactly the bytes their own encoding produced.
pub trait Wire: Sized {
    fn encode(&self, out: &mut BytesMut) -> Result<()>;
    fn decode(parser: &mut Parser<'_>) -> Result<Self>;
}

/// A closed tagged union whose members are selected by a one-byte index.
///
/// Normally implemented through [`wire_union!`](crate::wire_union).
pub trait WireUnion: Sized {
    /// Type name used in error messages.
    const NAME: &'static str;
    /// Member names in declaration order.
    const MEMBERS: &'static [&'static str];

    fn discriminant(&self) -> u8;
    fn variant_name(&self) -> &'static str;

    /// Resolve a member name to its discriminant.
    fn discriminant_for(name: &str) -> Result<u8>;

    /// Encode the member payload without the discriminant.
    fn encode_variant(&self, out: &mut BytesMut) -> Result<()>;

    /// Decode the member payload for an already consumed discriminant.
    fn decode_variant(discriminant: u8, parser: &mut Parser<'_>) -> Result<Self>;
}

/// Standard union encoding: discriminant byte then member payload.
pub fn encode_union<U: WireUnion>(value: &U, out: &mut BytesMut) -> Result<()> {
    out.put_u8(value.discriminant());
    value.encode_variant(out)
}

pub fn decode_union<U: WireUnion>(parser: &mut Parser<'_>) -> Result<U> {
    let discriminant = parser.read_u8()?;
    U::decode_variant(discriminant, parser)
}

/// Encode a value into a freshly allocated buffer.
pub fn encode_to_bytes<T: Wire>(value: &T) -> Result<Bytes> {
    let mut out = BytesMut::new();
    value.encode(&mut out)?;
    Ok(out.freeze())
}

/// Decode a value that must span the whole input.
pub fn decode_exact<T: Wire>(data: &[u8]) -> Result<T> {
    let mut parser = Parser::new(data);
    let value = T::decode(&mut parser)?;
    parser.finish()?;
    Ok(value)
}

/// Declare a struct whose wire form is its fields encoded in order.
///
/// ```rust
/// use zeno_net::wire_record;
/// use zeno_net::core::codec::{decode_exact, encode_to_bytes};
///
/// wire_record! {
///     #[derive(Debug, PartialEq)]
///     pub struct Point { pub x: u16, pub y: u16 }
/// }
///
/// let bytes = encode_to_bytes(&Point { x: 1, y: 2 }).unwrap();
/// assert_eq!(&bytes[..], &[0, 1, 0, 2]);
/// assert_eq!(decode_exact::<Point>(&bytes).unwrap(), Point { x: 1, y: 2 });
/// ```
#[macro_export]
macro_rules! wire_record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $( $(#[$fmeta:meta])* $fvis:vis $field:ident : $ty:ty ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $( $(#[$fmeta])* $fvis $field: $ty ),*
        }

        impl $crate::core::codec::Wire for $name {
            #[allow(unused_variables)]
            fn encode(
                &self,
                out: &mut $crate::core::codec::BytesMut,
            ) -> $crate::error::Result<()> {
                $( $crate::core::codec::Wire::encode(&self.$field, out)?; )*
                Ok(())
            }

            #[allow(unused_variables)]
            fn decode(
                parser: &mut $crate::core::parser::Parser<'_>,
            ) -> $crate::error::Result<Self> {
                Ok(Self {
                    $( $field: $crate::core::codec::Wire::decode(parser)?, )*
                })
            }
        }
    };
}

/// Declare an enum whose wire form is a one-byte discriminant followed by the
/// selected member. Every member carries exactly one value and an explicit
/// discriminant; discriminants must run `0..n` in declaration order.
///
/// ```rust
/// use zeno_net::wire_union;
/// use zeno_net::core::codec::{encode_to_bytes, WireUnion};
///
/// wire_union! {
///     #[derive(Debug, PartialEq)]
///     pub enum Shape {
///         Empty(()) = 0,
///         Square(u8) = 1,
///     }
/// }
///
/// assert_eq!(&encode_to_bytes(&Shape::Square(3)).unwrap()[..], &[1, 3]);
/// assert_eq!(Shape::discriminant_for("Empty").unwrap(), 0);
/// ```
#[macro_export]
macro_rules! wire_union {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident ( $ty:ty ) = $tag:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis enum $name {
            $( $(#[$vmeta])* $variant($ty) ),+
        }

        impl $crate::core::codec::WireUnion for $name {
            const NAME: &'static str = stringify!($name);
            const MEMBERS: &'static [&'static str] = &[$( stringify!($variant) ),+];

            fn discriminant(&self) -> u8 {
                match self {
                    $( Self::$variant(_) => $tag, )+
                }
            }

            fn variant_name(&self) -> &'static str {
                match self {
                    $( Self::$variant(_) => stringify!($variant), )+
                }
            }

            fn discriminant_for(name: &str) -> $crate::error::Result<u8> {
                $(
                    if name == stringify!($variant) {
                        return Ok($tag);
                    }
                )+
                Err($crate::error::ProtocolError::NoMatchingVariant {
                    union: stringify!($name),
                    name: name.to_string(),
                })
            }

            fn encode_variant(
                &self,
                out: &mut $crate::core::codec::BytesMut,
            ) -> $crate::error::Result<()> {
                match self {
                    $( Self::$variant(value) => $crate::core::codec::Wire::encode(value, out), )+
                }
            }

            fn decode_variant(
                discriminant: u8,
                parser: &mut $crate::core::parser::Parser<'_>,
            ) -> $crate::error::Result<Self> {
                match discriminant {
                    $( $tag => Ok(Self::$variant($crate::core::codec::Wire::decode(parser)?)), )+
                    _ => Err($crate::error::ProtocolError::UnknownVariant {
                        union: stringify!($name),
                        discriminant,
                    }),
                }
            }
        }

        impl $crate::core::codec::Wire for $name {
            fn encode(
                &self,
                out: &mut $crate::core::codec::BytesMut,
            ) -> $crate::error::Result<()> {
                $crate::core::codec::encode_union(self, out)
            }

            fn decode(
                parser: &mut $crate::core::parser::Parser<'_>,
            ) -> $crate::error::Result<Self> {
                $crate::core::codec::decode_union(parser)
            }
        }
    };
}

impl Wire for () {
    fn encode(&self, _out: &mut BytesMut) -> Result<()> {
        Ok(())
    }

    fn decode(_parser: &mut Parser<'_>) -> Result<Self> {
        Ok(())
    }
}

impl<const N: usize> Wire for [u8; N] {
    fn encode(&self, out: &mut BytesMut) -> Result<()> {
        out.put_slice(self);
        Ok(())
    }

    fn decode(parser: &mut Parser<'_>) -> Result<Self> {
        parser.take_array()
    }
}

impl Wire for Bytes {
    fn encode(&self, out: &mut BytesMut) -> Result<()> {
        out.reserve(8 + self.len());
        out.put_u64(self.len() as u64);
        out.put_slice(self);
        Ok(())
    }

    fn decode(parser: &mut Parser<'_>) -> Result<Self> {
        let len = read_length(parser)?;
        Ok(Bytes::copy_from_slice(parser.take(len)?))
    }
}

impl Wire for String {
    fn encode(&self, out: &mut BytesMut) -> Result<()> {
        out.reserve(8 + self.len());
        out.put_u64(self.len() as u64);
        out.put_slice(self.as_bytes());
        Ok(())
    }

    fn decode(parser: &mut Parser<'_>) -> Result<Self> {
        let len = read_length(parser)?;
        let raw = parser.take(len)?;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|e| ProtocolError::Encoding(format!("invalid UTF-8 string: {e}")))
    }
}

impl<T: Wire> Wire for Vec<T> {
    fn encode(&self, out: &mut BytesMut) -> Result<()> {
        out.put_u64(self.len() as u64);
        for item in self {
            item.encode(out)?;
        }
        Ok(())
    }

    fn decode(parser: &mut Parser<'_>) -> Result<Self> {
        let count = read_length(parser)?;
        let mut items = Vec::with_capacity(preallocation::<T>(count));
        for _ in 0..count {
            items.push(T::decode(parser)?);
        }
        Ok(items)
    }
}

impl<T: Wire + Ord> Wire for BTreeSet<T> {
    fn encode(&self, out: &mut BytesMut) -> Result<()> {
        out.put_u64(self.len() as u64);
        for item in self {
            item.encode(out)?;
        }
        Ok(())
    }

    fn decode(parser: &mut Parser<'_>) -> Result<Self> {
        let count = read_length(parser)?;
        let mut items = BTreeSet::new();
        for _ in 0..count {
            items.insert(T::decode(parser)?);
        }
        Ok(items)
    }
}

impl<T: Wire> Wire for Option<T> {
    fn encode(&self, out: &mut BytesMut) -> Result<()> {
        match self {
            Some(value) => {
                out.put_u8(1);
                value.encode(out)
            }
            None => {
                out.put_u8(0);
                Ok(())
            }
        }
    }

    fn decode(parser: &mut Parser<'_>) -> Result<Self> {
        match parser.read_u8()? {
            0 => Ok(None),
            1 => Ok(Some(T::decode(parser)?)),
            flag => Err(ProtocolError::UnknownVariant {
                union: "Maybe",
                discriminant: flag,
            }),
        }
    }
}

/// Bytes reserved up front for a decoded list; larger lists grow as their
/// elements decode.
const MAX_PREALLOC_BYTES: usize = 64 * 1024;

/// A count only proves there are that many input bytes, not that many
/// elements, so the reservation is capped by memory footprint.
fn preallocation<T>(count: usize) -> usize {
    count.min(MAX_PREALLOC_BYTES / std::mem::size_of::<T>().max(1))
}

/// Reads a `u64` length or count prefix. A prefix larger than the remaining
/// input can never be satisfied, so it is rejected before any allocation.
fn read_length(parser: &mut Parser<'_>) -> Result<usize> {
    let declared = parser.read_u64_be()?;
    let remaining = parser.remaining();
    match usize::try_from(declared) {
        Ok(len) if len <= remaining => Ok(len),
        _ => Err(ProtocolError::Underrun {
            needed: usize::try_from(declared).unwrap_or(usize::MAX),
            remaining,
        }),
    }
}

macro_rules! impl_wire_be {
    ($($ty:ty => $put:ident),+ $(,)?) => {
        $(
            impl Wire for $ty {
                fn encode(&self, out: &mut BytesMut) -> Result<()> {
                    out.$put(*self);
                    Ok(())
                }

                fn decode(parser: &mut Parser<'_>) -> Result<Self> {
                    Ok(<$ty>::from_be_bytes(parser.take_array()?))
                }
            }
        )+
    };
}

impl_wire_be!(u8 => put_u8, u16 => put_u16, u32 => put_u32, u64 => put_u64);

/// Little-endian fixed-width number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Le<T>(pub T);

macro_rules! impl_wire_le {
    ($($ty:ty => $put:ident),+ $(,)?) => {
        $(
            impl Wire for Le<$ty> {
                fn encode(&self, out: &mut BytesMut) -> Result<()> {
                    out.$put(self.0);
                    Ok(())
                }

                fn decode(parser: &mut Parser<'_>) -> Result<Self> {
                    Ok(Le(<$ty>::from_le_bytes(parser.take_array()?)))
                }
            }
        )+
    };
}

impl_wire_le!(u16 => put_u16_le, u32 => put_u32_le, u64 => put_u64_le);

/// Unsigned arbitrary-precision integer: one length byte followed by the
/// minimal big-endian magnitude. Zero is the empty magnitude.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BigInt(pub BigUint);

impl BigInt {
    /// Maximum magnitude length expressible by the one-byte prefix.
    pub const MAX_BYTES: usize = u8::MAX as usize;

    pub fn magnitude(&self) -> Vec<u8> {
        if self.0.bits() == 0 {
            Vec::new()
        } else {
            self.0.to_bytes_be()
        }
    }
}

impl From<u64> for BigInt {
    fn from(value: u64) -> Self {
        BigInt(BigUint::from(value))
    }
}

impl From<BigUint> for BigInt {
    fn from(value: BigUint) -> Self {
        BigInt(value)
    }
}

impl fmt::Display for BigInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Wire for BigInt {
    fn encode(&self, out: &mut BytesMut) -> Result<()> {
        let magnitude = self.magnitude();
        if magnitude.len() > Self::MAX_BYTES {
            return Err(ProtocolError::ValueTooLarge {
                what: "BigInt magnitude",
                len: magnitude.len(),
            });
        }
        out.put_u8(magnitude.len() as u8);
        out.put_slice(&magnitude);
        Ok(())
    }

    fn decode(parser: &mut Parser<'_>) -> Result<Self> {
        let len = parser.read_u8()? as usize;
        let magnitude = parser.take(len)?;
        if magnitude.first() == Some(&0) {
            return Err(ProtocolError::Encoding(
                "non-canonical BigInt: leading zero byte".into(),
            ));
        }
        Ok(BigInt(BigUint::from_bytes_be(magnitude)))
    }
}

/// Byte string prefixed with a Bitcoin CompactSize length.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CompactBuf(pub Bytes);

impl CompactBuf {
    fn put_compact_size(out: &mut BytesMut, len: u64) {
        match len {
            0..=0xfc => out.put_u8(len as u8),
            0xfd..=0xffff => {
                out.put_u8(0xfd);
                out.put_u16_le(len as u16);
            }
            0x1_0000..=0xffff_ffff => {
                out.put_u8(0xfe);
                out.put_u32_le(len as u32);
            }
            _ => {
                out.put_u8(0xff);
                out.put_u64_le(len);
            }
        }
    }

    fn read_compact_size(parser: &mut Parser<'_>) -> Result<u64> {
        let (value, minimum) = match parser.read_u8()? {
            0xfd => (u64::from(u16::from_le_bytes(parser.take_array()?)), 0xfd),
            0xfe => (u64::from(u32::from_le_bytes(parser.take_array()?)), 0x1_0000),
            0xff => (u64::from_le_bytes(parser.take_array()?), 0x1_0000_0000),
            small => return Ok(u64::from(small)),
        };
        if value < minimum {
            return Err(ProtocolError::Encoding(format!(
                "non-canonical CompactSize {value}"
            )));
        }
        Ok(value)
    }
}

impl Wire for CompactBuf {
    fn encode(&self, out: &mut BytesMut) -> Result<()> {
        Self::put_compact_size(out, self.0.len() as u64);
        out.put_slice(&self.0);
        Ok(())
    }

    fn decode(parser: &mut Parser<'_>) -> Result<Self> {
        let declared = Self::read_compact_size(parser)?;
        let len = usize::try_from(declared).map_err(|_| ProtocolError::Underrun {
            needed: usize::MAX,
            remaining: parser.remaining(),
        })?;
        Ok(CompactBuf(Bytes::copy_from_slice(parser.take(len)?)))
    }
}
