//! Bluetooth UUIDs and the assigned numbers used by the GATT peripheral.

#![warn(missing_debug_implementations)]
#![warn(non_ascii_idents)]
#![warn(single_use_lifetimes)]
#![warn(unused_crate_dependencies)]
#![warn(unused_extern_crates)]
#![warn(unused_import_braces)]
#![warn(unused_lifetimes)]
#![warn(unused_qualifications)]
#![warn(clippy::nursery)]
#![warn(clippy::pedantic)]
#![allow(clippy::inline_always)]
#![allow(clippy::module_name_repetitions)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::get_unwrap)]
#![warn(clippy::print_stdout)]
#![warn(clippy::str_to_string)]
#![warn(clippy::todo)]
#![warn(clippy::undocumented_unsafe_blocks)]

use std::fmt::{Debug, Display, Formatter};

pub use crate::uuid::*;

mod uuid;

/// GATT descriptor UUIDs ([Assigned Numbers] Section 3.7).
#[derive(
    Clone, Copy, Debug, Eq, Hash, PartialEq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive,
)]
#[non_exhaustive]
#[repr(u16)]
pub enum Descriptor {
    CharacteristicExtendedProperties = 0x2900,
    CharacteristicUserDescription = 0x2901,
    ClientCharacteristicConfiguration = 0x2902,
    ServerCharacteristicConfiguration = 0x2903,
    CharacteristicPresentationFormat = 0x2904,
    CharacteristicAggregateFormat = 0x2905,
}

impl Descriptor {
    /// Returns the 16-bit UUID of the descriptor.
    #[inline]
    #[must_use]
    pub const fn uuid16(self) -> Uuid16 {
        match Uuid16::new(self as u16) {
            Some(u) => u,
            None => unreachable!(),
        }
    }

    /// Returns the full 128-bit UUID of the descriptor.
    #[inline]
    #[must_use]
    pub const fn uuid(self) -> Uuid {
        self.uuid16().as_uuid()
    }

    /// Returns the descriptor type of `u` or [`None`] if it is not an assigned
    /// descriptor UUID.
    #[inline]
    #[must_use]
    pub fn of(u: Uuid) -> Option<Self> {
        u.as_u16().and_then(|v| Self::try_from(v).ok())
    }
}

impl From<Descriptor> for Uuid {
    #[inline(always)]
    fn from(d: Descriptor) -> Self {
        d.uuid()
    }
}

impl Display for Descriptor {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}
