//! Length-type-value advertising and scan response data
//! ([Vol 3] Part C, Section 11 and \[CSS\] Part A, Section 1).

use structbuf::{Pack, Packer, StructBuf};

use crate::Uuid;

use super::*;

/// Response data builder.
#[derive(Clone, Debug)]
pub struct ResponseDataMut(StructBuf);

impl ResponseDataMut {
    /// Maximum length of extended advertising data ([Vol 6] Part B, Section
    /// 2.3.4).
    pub const MAX_LEN: usize = 254;

    /// Maximum length of legacy advertising and scan response data
    /// ([Vol 6] Part B, Section 2.3.1).
    pub const LEGACY_MAX_LEN: usize = 31;

    /// Creates a new response data buffer.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self(StructBuf::new(Self::MAX_LEN))
    }

    /// Returns the number of bytes written so far.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns the encoded response data.
    #[inline]
    #[must_use]
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.as_ref().to_vec()
    }

    /// Appends service class UUIDs (\[CSS\] Part A, Section 1.1). Each UUID is
    /// encoded in the shortest format, and lists without any UUIDs are
    /// omitted.
    pub fn service_class(&mut self, complete: bool, uuids: &[Uuid]) -> &mut Self {
        let typ = u8::from(ResponseDataType::IncompleteServiceClass16) + u8::from(complete);
        self.maybe_put(typ, |b| {
            (uuids.iter().filter_map(|u| u.as_u16())).for_each(|v| {
                b.u16(v);
            });
        });
        self.maybe_put(typ + 2, |b| {
            (uuids.iter().filter_map(|u| u.as_u32())).for_each(|v| {
                b.u32(v);
            });
        });
        self.maybe_put(typ + 4, |b| {
            (uuids.iter().filter_map(|u| u.as_u128())).for_each(|v| {
                b.u128(v);
            });
        })
    }

    /// Appends either shortened or complete local device name
    /// (\[CSS\] Part A, Section 1.2).
    pub fn local_name(&mut self, complete: bool, v: &str) -> &mut Self {
        let typ = u8::from(ResponseDataType::ShortLocalName) + u8::from(complete);
        self.put(typ, |b| {
            b.put(v.as_bytes());
        })
    }

    /// Appends advertising flags (\[CSS\] Part A, Section 1.3).
    pub fn flags(&mut self, v: AdvFlag) -> &mut Self {
        self.put(ResponseDataType::Flags, |b| {
            b.u8(v.bits());
        })
    }

    /// Appends TX power level in dBm (\[CSS\] Part A, Section 1.5).
    pub fn tx_power(&mut self, dbm: i8) -> &mut Self {
        self.put(ResponseDataType::TxPower, |b| {
            b.i8(dbm);
        })
    }

    /// Appends a length-type-data field, calling `f` to provide the data.
    #[inline]
    fn put<T: Into<u8>>(&mut self, typ: T, f: impl Fn(&mut Packer)) -> &mut Self {
        self.append(true, typ.into(), f)
    }

    /// Appends a length-type-data field unless `f` provides no data.
    #[inline]
    fn maybe_put(&mut self, typ: u8, f: impl Fn(&mut Packer)) -> &mut Self {
        self.append(false, typ, f)
    }

    fn append(&mut self, keep_empty: bool, typ: u8, f: impl Fn(&mut Packer)) -> &mut Self {
        let i = self.0.len();
        f(self.0.append().put([0, typ]));
        let n = u8::try_from(self.0.len().wrapping_sub(i + 1)).expect("response data overflow");
        self.0[i] = n;
        if !keep_empty && n < 2 {
            self.0.truncate(i);
        }
        self
    }
}

impl Default for ResponseDataMut {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}
