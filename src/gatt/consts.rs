use bitflags::bitflags;

bitflags! {
    /// Characteristic properties ([Vol 3] Part G, Section 3.3.1.1).
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    #[repr(transparent)]
    pub struct Prop: u8 {
        /// Permits broadcasts of the Characteristic Value using Server
        /// Characteristic Configuration Descriptor.
        const BROADCAST = 0x01;
        /// Permits reads of the Characteristic Value.
        const READ = 0x02;
        /// Permits writes of the Characteristic Value without response.
        const WRITE_CMD = 0x04;
        /// Permits writes of the Characteristic Value with response.
        const WRITE = 0x08;
        /// Permits notifications of a Characteristic Value without
        /// acknowledgment.
        const NOTIFY = 0x10;
        /// Permits indications of a Characteristic Value with acknowledgment.
        const INDICATE = 0x20;
        /// Permits signed writes to the Characteristic Value.
        const SIGNED_WRITE_CMD = 0x40;
        /// Additional characteristic properties are defined in the
        /// Characteristic Extended Properties Descriptor.
        const EXT_PROPS = 0x80;
    }
}

impl Prop {
    const TOKENS: [(&'static str, Self); 8] = [
        ("broadcast", Self::BROADCAST),
        ("read", Self::READ),
        ("writeWithoutResponse", Self::WRITE_CMD),
        ("write", Self::WRITE),
        ("notify", Self::NOTIFY),
        ("indicate", Self::INDICATE),
        ("authenticatedSignedWrites", Self::SIGNED_WRITE_CMD),
        ("extendedProperties", Self::EXT_PROPS),
    ];

    /// Parses a list of property tokens. Returns the first unrecognized token
    /// on failure.
    pub fn parse<T: AsRef<str>>(tokens: &[T]) -> Result<Self, String> {
        parse_tokens(&Self::TOKENS, tokens)
    }

    /// Returns whether the characteristic can be subscribed to.
    #[inline]
    #[must_use]
    pub const fn can_subscribe(self) -> bool {
        self.intersects(Self::NOTIFY.union(Self::INDICATE))
    }
}

bitflags! {
    /// Attribute access permissions, using the platform bit assignments.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    #[repr(transparent)]
    pub struct Perm: u16 {
        /// Read access.
        const READ = 0x01;
        /// Read access over an encrypted link.
        const READ_ENCRYPTED = 0x02;
        /// Write access.
        const WRITE = 0x10;
        /// Write access over an encrypted link.
        const WRITE_ENCRYPTED = 0x20;
        /// Read/write access.
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

impl Perm {
    const TOKENS: [(&'static str, Self); 4] = [
        ("readable", Self::READ),
        ("writeable", Self::WRITE),
        ("readEncryptionRequired", Self::READ_ENCRYPTED),
        ("writeEncryptionRequired", Self::WRITE_ENCRYPTED),
    ];

    /// Parses a list of permission tokens. Returns the first unrecognized
    /// token on failure.
    pub fn parse<T: AsRef<str>>(tokens: &[T]) -> Result<Self, String> {
        parse_tokens(&Self::TOKENS, tokens)
    }
}

/// Combines flags named by `tokens`.
fn parse_tokens<F, T>(tab: &[(&str, F)], tokens: &[T]) -> Result<F, String>
where
    F: bitflags::Flags + Copy,
    T: AsRef<str>,
{
    tokens.iter().try_fold(F::empty(), |mut acc, t| {
        let t = t.as_ref();
        let &(_, f) = (tab.iter().find(|&&(name, _)| name == t)).ok_or_else(|| t.to_owned())?;
        acc.insert(f);
        Ok(acc)
    })
}

/// Client Characteristic Configuration descriptor value
/// ([Vol 3] Part G, Section 3.3.3.3).
#[derive(
    Clone, Copy, Debug, Default, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize,
)]
#[serde(rename_all = "camelCase")]
pub enum Cccd {
    /// Notifications and indications are disabled.
    #[default]
    Disabled,
    /// The characteristic value shall be notified.
    Notify,
    /// The characteristic value shall be indicated.
    Indicate,
}

impl Cccd {
    /// Descriptor value length.
    pub const LEN: usize = 2;

    /// Decodes a descriptor value. Returns [`None`] for any value other than
    /// the three defined configurations.
    #[inline]
    #[must_use]
    pub const fn from_value(v: [u8; Self::LEN]) -> Option<Self> {
        match u16::from_le_bytes(v) {
            0x0000 => Some(Self::Disabled),
            0x0001 => Some(Self::Notify),
            0x0002 => Some(Self::Indicate),
            _ => None,
        }
    }

    /// Returns the encoded descriptor value.
    #[inline]
    #[must_use]
    pub const fn value(self) -> [u8; Self::LEN] {
        let v: u16 = match self {
            Self::Disabled => 0x0000,
            Self::Notify => 0x0001,
            Self::Indicate => 0x0002,
        };
        v.to_le_bytes()
    }

    /// Returns whether notifications or indications are enabled.
    #[inline(always)]
    #[must_use]
    pub const fn is_enabled(self) -> bool {
        !matches!(self, Self::Disabled)
    }

    /// Returns whether a characteristic with properties `p` accepts this
    /// configuration.
    #[inline]
    #[must_use]
    pub const fn is_supported_by(self, p: Prop) -> bool {
        match self {
            Self::Disabled => true,
            Self::Notify => p.contains(Prop::NOTIFY),
            Self::Indicate => p.contains(Prop::INDICATE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prop_tokens() {
        assert_eq!(Prop::parse::<&str>(&[]), Ok(Prop::empty()));
        assert_eq!(Prop::parse(&["read", "notify"]), Ok(Prop::READ | Prop::NOTIFY));
        assert_eq!(
            Prop::parse(&["writeWithoutResponse", "authenticatedSignedWrites"]),
            Ok(Prop::WRITE_CMD | Prop::SIGNED_WRITE_CMD)
        );
        assert_eq!(Prop::parse(&["read", "Notify"]), Err("Notify".to_owned()));
        assert_eq!(Prop::parse(&["bogus"]), Err("bogus".to_owned()));
        assert!((Prop::READ | Prop::INDICATE).can_subscribe());
        assert!(!(Prop::READ | Prop::WRITE).can_subscribe());
    }

    #[test]
    fn perm_tokens() {
        assert_eq!(
            Perm::parse(&["readable", "writeable"]),
            Ok(Perm::READ_WRITE)
        );
        assert_eq!(
            Perm::parse(&["readEncryptionRequired", "writeEncryptionRequired"]),
            Ok(Perm::READ_ENCRYPTED | Perm::WRITE_ENCRYPTED)
        );
        assert_eq!(Perm::parse(&["read"]), Err("read".to_owned()));
    }

    #[test]
    fn cccd() {
        use Cccd::*;
        assert_eq!(Cccd::from_value([0, 0]), Some(Disabled));
        assert_eq!(Cccd::from_value([1, 0]), Some(Notify));
        assert_eq!(Cccd::from_value([2, 0]), Some(Indicate));
        assert_eq!(Cccd::from_value([3, 0]), None);
        assert_eq!(Cccd::from_value([0, 1]), None);
        assert_eq!(Indicate.value(), [2, 0]);
        assert!(Notify.is_supported_by(Prop::NOTIFY));
        assert!(!Notify.is_supported_by(Prop::INDICATE));
        assert!(Disabled.is_supported_by(Prop::empty()));
    }
}
