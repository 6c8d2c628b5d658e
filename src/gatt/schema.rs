//! Service descriptors supplied by the application.

use base64::Engine;

use crate::att::MAX_VAL_LEN;
use crate::Uuid;

use super::*;

/// Service definition as supplied by the application runtime. All fields are
/// kept in their textual form until [`ServiceDescriptor::parse`] validates
/// them, so that malformed input is reported as [`Error::InvalidService`]
/// instead of a deserialization error.
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescriptor {
    pub uuid: String,
    #[serde(default = "default_primary")]
    pub primary: bool,
    #[serde(default)]
    pub characteristics: Vec<CharacteristicDescriptor>,
}

const fn default_primary() -> bool {
    true
}

impl ServiceDescriptor {
    /// Creates an empty primary service descriptor.
    #[inline]
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            primary: true,
            characteristics: Vec::new(),
        }
    }

    /// Adds a characteristic descriptor.
    #[inline]
    #[must_use]
    pub fn characteristic(mut self, c: CharacteristicDescriptor) -> Self {
        self.characteristics.push(c);
        self
    }

    /// Validates the descriptor and converts it into a service definition.
    pub fn parse(&self) -> Result<ServiceDef> {
        let uuid = parse_uuid("service", &self.uuid)?;
        let characteristics = (self.characteristics.iter())
            .map(CharacteristicDescriptor::parse)
            .collect::<Result<Vec<_>>>()?;
        let kind = if self.primary {
            ServiceKind::Primary
        } else {
            ServiceKind::Secondary
        };
        Ok(ServiceDef {
            uuid,
            kind,
            characteristics,
        })
    }
}

/// Characteristic definition as supplied by the application runtime.
#[derive(Clone, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacteristicDescriptor {
    pub uuid: String,
    #[serde(default)]
    pub properties: Vec<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Base64-encoded initial value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Characteristic User Description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CharacteristicDescriptor {
    /// Creates a characteristic descriptor from property and permission
    /// tokens.
    pub fn new<P, Q>(uuid: impl Into<String>, properties: &[P], permissions: &[Q]) -> Self
    where
        P: AsRef<str>,
        Q: AsRef<str>,
    {
        Self {
            uuid: uuid.into(),
            properties: properties.iter().map(|p| p.as_ref().to_owned()).collect(),
            permissions: permissions.iter().map(|p| p.as_ref().to_owned()).collect(),
            value: None,
            description: None,
        }
    }

    /// Sets the Base64-encoded initial value.
    #[inline]
    #[must_use]
    pub fn value(mut self, v: impl Into<String>) -> Self {
        self.value = Some(v.into());
        self
    }

    /// Sets the user description.
    #[inline]
    #[must_use]
    pub fn description(mut self, v: impl Into<String>) -> Self {
        self.description = Some(v.into());
        self
    }

    /// Validates the descriptor and converts it into a characteristic
    /// definition.
    pub fn parse(&self) -> Result<CharacteristicDef> {
        let uuid = parse_uuid("characteristic", &self.uuid)?;
        let props = Prop::parse(&self.properties)
            .map_err(|t| invalid(format_args!("{uuid}: unknown property {t:?}")))?;
        let perms = Perm::parse(&self.permissions)
            .map_err(|t| invalid(format_args!("{uuid}: unknown permission {t:?}")))?;
        let value = match self.value.as_deref() {
            None => Vec::new(),
            Some(v) => (base64::engine::general_purpose::STANDARD.decode(v))
                .map_err(|e| invalid(format_args!("{uuid}: invalid value ({e})")))?,
        };
        if value.len() > MAX_VAL_LEN {
            return Err(invalid(format_args!(
                "{uuid}: value exceeds {MAX_VAL_LEN} bytes"
            )));
        }
        let mut c = CharacteristicDef::new(uuid, props, perms, value);
        if let Some(d) = self.description.as_deref() {
            c = c.with_description(d);
        }
        Ok(c)
    }
}

fn parse_uuid(what: &str, s: &str) -> Result<Uuid> {
    (s.parse()).map_err(|e| invalid(format_args!("{what} UUID {s:?}: {e}")))
}

#[inline]
fn invalid(args: std::fmt::Arguments) -> Error {
    Error::InvalidService(args.to_string())
}
