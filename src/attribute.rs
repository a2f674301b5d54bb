//! Typed attributes, the per-type attribute catalogue, and the registry of
//! type defaults.
//!
//! Every configurable object (device or channel) belongs to an
//! [`ObjectType`] that declares its attributes with a kind and a built-in
//! initial value. When an object is constructed it reads each value once
//! from the registry: registered default if there is one, otherwise the
//! built-in value. Later default changes never reach existing objects;
//! per-instance overrides go straight into the object through
//! [`Configurable`].

use std::collections::BTreeMap;
use std::fmt;

use tracing::debug;

use crate::error::{SimError, SimResult};
use crate::rate::DataRate;
use crate::time::TimeDelta;

// ── Values ────────────────────────────────────────────────────────────

/// The declared type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum AttributeKind {
    DataRate,
    Time,
    UInteger,
    String,
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttributeKind::DataRate => "DataRate",
            AttributeKind::Time => "Time",
            AttributeKind::UInteger => "UInteger",
            AttributeKind::String => "String",
        };
        f.write_str(name)
    }
}

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum AttributeValue {
    DataRate(DataRate),
    Time(TimeDelta),
    UInteger(u64),
    String(String),
}

impl AttributeValue {
    pub fn kind(&self) -> AttributeKind {
        match self {
            AttributeValue::DataRate(_) => AttributeKind::DataRate,
            AttributeValue::Time(_) => AttributeKind::Time,
            AttributeValue::UInteger(_) => AttributeKind::UInteger,
            AttributeValue::String(_) => AttributeKind::String,
        }
    }

    /// Parse `text` as a value of `kind`.
    pub fn parse(kind: AttributeKind, text: &str) -> SimResult<Self> {
        Ok(match kind {
            AttributeKind::DataRate => AttributeValue::DataRate(text.parse()?),
            AttributeKind::Time => AttributeValue::Time(text.parse()?),
            AttributeKind::UInteger => {
                AttributeValue::UInteger(text.trim().parse().map_err(|_| SimError::InvalidValue {
                    kind: "UInteger",
                    value: text.to_string(),
                })?)
            }
            AttributeKind::String => AttributeValue::String(text.to_string()),
        })
    }

    /// Reject values no object can hold: a zero data rate or a negative
    /// delay.
    pub fn validate(&self) -> SimResult<()> {
        let kind = match self {
            AttributeValue::DataRate(rate) if rate.bps() == 0 => "DataRate",
            AttributeValue::Time(delay) if delay.is_negative() => "Time",
            _ => return Ok(()),
        };
        Err(SimError::InvalidValue {
            kind,
            value: self.to_string(),
        })
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::DataRate(r) => write!(f, "{}", r),
            AttributeValue::Time(t) => write!(f, "{}", t),
            AttributeValue::UInteger(n) => write!(f, "{}", n),
            AttributeValue::String(s) => f.write_str(s),
        }
    }
}

impl From<DataRate> for AttributeValue {
    fn from(v: DataRate) -> Self {
        AttributeValue::DataRate(v)
    }
}

impl From<TimeDelta> for AttributeValue {
    fn from(v: TimeDelta) -> Self {
        AttributeValue::Time(v)
    }
}

impl From<u64> for AttributeValue {
    fn from(v: u64) -> Self {
        AttributeValue::UInteger(v)
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::String(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_string())
    }
}

/// A Rust type that can be read out of an [`AttributeValue`].
pub trait AttributeType: Sized {
    const KIND: AttributeKind;

    fn from_value(value: &AttributeValue) -> Option<Self>;
}

impl AttributeType for DataRate {
    const KIND: AttributeKind = AttributeKind::DataRate;

    fn from_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::DataRate(v) => Some(*v),
            _ => None,
        }
    }
}

impl AttributeType for TimeDelta {
    const KIND: AttributeKind = AttributeKind::Time;

    fn from_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::Time(v) => Some(*v),
            _ => None,
        }
    }
}

impl AttributeType for u64 {
    const KIND: AttributeKind = AttributeKind::UInteger;

    fn from_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::UInteger(v) => Some(*v),
            _ => None,
        }
    }
}

impl AttributeType for String {
    const KIND: AttributeKind = AttributeKind::String;

    fn from_value(value: &AttributeValue) -> Option<Self> {
        match value {
            AttributeValue::String(v) => Some(v.clone()),
            _ => None,
        }
    }
}

// ── Catalogue ─────────────────────────────────────────────────────────

/// Declaration of one attribute of an object type.
#[derive(Debug, Clone, Copy)]
pub struct AttributeSpec {
    pub name: &'static str,
    pub kind: AttributeKind,
    pub help: &'static str,
    initial: fn() -> AttributeValue,
}

impl AttributeSpec {
    /// The built-in value used when no default has been registered.
    pub fn initial(&self) -> AttributeValue {
        (self.initial)()
    }
}

const DEVICE_ATTRIBUTES: &[AttributeSpec] = &[
    AttributeSpec {
        name: "DataRate",
        kind: AttributeKind::DataRate,
        help: "Rate at which bits are clocked onto the channel",
        initial: || AttributeValue::DataRate(DataRate::from_bps(32_768)),
    },
    AttributeSpec {
        name: "Mtu",
        kind: AttributeKind::UInteger,
        help: "Largest packet, in bytes, the device will send",
        initial: || AttributeValue::UInteger(1500),
    },
];

const CHANNEL_ATTRIBUTES: &[AttributeSpec] = &[AttributeSpec {
    name: "Delay",
    kind: AttributeKind::Time,
    help: "Propagation delay from a sender to each receiver",
    initial: || AttributeValue::Time(TimeDelta::ZERO),
}];

/// Every configurable object type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum ObjectType {
    PointToPointNetDevice,
    PointToPointChannel,
    CsmaNetDevice,
    CsmaChannel,
}

impl ObjectType {
    pub const ALL: [ObjectType; 4] = [
        ObjectType::PointToPointNetDevice,
        ObjectType::PointToPointChannel,
        ObjectType::CsmaNetDevice,
        ObjectType::CsmaChannel,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ObjectType::PointToPointNetDevice => "PointToPointNetDevice",
            ObjectType::PointToPointChannel => "PointToPointChannel",
            ObjectType::CsmaNetDevice => "CsmaNetDevice",
            ObjectType::CsmaChannel => "CsmaChannel",
        }
    }

    pub fn from_name(name: &str) -> SimResult<Self> {
        ObjectType::ALL
            .into_iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| SimError::UnknownType(name.to_string()))
    }

    pub fn is_device(self) -> bool {
        matches!(
            self,
            ObjectType::PointToPointNetDevice | ObjectType::CsmaNetDevice
        )
    }

    pub fn attributes(self) -> &'static [AttributeSpec] {
        if self.is_device() {
            DEVICE_ATTRIBUTES
        } else {
            CHANNEL_ATTRIBUTES
        }
    }

    pub fn attribute(self, name: &str) -> SimResult<&'static AttributeSpec> {
        self.attributes()
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| SimError::UnknownAttribute {
                type_name: self.name().to_string(),
                attribute: name.to_string(),
            })
    }

    /// Resolve `name` and check that `value` has its declared kind and an
    /// acceptable value.
    pub fn check(self, name: &str, value: &AttributeValue) -> SimResult<&'static AttributeSpec> {
        let spec = self.attribute(name)?;
        if spec.kind != value.kind() {
            return Err(SimError::TypeMismatch {
                attribute: format!("{}::{}", self.name(), spec.name),
                expected: spec.kind,
                found: value.kind(),
            });
        }
        value.validate()?;
        Ok(spec)
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Configurable objects ──────────────────────────────────────────────

/// An object whose attributes can be read and overridden by name.
///
/// Implemented by every device and channel variant; the topology layer
/// and path-based configuration only ever go through this trait.
pub trait Configurable {
    fn object_type(&self) -> ObjectType;

    /// Read a raw value.
    fn attribute(&self, name: &str) -> SimResult<AttributeValue>;

    /// Override one value on this instance. Implementations validate with
    /// [`ObjectType::check`] first.
    fn set_attribute(&mut self, name: &str, value: AttributeValue) -> SimResult<()>;

    /// Parse `text` by the attribute's declared kind and set it.
    fn set_attribute_str(&mut self, name: &str, text: &str) -> SimResult<()> {
        let spec = self.object_type().attribute(name)?;
        self.set_attribute(name, AttributeValue::parse(spec.kind, text)?)
    }

    /// Set a value, parsing it first when a string is given for a
    /// non-string attribute.
    fn set_attribute_lenient(&mut self, name: &str, value: AttributeValue) -> SimResult<()> {
        let spec = self.object_type().attribute(name)?;
        match value {
            AttributeValue::String(text) if spec.kind != AttributeKind::String => {
                self.set_attribute_str(name, &text)
            }
            value => self.set_attribute(name, value),
        }
    }

    /// Read a value as `T`, failing with `TypeMismatch` if `T` is not the
    /// attribute's kind.
    fn get<T: AttributeType>(&self, name: &str) -> SimResult<T>
    where
        Self: Sized,
    {
        let value = self.attribute(name)?;
        T::from_value(&value).ok_or_else(|| SimError::TypeMismatch {
            attribute: format!("{}::{}", self.object_type().name(), name),
            expected: value.kind(),
            found: T::KIND,
        })
    }
}

// ── Registry ──────────────────────────────────────────────────────────

/// Type-wide attribute defaults.
///
/// This is the explicit configuration context of a simulation: build it
/// first, hand it to [`crate::Simulator::new`], keep adjusting it between
/// topology steps through `Simulator::config_mut`. It outlives
/// `run`/`destroy` cycles until [`AttributeRegistry::clear_defaults`].
#[derive(Debug, Clone, Default)]
pub struct AttributeRegistry {
    defaults: BTreeMap<(ObjectType, &'static str), AttributeValue>,
}

impl AttributeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default for `type_name::attr`; applies to objects created
    /// from now on.
    pub fn set_default(
        &mut self,
        type_name: &str,
        attr: &str,
        value: impl Into<AttributeValue>,
    ) -> SimResult<()> {
        self.set_default_for(ObjectType::from_name(type_name)?, attr, value)
    }

    pub fn set_default_for(
        &mut self,
        object_type: ObjectType,
        attr: &str,
        value: impl Into<AttributeValue>,
    ) -> SimResult<()> {
        let value = value.into();
        let spec = object_type.check(attr, &value)?;
        debug!(%object_type, attribute = spec.name, %value, "attribute default set");
        self.defaults.insert((object_type, spec.name), value);
        Ok(())
    }

    /// String form: `set_default_str("PointToPointNetDevice::DataRate", "5Mbps")`.
    pub fn set_default_str(&mut self, qualified: &str, text: &str) -> SimResult<()> {
        let (type_name, attr) = qualified.rsplit_once("::").ok_or_else(|| SimError::InvalidPath {
            path: qualified.to_string(),
            reason: "expected Type::Attribute",
        })?;
        let object_type = ObjectType::from_name(type_name)?;
        let spec = object_type.attribute(attr)?;
        self.set_default_for(object_type, attr, AttributeValue::parse(spec.kind, text)?)
    }

    /// The value a newly constructed object would get.
    pub fn default_value(&self, object_type: ObjectType, attr: &str) -> SimResult<AttributeValue> {
        let spec = object_type.attribute(attr)?;
        Ok(self
            .defaults
            .get(&(object_type, spec.name))
            .cloned()
            .unwrap_or_else(|| spec.initial()))
    }

    /// Typed variant of [`AttributeRegistry::default_value`].
    pub fn default_of<T: AttributeType>(&self, object_type: ObjectType, attr: &str) -> SimResult<T> {
        let value = self.default_value(object_type, attr)?;
        T::from_value(&value).ok_or_else(|| SimError::TypeMismatch {
            attribute: format!("{}::{}", object_type.name(), attr),
            expected: value.kind(),
            found: T::KIND,
        })
    }

    /// Forget every registered default.
    pub fn clear_defaults(&mut self) {
        self.defaults.clear();
    }
}
