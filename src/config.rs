//! Configuration paths addressing devices and channels.
//!
//! ```text
//! /NodeList/<n>/DeviceList/<d>[/$<Type>][/<Attribute>]
//! /ChannelList/<c>[/$<Type>][/<Attribute>]
//! ```
//!
//! Indices are creation order; `*` matches every index. A `$Type`
//! segment restricts matches to objects of that type. Device indices are
//! per node, in attach order.

use std::fmt;
use std::str::FromStr;

use crate::attribute::ObjectType;
use crate::error::{SimError, SimResult};

/// One index position in a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    Index(usize),
    Any,
}

impl Selector {
    pub fn matches(self, index: usize) -> bool {
        match self {
            Selector::Index(i) => i == index,
            Selector::Any => true,
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Index(i) => write!(f, "{}", i),
            Selector::Any => f.write_str("*"),
        }
    }
}

/// A parsed object path (without the attribute name).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigPath {
    Device {
        node: Selector,
        device: Selector,
        type_filter: Option<ObjectType>,
    },
    Channel {
        channel: Selector,
        type_filter: Option<ObjectType>,
    },
}

impl ConfigPath {
    /// `/NodeList/<node>/DeviceList/<device>`
    pub fn device(node: usize, device: usize) -> Self {
        ConfigPath::Device {
            node: Selector::Index(node),
            device: Selector::Index(device),
            type_filter: None,
        }
    }

    /// `/ChannelList/<channel>`
    pub fn channel(channel: usize) -> Self {
        ConfigPath::Channel {
            channel: Selector::Index(channel),
            type_filter: None,
        }
    }

    pub fn type_filter(&self) -> Option<ObjectType> {
        match self {
            ConfigPath::Device { type_filter, .. } | ConfigPath::Channel { type_filter, .. } => {
                *type_filter
            }
        }
    }

    /// Whether an object of `object_type` passes the `$Type` filter.
    pub fn admits(&self, object_type: ObjectType) -> bool {
        self.type_filter().map_or(true, |t| t == object_type)
    }

    /// Split `/…/<Attribute>` into its object path and attribute name.
    pub fn split_attribute(full: &str) -> SimResult<(ConfigPath, &str)> {
        let (object, attr) = full.rsplit_once('/').ok_or_else(|| invalid(full, "missing attribute"))?;
        if attr.is_empty() || attr.starts_with('$') || attr == "*" || attr.parse::<usize>().is_ok() {
            return Err(invalid(full, "missing attribute"));
        }
        Ok((object.parse()?, attr))
    }
}

fn invalid(path: &str, reason: &'static str) -> SimError {
    SimError::InvalidPath {
        path: path.to_string(),
        reason,
    }
}

fn selector(path: &str, segment: Option<&str>) -> SimResult<Selector> {
    match segment {
        Some("*") => Ok(Selector::Any),
        Some(s) => s
            .parse()
            .map(Selector::Index)
            .map_err(|_| invalid(path, "index must be a number or *")),
        None => Err(invalid(path, "missing index")),
    }
}

impl FromStr for ConfigPath {
    type Err = SimError;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let rest = path
            .strip_prefix('/')
            .ok_or_else(|| invalid(path, "must start with /"))?;
        let mut segments = rest.split('/');

        let mut parsed = match segments.next() {
            Some("NodeList") => {
                let node = selector(path, segments.next())?;
                if segments.next() != Some("DeviceList") {
                    return Err(invalid(path, "expected DeviceList after node index"));
                }
                let device = selector(path, segments.next())?;
                ConfigPath::Device {
                    node,
                    device,
                    type_filter: None,
                }
            }
            Some("ChannelList") => ConfigPath::Channel {
                channel: selector(path, segments.next())?,
                type_filter: None,
            },
            _ => return Err(invalid(path, "expected NodeList or ChannelList")),
        };

        match segments.next() {
            None => {}
            Some(segment) => {
                let name = segment
                    .strip_prefix('$')
                    .ok_or_else(|| invalid(path, "unexpected trailing segment"))?;
                let object_type = ObjectType::from_name(name)?;
                let fits = match parsed {
                    ConfigPath::Device { .. } => object_type.is_device(),
                    ConfigPath::Channel { .. } => !object_type.is_device(),
                };
                if !fits {
                    return Err(invalid(path, "type filter does not match object kind"));
                }
                match &mut parsed {
                    ConfigPath::Device { type_filter, .. }
                    | ConfigPath::Channel { type_filter, .. } => *type_filter = Some(object_type),
                }
            }
        }
        if segments.next().is_some() {
            return Err(invalid(path, "unexpected trailing segment"));
        }
        Ok(parsed)
    }
}

impl fmt::Display for ConfigPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigPath::Device { node, device, .. } => {
                write!(f, "/NodeList/{}/DeviceList/{}", node, device)?
            }
            ConfigPath::Channel { channel, .. } => write!(f, "/ChannelList/{}", channel)?,
        }
        if let Some(t) = self.type_filter() {
            write!(f, "/${}", t)?;
        }
        Ok(())
    }
}
