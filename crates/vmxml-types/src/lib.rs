// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fundamental types shared by the vmxml crates.
//!
//! This crate defines the closed sets of values (architectures, disk buses,
//! graphics protocols, ...) and small value types that the engine
//! configuration, the descriptor builder, and the standalone harness all need
//! to agree on, so that each of them can convert to and from these types
//! without depending on one another.

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors produced when parsing one of this crate's types from a string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeParseError {
    #[error("unrecognized {kind} {value:?}")]
    Unrecognized { kind: &'static str, value: String },

    #[error("malformed version string {0:?}")]
    MalformedVersion(String),

    #[error("malformed device address entry {0:?}")]
    MalformedAddressEntry(String),
}

fn unrecognized(kind: &'static str, value: &str) -> TypeParseError {
    TypeParseError::Unrecognized { kind, value: value.to_owned() }
}

/// Implements `Display`, `FromStr`, and string-valued serde for a field-less
/// enum from a table of `(variant, name)` pairs.
macro_rules! string_enum {
    (
        $ty:ident, $kind:literal,
        { $($variant:ident => $name:literal),+ $(,)? }
    ) => {
        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name),+
                }
            }
        }

        impl Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = TypeParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok($ty::$variant),)+
                    _ => Err(unrecognized($kind, s)),
                }
            }
        }

        impl Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'d> Deserialize<'d> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'d>,
            {
                let s = String::deserialize(deserializer)?;
                FromStr::from_str(&s).map_err(de::Error::custom)
            }
        }
    };
}

/// The CPU architecture of a cluster (and therefore of its VMs).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArchitectureType {
    X86_64,
    Ppc64,
    Ppc64le,
}

string_enum!(ArchitectureType, "architecture", {
    X86_64 => "x86_64",
    Ppc64 => "ppc64",
    Ppc64le => "ppc64le",
});

/// Architecture families; most encoding decisions only care about these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArchFamily {
    X86,
    Ppc,
}

impl ArchitectureType {
    pub fn family(&self) -> ArchFamily {
        match self {
            ArchitectureType::X86_64 => ArchFamily::X86,
            ArchitectureType::Ppc64 | ArchitectureType::Ppc64le => {
                ArchFamily::Ppc
            }
        }
    }
}

/// A cluster compatibility version, formatted as "major.minor".
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    major: u32,
    minor: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    #[inline]
    pub fn major(&self) -> u32 {
        self.major
    }

    #[inline]
    pub fn minor(&self) -> u32 {
        self.minor
    }
}

impl FromStr for Version {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || TypeParseError::MalformedVersion(s.to_owned());
        let (major, minor) = s.split_once('.').ok_or_else(malformed)?;
        let major = major.parse().map_err(|_| malformed())?;
        let minor = minor.parse().map_err(|_| malformed())?;
        Ok(Self { major, minor })
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl Serialize for Version {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'d> Deserialize<'d> for Version {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'d>,
    {
        let s = String::deserialize(deserializer)?;
        FromStr::from_str(&s).map_err(de::Error::custom)
    }
}

/// The bus a disk is attached to in the guest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiskInterface {
    Ide,
    VirtIO,
    VirtioScsi,
    SpaprVscsi,
}

string_enum!(DiskInterface, "disk interface", {
    Ide => "ide",
    VirtIO => "virtio",
    VirtioScsi => "virtio_scsi",
    SpaprVscsi => "spapr_vscsi",
});

/// The bus the guest's CD-ROM drives are attached to, as chosen per OS and
/// chipset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CdInterface {
    Ide,
    Scsi,
    Sata,
}

string_enum!(CdInterface, "cd interface", {
    Ide => "ide",
    Scsi => "scsi",
    Sata => "sata",
});

impl CdInterface {
    /// The disk interface that shares index space with CD-ROMs on this bus,
    /// if any.
    pub fn disk_interface(&self) -> Option<DiskInterface> {
        match self {
            CdInterface::Ide => Some(DiskInterface::Ide),
            CdInterface::Scsi => Some(DiskInterface::VirtioScsi),
            CdInterface::Sata => None,
        }
    }
}

/// A remote display protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GraphicsType {
    Spice,
    Vnc,
}

string_enum!(GraphicsType, "graphics type", {
    Spice => "spice",
    Vnc => "vnc",
});

/// The emulated display adapter of a VM.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DisplayType {
    None,
    Qxl,
    Vga,
    Cirrus,
}

string_enum!(DisplayType, "display type", {
    None => "none",
    Qxl => "qxl",
    Vga => "vga",
    Cirrus => "cirrus",
});

/// The emulated chipset, derived from the machine type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChipsetType {
    I440Fx,
    Q35,
}

string_enum!(ChipsetType, "chipset", {
    I440Fx => "i440fx",
    Q35 => "q35",
});

impl ChipsetType {
    pub fn from_machine_type(machine: Option<&str>) -> Self {
        match machine {
            Some(m) if m.contains("q35") => ChipsetType::Q35,
            _ => ChipsetType::I440Fx,
        }
    }
}

/// The placement of a device in the guest, as an ordered list of attributes
/// (`type`, `bus`, `slot`, ...). Supports conversion from the stored string
/// form "{type=pci, slot=0x04}"; an empty string or "{}" is an empty address.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceAddress {
    entries: Vec<(String, String)>,
}

impl DeviceAddress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an attribute, replacing the value of an existing key in place.
    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        let value = value.to_string();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_owned(), value)),
        }
        self
    }

    /// The address of a disk on a drive controller.
    pub fn drive(controller: u32, unit: u32) -> Self {
        Self::new()
            .with("type", "drive")
            .with("controller", controller)
            .with("bus", 0)
            .with("target", 0)
            .with("unit", unit)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromStr for DeviceAddress {
    type Err = TypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let inner = s.trim();
        let inner = inner.strip_prefix('{').unwrap_or(inner);
        let inner = inner.strip_suffix('}').unwrap_or(inner).trim();

        let mut address = DeviceAddress::new();
        if inner.is_empty() {
            return Ok(address);
        }

        for entry in inner.split(',') {
            let (k, v) = entry.split_once('=').ok_or_else(|| {
                TypeParseError::MalformedAddressEntry(entry.trim().to_owned())
            })?;
            let key = k.trim();
            if key.is_empty() {
                return Err(TypeParseError::MalformedAddressEntry(
                    entry.trim().to_owned(),
                ));
            }
            address = address.with(key, v.trim());
        }

        Ok(address)
    }
}

impl Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k}={v}")?;
        }
        f.write_str("}")
    }
}

impl Serialize for DeviceAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if self.is_empty() {
            serializer.serialize_str("")
        } else {
            serializer.serialize_str(&self.to_string())
        }
    }
}

impl<'d> Deserialize<'d> for DeviceAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'d>,
    {
        let s = String::deserialize(deserializer)?;
        FromStr::from_str(&s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_test::{assert_tokens, Token};

    #[test]
    fn device_address_from_str() {
        let addr = DeviceAddress::from_str(
            "{type=pci, slot=0x04, bus=0x00, domain=0x0000, function=0x0}",
        )
        .unwrap();
        let keys: Vec<_> = addr.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["type", "slot", "bus", "domain", "function"]);
        assert_eq!(addr.get("slot"), Some("0x04"));
        assert_eq!(addr.get("unit"), None);

        assert!(DeviceAddress::from_str("").unwrap().is_empty());
        assert!(DeviceAddress::from_str("{}").unwrap().is_empty());
        assert!(DeviceAddress::from_str("{type=pci, slot}").is_err());
        assert!(DeviceAddress::from_str("{=pci}").is_err());
    }

    #[test]
    fn device_address_serialization() {
        let addr = DeviceAddress::new().with("type", "usb").with("port", 1);
        assert_tokens(&addr, &[Token::Str("{type=usb, port=1}")]);
        assert_tokens(&DeviceAddress::new(), &[Token::Str("")]);
    }

    #[test]
    fn drive_address_attribute_order() {
        assert_eq!(
            DeviceAddress::drive(0, 1).to_string(),
            "{type=drive, controller=0, bus=0, target=0, unit=1}"
        );
    }

    #[test]
    fn version_parsing() {
        assert_eq!(Version::from_str("4.1"), Ok(Version::new(4, 1)));
        assert_eq!(Version::new(4, 10).to_string(), "4.10");
        for bad in ["4", "4.x", ".1", "", "4.1.2"] {
            assert!(Version::from_str(bad).is_err(), "{bad:?} parsed");
        }
        assert!(Version::new(4, 2) > Version::new(4, 1));
    }

    #[test]
    fn string_enums_round_trip() {
        for arch in ArchitectureType::ALL {
            assert_eq!(
                ArchitectureType::from_str(arch.as_str()).unwrap(),
                *arch
            );
        }
        assert_eq!(ArchitectureType::Ppc64le.family(), ArchFamily::Ppc);
        assert!(GraphicsType::from_str("rdp").is_err());

        let json = serde_json::to_string(&DiskInterface::VirtioScsi).unwrap();
        assert_eq!(json, "\"virtio_scsi\"");
    }

    #[test]
    fn cd_interface_disk_equivalents() {
        assert_eq!(
            CdInterface::Scsi.disk_interface(),
            Some(DiskInterface::VirtioScsi)
        );
        assert_eq!(CdInterface::Sata.disk_interface(), None);
    }

    #[test]
    fn chipset_from_machine() {
        assert_eq!(
            ChipsetType::from_machine_type(Some("pc-q35-rhel7.3.0")),
            ChipsetType::Q35
        );
        assert_eq!(ChipsetType::from_machine_type(None), ChipsetType::I440Fx);
    }
}
