// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use vmxml_types::DeviceAddress;

/// Key present in the parameters of payload (configuration injection)
/// devices.
pub const PAYLOAD_KEY: &str = "vmPayload";

/// Stored, loosely-typed device parameters. These are converted into typed
/// per-kind records when devices are classified.
pub type SpecParams = BTreeMap<String, Value>;

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
pub struct DeviceId {
    pub device_id: Uuid,
    pub vm_id: Uuid,
}

impl DeviceId {
    pub fn new(device_id: Uuid, vm_id: Uuid) -> Self {
        Self { device_id, vm_id }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceGeneralType {
    Disk,
    Interface,
    Video,
    Graphics,
    Sound,
    Controller,
    Balloon,
    Channel,
    Redir,
    Redirdev,
    Console,
    Rng,
    Smartcard,
    Watchdog,
    Hostdev,
    Memory,
    #[serde(other)]
    Unknown,
}

/// A device as stored for a VM.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub general_type: DeviceGeneralType,
    /// Subtype name, e.g. `disk`, `cdrom`, `bridge`, `qxl`, `virtio-scsi`.
    pub device: String,
    #[serde(default)]
    pub spec_params: SpecParams,
    #[serde(default)]
    pub address: DeviceAddress,
    #[serde(default)]
    pub boot_order: u32,
    #[serde(default = "yes")]
    pub plugged: bool,
    #[serde(default = "yes")]
    pub managed: bool,
    #[serde(default)]
    pub read_only: bool,
    /// Set on transient disks.
    #[serde(default)]
    pub snapshot_id: Option<Uuid>,
}

fn yes() -> bool {
    true
}

impl Device {
    /// A plugged, managed device with no parameters or address.
    pub fn new(
        id: DeviceId,
        general_type: DeviceGeneralType,
        device: impl Into<String>,
    ) -> Self {
        Self {
            id,
            general_type,
            device: device.into(),
            spec_params: SpecParams::new(),
            address: DeviceAddress::default(),
            boot_order: 0,
            plugged: true,
            managed: true,
            read_only: false,
            snapshot_id: None,
        }
    }

    pub fn is_payload(&self) -> bool {
        self.spec_params.contains_key(PAYLOAD_KEY)
    }

    pub(crate) fn params(&self) -> ParamReader<'_> {
        ParamReader { params: &self.spec_params }
    }
}

/// A device parameter that is required but absent, or present with a value
/// of the wrong shape.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParamError {
    #[error("missing parameter {0:?}")]
    Missing(&'static str),

    #[error("parameter {key:?} has unusable value {value}")]
    Invalid { key: &'static str, value: String },
}

/// Typed access to [`SpecParams`]. Scalars stored either as JSON strings or
/// as JSON numbers/booleans are accepted.
pub(crate) struct ParamReader<'a> {
    params: &'a SpecParams,
}

impl<'a> ParamReader<'a> {
    pub fn contains(&self, key: &str) -> bool {
        self.params.contains_key(key)
    }

    pub fn opt_string(
        &self,
        key: &'static str,
    ) -> Result<Option<String>, ParamError> {
        match self.params.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(v @ (Value::Number(_) | Value::Bool(_))) => {
                Ok(Some(v.to_string()))
            }
            Some(v) => {
                Err(ParamError::Invalid { key, value: v.to_string() })
            }
        }
    }

    pub fn string(&self, key: &'static str) -> Result<String, ParamError> {
        self.opt_string(key)?.ok_or(ParamError::Missing(key))
    }

    pub fn opt_u64(
        &self,
        key: &'static str,
    ) -> Result<Option<u64>, ParamError> {
        match self.params.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n
                .as_u64()
                .map(Some)
                .ok_or(ParamError::Invalid { key, value: n.to_string() }),
            Some(Value::String(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| ParamError::Invalid { key, value: s.clone() }),
            Some(v) => {
                Err(ParamError::Invalid { key, value: v.to_string() })
            }
        }
    }

    pub fn opt_bool(
        &self,
        key: &'static str,
    ) -> Result<Option<bool>, ParamError> {
        match self.params.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(Value::String(s)) => Ok(Some(s.eq_ignore_ascii_case("true"))),
            Some(v) => {
                Err(ParamError::Invalid { key, value: v.to_string() })
            }
        }
    }
}
