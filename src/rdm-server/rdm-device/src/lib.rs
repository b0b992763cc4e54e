// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Device driver registry.
//!
//! A driver bundles the link and wire codec for one controller protocol
//! family. Drivers register under a stable name; the server instantiates
//! them from configuration.

use std::collections::HashMap;

use rdm_app::normalize_name;
use rdm_comm::{CommLink, SerialLink, TcpLink, WireCodec};
use rdm_core::DynResult;
use rdm_device_m170::M170Codec;

mod dummy;

pub use dummy::{DummyCodec, DummyLink};

/// Connection details for reaching a controller drop.
#[derive(Debug, Clone)]
pub enum LinkAccess {
    Serial { path: String, baud: u32 },
    Tcp { addr: String },
    Loopback,
}

/// Link and codec pair for one controller.
pub struct DeviceBundle {
    pub link: Box<dyn CommLink>,
    pub codec: Box<dyn WireCodec>,
}

pub type DriverFactory = fn(LinkAccess) -> DynResult<DeviceBundle>;

/// Registry of protocol drivers by name.
pub struct DriverRegistry {
    factories: HashMap<String, DriverFactory>,
}

impl DriverRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a driver factory under a stable name (e.g. "m170").
    pub fn register_driver(&mut self, name: &str, factory: DriverFactory) {
        let key = normalize_name(name);
        self.factories.insert(key, factory);
    }

    /// Check whether a driver name is registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.factories.contains_key(&normalize_name(name))
    }

    /// List registered driver names.
    pub fn registered_drivers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Instantiate the link and codec for a named protocol.
    pub fn build(&self, name: &str, access: LinkAccess) -> DynResult<DeviceBundle> {
        let key = normalize_name(name);
        let factory = self
            .factories
            .get(&key)
            .ok_or_else(|| format!("Unknown device driver: {}", name))?;
        factory(access)
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Register all built-in drivers on a registry.
pub fn register_builtin_drivers_on(registry: &mut DriverRegistry) {
    registry.register_driver("dummy", dummy_factory);
    registry.register_driver("m170", m170_factory);
}

fn dummy_factory(_access: LinkAccess) -> DynResult<DeviceBundle> {
    Ok(DeviceBundle {
        link: Box::new(dummy::DummyLink::new()),
        codec: Box::new(dummy::DummyCodec),
    })
}

fn m170_factory(access: LinkAccess) -> DynResult<DeviceBundle> {
    let link: Box<dyn CommLink> = match access {
        LinkAccess::Serial { path, baud } => Box::new(SerialLink::open(&path, baud)?),
        LinkAccess::Tcp { addr } => Box::new(TcpLink::connect_std(&addr)?),
        LinkAccess::Loopback => return Err("m170 requires a serial or TCP drop".into()),
    };
    Ok(DeviceBundle {
        link,
        codec: Box::new(M170Codec::new()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registration() {
        let mut registry = DriverRegistry::new();
        register_builtin_drivers_on(&mut registry);
        assert!(registry.is_registered("dummy"));
        assert!(registry.is_registered("M-170"));
        assert_eq!(registry.registered_drivers(), vec!["dummy", "m170"]);
    }

    #[test]
    fn test_unknown_driver_rejected() {
        let registry = DriverRegistry::new();
        assert!(registry.build("ntcip", LinkAccess::Loopback).is_err());
    }

    #[test]
    fn test_dummy_builds_on_loopback() {
        let mut registry = DriverRegistry::new();
        register_builtin_drivers_on(&mut registry);
        assert!(registry.build("dummy", LinkAccess::Loopback).is_ok());
    }
}
