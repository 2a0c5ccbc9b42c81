//! A single switch port: an ingress write port paired with an egress read
//! port.

use crate::buffer::{ReadPortId, WritePortId};

use super::plugin::EgressPlugin;
use super::vlan::PortVlanConfig;

pub struct SwitchPort {
    pub index: u8,
    pub write_port: WritePortId,
    pub read_port: ReadPortId,
    pub enabled: bool,
    pub promiscuous: bool,
    pub vlan: PortVlanConfig,
    pub egress_plugins: Vec<Box<dyn EgressPlugin>>,
}

impl SwitchPort {
    pub(crate) fn new(index: u8, write_port: WritePortId, read_port: ReadPortId) -> Self {
        Self {
            index,
            write_port,
            read_port,
            enabled: true,
            promiscuous: false,
            vlan: PortVlanConfig::default(),
            egress_plugins: Vec::new(),
        }
    }
}
