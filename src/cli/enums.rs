//! CLI enum types.

use clap::ValueEnum;

use crate::camera::DeviceClass;

/// Kiosk form factor, as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DeviceClassArg {
    Phone,
    TabletOrTv,
}

impl From<DeviceClassArg> for DeviceClass {
    fn from(d: DeviceClassArg) -> Self {
        match d {
            DeviceClassArg::Phone => DeviceClass::Phone,
            DeviceClassArg::TabletOrTv => DeviceClass::TabletOrTv,
        }
    }
}
