//! # mountctl Core Library
//!
//! Control of equatorial telescope mounts speaking the LX200 serial protocol.
//!
//! This library provides:
//! - The LX200 wire codec and a retrying command channel
//! - Pier collision prediction for German equatorial mounts
//! - A non-blocking motion state machine (slew, park, home, jog, abort)
//! - Vendor extensions: sync, tracking rates, UTC offset and clock upkeep
//! - A device driver publishing named values, and a simulated controller
//!
//! ## Supported controllers
//!
//! - Classic Meade LX200 command set
//! - Astro-Physics GTO (legacy and modern firmware)
//!
//! ## Example
//!
//! ```rust,ignore
//! use mountctl_core::prelude::*;
//!
//! let config = MountConfig::load(MountConfig::default_path()?)?;
//! let mut rt = DeviceRuntime::open(&config, LogContext::new("mount"))?;
//! let mut mount = GemDriver::new(config, Arc::new(SystemClock));
//! mount.init(&mut rt)?;
//!
//! mount.set_value(&mut rt, "slew", "05:35:17 -05*23:28")?;
//! loop {
//!     for event in mount.poll(&mut rt)? {
//!         println!("{event:?}");
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod astro;
pub mod collision;
pub mod config;
pub mod device;
pub mod logging;
pub mod mount;
pub mod protocol;
pub mod sim;
pub mod vendor;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::astro::{Clock, ManualClock, Observer, Position, SystemClock};
    pub use crate::collision::{CollisionPredictor, CollisionVerdict, MountGeometry};
    pub use crate::config::{ConfigError, MountConfig};
    pub use crate::device::{Device, DeviceRuntime, GemDriver, Operation, Value, ValueTable};
    pub use crate::logging::LogContext;
    pub use crate::mount::{AxisSide, MotionStateMachine, MountError, MountEvent, MountState};
    pub use crate::protocol::{
        CommandChannel, JogDirection, ProtocolError, ProtocolFlavor, SerialLink, TrackingRate,
    };
    pub use crate::sim::{SimConfig, SimHandle, SimulatedMount};
    pub use crate::vendor::VendorLayer;
    pub use std::sync::Arc;
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
