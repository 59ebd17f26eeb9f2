//! Core types, constants, and wire formats for the boltlink smart-lock client.
//!
//! This crate defines the frame header handling, command and notification
//! constants, result codes, serial-number parsing, and the byte-level parsers
//! for device settings and firmware version responses.

pub mod command;
pub mod error;
pub mod frame;
pub mod serial;
pub mod settings;
pub mod version;

pub use command::{CommandParam, LockState, LockStatus, ResultCode};
pub use error::{FrameError, SerialError, WireError};
pub use frame::{FrameKind, InboundFrame};
pub use serial::SerialNumber;
pub use settings::DeviceSettings;
pub use version::FirmwareVersion;
