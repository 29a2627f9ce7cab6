//! Transport layer module.

pub mod mock;
pub mod nusb;
pub mod traits;

pub use mock::{MockDevice, UsbOp};
pub use nusb::NusbDevice;
pub use traits::{TransportError, UsbDevice};
