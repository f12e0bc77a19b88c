pub mod config;
pub mod control;
pub mod protocol;
pub mod types;

pub use config::{DeviceConfig, PanelConfig};
pub use control::{ControlState, DashboardCommand};
pub use protocol::{CommandFrame, ProtocolError, ACK_REPLY};
pub use types::{FanLevel, PowerState};
