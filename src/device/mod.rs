mod manager;
mod panel;
mod protocol;

pub use manager::{DeviceInfo, DeviceManager, InputEvent};
pub use panel::Panel;
pub use protocol::*;
