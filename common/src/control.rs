use crate::{
    config::PanelConfig,
    protocol::CommandFrame,
    types::{FanLevel, PowerState},
};

pub const NEVER_SEEN: &str = "[---]";
pub const ELAPSED_HIDDEN: &str = "---";

/// Desired AC state shared between the dashboard and the polling device.
#[derive(Debug, Clone)]
pub struct ControlState {
    power: PowerState,
    target_temp: i32,
    fan_level: FanLevel,

    command_pending: bool,
    device_acked: bool,
    show_elapsed: bool,

    on_since_ms: u64,
    last_device_contact: Option<String>,
}

/// Values submitted through the dashboard form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardCommand {
    pub power: PowerState,
    pub target_temp: Option<i32>,
    pub fan_level: Option<FanLevel>,
}

impl Default for ControlState {
    fn default() -> Self {
        Self::new(&PanelConfig::default())
    }
}

impl ControlState {
    pub fn new(config: &PanelConfig) -> Self {
        Self {
            power: PowerState::Off,
            target_temp: config.initial_target,
            fan_level: config.fan_level,
            command_pending: false,
            device_acked: false,
            show_elapsed: false,
            on_since_ms: 0,
            last_device_contact: None,
        }
    }

    pub fn power(&self) -> PowerState {
        self.power
    }

    pub fn target_temp(&self) -> i32 {
        self.target_temp
    }

    pub fn fan_level(&self) -> FanLevel {
        self.fan_level
    }

    pub fn is_command_pending(&self) -> bool {
        self.command_pending
    }

    pub fn is_device_acked(&self) -> bool {
        self.device_acked
    }

    pub fn is_showing_elapsed(&self) -> bool {
        self.show_elapsed
    }

    pub fn last_device_contact(&self) -> &str {
        self.last_device_contact.as_deref().unwrap_or(NEVER_SEEN)
    }

    pub fn apply_dashboard(&mut self, command: DashboardCommand) {
        self.power = command.power;
        if let Some(target) = command.target_temp {
            self.target_temp = target;
        }
        if let Some(fan) = command.fan_level {
            self.fan_level = fan;
        }
        self.command_pending = true;
    }

    pub fn record_device_contact(&mut self, stamp: String) {
        self.last_device_contact = Some(stamp);
    }

    /// Leaves `command_pending` untouched; only an ack clears it.
    pub fn command_frame(&self) -> CommandFrame {
        CommandFrame {
            pending: self.command_pending,
            power: self.power,
            target: self.target_temp,
            fan: self.fan_level,
        }
    }

    pub fn acknowledge(&mut self) {
        self.command_pending = false;
        self.device_acked = true;
        self.show_elapsed = self.power.is_on();
    }

    /// Consumes the pending ack notice. Returns true at most once per ack and
    /// restarts the on-timer when the system is on.
    pub fn take_ack_notice(&mut self, now_ms: u64) -> bool {
        if !self.device_acked {
            return false;
        }
        self.device_acked = false;
        if self.power.is_on() {
            self.on_since_ms = now_ms;
        }
        true
    }

    pub fn elapsed_on(&self, now_ms: u64) -> String {
        if !self.show_elapsed {
            return ELAPSED_HIDDEN.to_string();
        }
        format_elapsed(now_ms.saturating_sub(self.on_since_ms) / 1_000)
    }
}

/// Renders a duration in seconds; hours wrap at a day.
pub fn format_elapsed(total_secs: u64) -> String {
    let hours = (total_secs / 3_600) % 24;
    let minutes = (total_secs / 60) % 60;
    let seconds = total_secs % 60;

    if total_secs > 3_600 {
        format!("{hours:02}h{minutes:02}m{seconds:02}s")
    } else if total_secs > 60 {
        format!("{minutes:02} minutes, {seconds:02} seconds")
    } else {
        format!("{seconds:02} sec")
    }
}
