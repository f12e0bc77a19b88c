use climate_panel_common::{
    config::{MAX_AC_TEMP_C, MIN_AC_TEMP_C},
    CommandFrame, FanLevel, PowerState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteButton {
    Send,
    Fan,
    TempUp,
    TempDown,
    Off,
}

/// Tracks what the AC believes its settings are, so a command can be
/// translated into the button presses that reach it.
#[derive(Debug, Clone)]
pub struct AcRemote {
    power: PowerState,
    temp_c: i32,
    fan: FanLevel,
}

impl Default for AcRemote {
    fn default() -> Self {
        Self {
            power: PowerState::Off,
            temp_c: 18,
            fan: FanLevel::Low,
        }
    }
}

impl AcRemote {
    pub fn power(&self) -> PowerState {
        self.power
    }

    pub fn temp_c(&self) -> i32 {
        self.temp_c
    }

    pub fn fan(&self) -> FanLevel {
        self.fan
    }

    pub fn apply(&mut self, frame: &CommandFrame) -> Vec<RemoteButton> {
        match frame.power {
            PowerState::On => {
                let mut presses = self.set_fan(frame.fan);
                presses.extend(self.set_temperature(frame.target));
                presses
            }
            PowerState::Off => self.turn_off(),
        }
    }

    pub fn set_fan(&mut self, target: FanLevel) -> Vec<RemoteButton> {
        let mut presses = Vec::new();
        while self.fan != target {
            presses.push(RemoteButton::Fan);
            self.fan = self.fan.next();
        }
        presses.push(self.send());
        presses
    }

    pub fn set_temperature(&mut self, target_c: i32) -> Vec<RemoteButton> {
        let target_c = target_c.clamp(MIN_AC_TEMP_C, MAX_AC_TEMP_C);
        let mut presses = Vec::new();
        while self.temp_c < target_c {
            presses.push(RemoteButton::TempUp);
            self.temp_c += 1;
        }
        while self.temp_c > target_c {
            presses.push(RemoteButton::TempDown);
            self.temp_c -= 1;
        }
        presses.push(self.send());
        presses
    }

    pub fn turn_off(&mut self) -> Vec<RemoteButton> {
        self.power = PowerState::Off;
        vec![RemoteButton::Off]
    }

    fn send(&mut self) -> RemoteButton {
        self.power = PowerState::On;
        RemoteButton::Send
    }
}
