// ==============================================================================
// input.rs — KEY EVENTS -> CONTROL INTENT -> DRIVE COMMAND
// ------------------------------------------------------------------------------
// - InputMapper keeps one boolean per action, set on press, cleared on release.
// - begin_frame() snapshots the flags once per frame. Jump is latched on the
//   press edge and handed out by exactly one snapshot; holding Space never
//   re-arms it.
// - DriveCommand::shape() turns an intent into engine / brake / steer values:
//     accelerate          -> +engine_force on driven wheels
//     brake, moving fwd   -> brake_force on every wheel
//     brake, slow/backing -> -engine_force * reverse_ratio (reverse)
//     left / right        -> ±steering_authority(speed) on steerable wheels
// ==============================================================================

use std::fmt;
use std::str::FromStr;

use rapier3d::prelude::Real;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SandboxError};
use crate::tire::steering_authority;
use crate::vehicle::Vehicle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Accelerate,
    Brake,
    Left,
    Right,
    Jump,
}

impl Action {
    pub const ALL: [Action; 5] = [Action::Accelerate, Action::Brake, Action::Left, Action::Right, Action::Jump];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Accelerate => "accelerate",
            Action::Brake => "brake",
            Action::Left => "left",
            Action::Right => "right",
            Action::Jump => "jump",
        }
    }

    /// Browser `KeyboardEvent.code` values bound to an action.
    pub fn from_key_code(code: &str) -> Option<Self> {
        match code {
            "KeyW" | "ArrowUp" => Some(Action::Accelerate),
            "KeyS" | "ArrowDown" => Some(Action::Brake),
            "KeyA" | "ArrowLeft" => Some(Action::Left),
            "KeyD" | "ArrowRight" => Some(Action::Right),
            "Space" => Some(Action::Jump),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = SandboxError;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(action) = Action::from_key_code(s) {
            return Ok(action);
        }
        let lower = s.trim().to_ascii_lowercase();
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == lower)
            .ok_or_else(|| SandboxError::invalid_config(format!("unknown action '{s}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub action: Action,
    pub pressed: bool,
}

impl KeyEvent {
    pub fn press(action: Action) -> Self {
        Self { action, pressed: true }
    }

    pub fn release(action: Action) -> Self {
        Self { action, pressed: false }
    }
}

/// Frame snapshot of the held keys plus a one-shot jump.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ControlIntent {
    pub accelerate: bool,
    pub brake: bool,
    pub left: bool,
    pub right: bool,
    pub jump: bool,
}

/// Held key flags plus the jump latch.
///
/// A jump press stays armed until the vehicle actually fires it, so a press
/// held through a landing jumps on touchdown. Releasing the key disarms it
/// after the next frame has had one chance at it.
#[derive(Debug, Clone, Default)]
pub struct InputMapper {
    held: ControlIntent,
    jump_armed: bool,
}

impl InputMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&mut self, event: KeyEvent) {
        if event.pressed {
            self.press(event.action);
        } else {
            self.release(event.action);
        }
    }

    pub fn press(&mut self, action: Action) {
        match action {
            Action::Accelerate => self.held.accelerate = true,
            Action::Brake => self.held.brake = true,
            Action::Left => self.held.left = true,
            Action::Right => self.held.right = true,
            Action::Jump => {
                // key repeat sends more presses while held; only the edge counts
                if !self.held.jump {
                    self.jump_armed = true;
                }
                self.held.jump = true;
            }
        }
    }

    pub fn release(&mut self, action: Action) {
        match action {
            Action::Accelerate => self.held.accelerate = false,
            Action::Brake => self.held.brake = false,
            Action::Left => self.held.left = false,
            Action::Right => self.held.right = false,
            Action::Jump => self.held.jump = false,
        }
    }

    /// Snapshot for this frame. An armed jump is offered every frame while
    /// the key is held; a released key gets this one frame.
    pub fn begin_frame(&mut self) -> ControlIntent {
        let jump = self.jump_armed;
        if !self.held.jump {
            self.jump_armed = false;
        }
        ControlIntent { jump, ..self.held }
    }

    /// The vehicle fired the offered jump; the press edge is used up.
    pub fn jump_fired(&mut self) {
        self.jump_armed = false;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub engine_force: Real,             // N per driven wheel
    pub reverse_ratio: Real,
    pub brake_force: Real,              // N per wheel
    pub max_steer: Real,                // rad at standstill
    pub min_steer: Real,                // rad floor at speed
    pub steer_speed_cap: Real,          // m/s where the fade bottoms out
    pub reverse_speed_threshold: Real,  // m/s forward above which S brakes
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            engine_force: 1400.0,
            reverse_ratio: 0.6,
            brake_force: 6000.0,
            max_steer: 0.6,
            min_steer: 0.18,
            steer_speed_cap: 60.0,
            reverse_speed_threshold: 1.0,
        }
    }
}

impl DriveConfig {
    pub fn validate(&self) -> Result<()> {
        let non_negative = [
            ("engine_force", self.engine_force),
            ("reverse_ratio", self.reverse_ratio),
            ("brake_force", self.brake_force),
            ("min_steer", self.min_steer),
            ("reverse_speed_threshold", self.reverse_speed_threshold),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(SandboxError::invalid_config(format!("drive.{name} must be non-negative, got {value}")));
            }
        }
        if !self.steer_speed_cap.is_finite() || self.steer_speed_cap <= 0.0 {
            return Err(SandboxError::invalid_config("drive.steer_speed_cap must be positive"));
        }
        if !self.max_steer.is_finite() || self.max_steer < self.min_steer {
            return Err(SandboxError::invalid_config("drive.max_steer must be at least min_steer"));
        }
        Ok(())
    }
}

/// Per-frame vehicle command derived from an intent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DriveCommand {
    pub engine_force: Real,
    pub brake_force: Real,
    pub steering: Real,
    pub jump: bool,
}

impl DriveCommand {
    /// `forward_speed` is signed along the chassis forward axis, `speed` is
    /// the chassis speed magnitude used for steering authority.
    pub fn shape(intent: &ControlIntent, drive: &DriveConfig, forward_speed: Real, speed: Real) -> Self {
        let mut cmd = DriveCommand { jump: intent.jump, ..Default::default() };

        if intent.accelerate {
            cmd.engine_force += drive.engine_force;
        }
        if intent.brake {
            if forward_speed > drive.reverse_speed_threshold {
                cmd.brake_force = drive.brake_force;
            } else {
                cmd.engine_force -= drive.engine_force * drive.reverse_ratio;
            }
        }

        let authority = steering_authority(speed, drive.max_steer, drive.min_steer, drive.steer_speed_cap);
        if intent.left {
            cmd.steering += authority;
        }
        if intent.right {
            cmd.steering -= authority;
        }
        cmd
    }

    /// Push the command into the vehicle's per-wheel controls.
    pub fn apply(&self, vehicle: &mut Vehicle) -> Result<()> {
        let roles: Vec<(bool, bool)> = vehicle.wheels().iter().map(|w| (w.config.driven, w.config.steerable)).collect();
        for (i, (driven, steerable)) in roles.into_iter().enumerate() {
            if driven {
                vehicle.apply_engine_force(self.engine_force, i)?;
            }
            if steerable {
                vehicle.set_steering_value(self.steering, i)?;
            }
            vehicle.set_brake(self.brake_force, i)?;
        }
        if self.jump {
            vehicle.request_jump();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn parses_names_and_key_codes() {
        assert_eq!("accelerate".parse::<Action>().unwrap(), Action::Accelerate);
        assert_eq!("Jump".parse::<Action>().unwrap(), Action::Jump);
        assert_eq!("ArrowLeft".parse::<Action>().unwrap(), Action::Left);
        assert_eq!("KeyD".parse::<Action>().unwrap(), Action::Right);
        assert_eq!("Space".parse::<Action>().unwrap(), Action::Jump);
        assert!("KeyQ".parse::<Action>().is_err());
    }

    #[test]
    fn held_flags_survive_frames() {
        let mut m = InputMapper::new();
        m.press(Action::Accelerate);
        assert!(m.begin_frame().accelerate);
        assert!(m.begin_frame().accelerate);
        m.release(Action::Accelerate);
        assert!(!m.begin_frame().accelerate);
    }

    #[test]
    fn jump_fires_once_per_press_edge() {
        let mut m = InputMapper::new();
        m.press(Action::Jump);
        m.press(Action::Jump); // key repeat
        assert!(m.begin_frame().jump);
        m.jump_fired();
        assert!(!m.begin_frame().jump);
        m.release(Action::Jump);
        m.press(Action::Jump);
        assert!(m.begin_frame().jump);
    }

    #[test]
    fn held_jump_stays_armed_until_fired() {
        let mut m = InputMapper::new();
        m.press(Action::Jump);
        for _ in 0..5 {
            // refused while airborne
            assert!(m.begin_frame().jump);
        }
        m.jump_fired();
        assert!(!m.begin_frame().jump);
    }

    #[test]
    fn released_jump_gets_one_more_frame() {
        let mut m = InputMapper::new();
        m.press(Action::Jump);
        assert!(m.begin_frame().jump);
        m.release(Action::Jump);
        assert!(m.begin_frame().jump);
        assert!(!m.begin_frame().jump);
    }

    #[test]
    fn tap_between_frames_still_jumps() {
        let mut m = InputMapper::new();
        m.handle(KeyEvent::press(Action::Jump));
        m.handle(KeyEvent::release(Action::Jump));
        assert!(m.begin_frame().jump);
        assert!(!m.begin_frame().jump);
    }

    #[test]
    fn brake_key_brakes_then_reverses() {
        let drive = DriveConfig::default();
        let intent = ControlIntent { brake: true, ..Default::default() };

        let moving = DriveCommand::shape(&intent, &drive, 10.0, 10.0);
        assert_eq!(moving.brake_force, drive.brake_force);
        assert_eq!(moving.engine_force, 0.0);

        let stopped = DriveCommand::shape(&intent, &drive, 0.2, 0.2);
        assert_eq!(stopped.brake_force, 0.0);
        assert_relative_eq!(stopped.engine_force, -drive.engine_force * drive.reverse_ratio);
    }

    #[test]
    fn left_is_positive_and_fades_with_speed() {
        let drive = DriveConfig::default();
        let intent = ControlIntent { left: true, ..Default::default() };
        let slow = DriveCommand::shape(&intent, &drive, 0.0, 0.0);
        let fast = DriveCommand::shape(&intent, &drive, 40.0, 40.0);
        assert_relative_eq!(slow.steering, drive.max_steer);
        assert!(fast.steering > 0.0 && fast.steering < slow.steering);

        let both = ControlIntent { left: true, right: true, ..Default::default() };
        assert_eq!(DriveCommand::shape(&both, &drive, 0.0, 0.0).steering, 0.0);
    }

    #[test]
    fn drive_config_rejects_inverted_steer_range() {
        let drive = DriveConfig { max_steer: 0.1, min_steer: 0.3, ..DriveConfig::default() };
        assert!(drive.validate().is_err());
    }
}
