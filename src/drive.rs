//! `/drive` command dispatch.
//!
//! Four direction lines feed the H-bridge inputs (IN1..IN4) and two PWM
//! channels feed its enable inputs (ENA, ENB). Direction changes the line
//! pattern. Forward and backward also recompute the PWM split from the
//! current [`MotionState`].

use core::fmt;
use core::str::FromStr;

use embedded_hal::digital::{self, Error as _, OutputPin, PinState};
use embedded_hal::pwm::{self, Error as _, SetDutyCycle};
use log::{debug, info, warn};

use crate::motion::{DutyProfile, MotionState, TurnBias};
use crate::query::{query_string, query_value};

pub const DIRECTION_KEY: &str = "dir";

const FORWARD_LINES: [PinState; 4] = [
    PinState::High,
    PinState::Low,
    PinState::High,
    PinState::Low,
];
const BACKWARD_LINES: [PinState; 4] = [
    PinState::Low,
    PinState::High,
    PinState::Low,
    PinState::High,
];
const STOP_LINES: [PinState; 4] = [PinState::Low; 4];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
    Left,
    Right,
    Nitro,
    /// Releases the direction lines. PWM duty is left as is.
    Stop,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Nitro => "nitro",
            Direction::Stop => "stop",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown direction `{0}`")]
pub struct UnknownDirection(pub String);

impl FromStr for Direction {
    type Err = UnknownDirection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "forward" => Ok(Direction::Forward),
            "backward" => Ok(Direction::Backward),
            "left" => Ok(Direction::Left),
            "right" => Ok(Direction::Right),
            "nitro" => Ok(Direction::Nitro),
            "stop" => Ok(Direction::Stop),
            other => Err(UnknownDirection(other.to_owned())),
        }
    }
}

/// What the HTTP layer should answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriveOutcome {
    /// Command applied, or no command given.
    Ack,
    /// Unrecognized direction. Nothing was changed.
    Rejected,
}

impl DriveOutcome {
    pub fn status(&self) -> u16 {
        match self {
            DriveOutcome::Ack => 200,
            DriveOutcome::Rejected => 400,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            DriveOutcome::Ack => "OK",
            DriveOutcome::Rejected => "Bad Request",
        }
    }

    pub fn body(&self) -> &'static str {
        match self {
            DriveOutcome::Ack => "Drive OK",
            DriveOutcome::Rejected => "Invalid direction",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DriveError {
    #[error("direction line {line} failed: {kind:?}")]
    Line {
        line: usize,
        kind: digital::ErrorKind,
    },
    #[error("pwm channel {channel} failed: {kind:?}")]
    Duty {
        channel: usize,
        kind: pwm::ErrorKind,
    },
}

/// Owns the motor driver outputs and the motion state they depend on.
pub struct DriveController<P, C> {
    lines: [P; 4],
    channels: [C; 2],
    profile: DutyProfile,
    state: MotionState,
}

impl<P, C> DriveController<P, C>
where
    P: OutputPin,
    C: SetDutyCycle,
{
    pub fn new(lines: [P; 4], channels: [C; 2], profile: DutyProfile) -> Self {
        Self {
            lines,
            channels,
            profile,
            state: MotionState::default(),
        }
    }

    pub fn apply(&mut self, direction: Direction) -> Result<(), DriveError> {
        match direction {
            Direction::Forward => {
                self.set_lines(FORWARD_LINES)?;
                self.update_duty()
            }
            Direction::Backward => {
                self.set_lines(BACKWARD_LINES)?;
                self.update_duty()
            }
            Direction::Left => {
                self.state.set_bias(TurnBias::Left);
                Ok(())
            }
            Direction::Right => {
                self.state.set_bias(TurnBias::Right);
                Ok(())
            }
            Direction::Nitro => {
                self.state.toggle_boost();
                Ok(())
            }
            Direction::Stop => self.set_lines(STOP_LINES),
        }
    }

    /// Handle a `/drive` request URI.
    ///
    /// A request without a `dir` value is acknowledged and changes nothing.
    pub fn dispatch(&mut self, uri: &str) -> Result<DriveOutcome, DriveError> {
        let Some(value) = query_string(uri).and_then(|query| query_value(query, DIRECTION_KEY))
        else {
            debug!("No direction in {uri}");
            return Ok(DriveOutcome::Ack);
        };

        match value.parse::<Direction>() {
            Ok(direction) => {
                self.apply(direction)?;
                info!(
                    "Drive {direction} (boost: {}, bias: {:?})",
                    self.state.boost(),
                    self.state.bias()
                );
                Ok(DriveOutcome::Ack)
            }
            Err(err) => {
                warn!("Rejected drive request: {err}");
                Ok(DriveOutcome::Rejected)
            }
        }
    }

    fn set_lines(&mut self, levels: [PinState; 4]) -> Result<(), DriveError> {
        for (line, (pin, level)) in self.lines.iter_mut().zip(levels).enumerate() {
            pin.set_state(level)
                .map_err(|e| DriveError::Line { line, kind: e.kind() })?;
        }
        Ok(())
    }

    fn update_duty(&mut self) -> Result<(), DriveError> {
        let duty = self.state.duty(&self.profile);
        let targets = [duty.channel0, duty.channel1];

        for (channel, (pwm, target)) in self.channels.iter_mut().zip(targets).enumerate() {
            let target = target.min(pwm.max_duty_cycle());
            pwm.set_duty_cycle(target)
                .map_err(|e| DriveError::Duty { channel, kind: e.kind() })?;
        }
        Ok(())
    }
}

#[cfg(test)]
impl<P, C> DriveController<P, C> {
    fn state(&self) -> MotionState {
        self.state
    }
}
