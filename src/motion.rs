//! Motion state shared by the drive commands.
//!
//! Holds the nitro flag and the turn bias, and turns them into a duty split
//! for the two drive channels whenever the car moves forward or backward.

/// Which side of the car runs at half duty while driving.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TurnBias {
    /// Channel 1 runs at half duty. Set at boot.
    #[default]
    Right,
    /// Channel 0 runs at half duty.
    Left,
    /// Both channels run at full duty. No command selects it.
    Neutral,
}

/// Raw duty presets, in PWM timer counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DutyProfile {
    pub nominal: u16,
    pub boost: u16,
}

impl Default for DutyProfile {
    /// 50% and 100% at 8-bit resolution.
    fn default() -> Self {
        Self {
            nominal: 128,
            boost: 255,
        }
    }
}

/// Duty for each drive channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelDuty {
    pub channel0: u16,
    pub channel1: u16,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MotionState {
    boost: bool,
    bias: TurnBias,
}

impl MotionState {
    pub fn boost(&self) -> bool {
        self.boost
    }

    pub fn bias(&self) -> TurnBias {
        self.bias
    }

    pub fn toggle_boost(&mut self) {
        self.boost = !self.boost;
    }

    pub fn set_bias(&mut self, bias: TurnBias) {
        self.bias = bias;
    }

    /// Split between the two channels for the current boost flag and bias.
    pub fn duty(&self, profile: &DutyProfile) -> ChannelDuty {
        let full = if self.boost {
            profile.boost
        } else {
            profile.nominal
        };
        let half = full / 2;

        match self.bias {
            TurnBias::Right => ChannelDuty {
                channel0: full,
                channel1: half,
            },
            TurnBias::Left => ChannelDuty {
                channel0: half,
                channel1: full,
            },
            TurnBias::Neutral => ChannelDuty {
                channel0: full,
                channel1: full,
            },
        }
    }
}
