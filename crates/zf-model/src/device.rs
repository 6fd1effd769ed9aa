//! HVAC device seam.
//!
//! Real drivers live outside this workspace; the core only issues
//! [`HvacCommand`]s through [`HvacDevice`].

use crate::error::ModelResult;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HvacMode {
    Cooling,
    Heating,
}

impl fmt::Display for HvacMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HvacMode::Cooling => write!(f, "cooling"),
            HvacMode::Heating => write!(f, "heating"),
        }
    }
}

/// What to tell a device. `demand` and `fan_speed` are in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HvacCommand {
    pub mode: Option<HvacMode>,
    pub demand: f64,
    pub fan_speed: f64,
}

impl HvacCommand {
    pub fn off(mode: Option<HvacMode>) -> Self {
        Self {
            mode,
            demand: 0.0,
            fan_speed: 0.0,
        }
    }
}

/// A piece of equipment the core can drive.
pub trait HvacDevice: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Modes this device can operate in.
    fn modes(&self) -> &[HvacMode];

    fn apply(&self, command: HvacCommand) -> ModelResult<()>;
}

/// Device that only remembers what it was told. Used for dry runs and tests.
#[derive(Debug)]
pub struct NullDevice {
    name: String,
    modes: Vec<HvacMode>,
    commands: Mutex<Vec<HvacCommand>>,
}

impl NullDevice {
    pub fn new(name: impl Into<String>, modes: impl IntoIterator<Item = HvacMode>) -> Self {
        Self {
            name: name.into(),
            modes: modes.into_iter().collect(),
            commands: Mutex::new(Vec::new()),
        }
    }

    /// Every command applied so far, oldest first.
    pub fn commands(&self) -> Vec<HvacCommand> {
        self.commands.lock().clone()
    }

    pub fn last(&self) -> Option<HvacCommand> {
        self.commands.lock().last().copied()
    }
}

impl HvacDevice for NullDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn modes(&self) -> &[HvacMode] {
        &self.modes
    }

    fn apply(&self, command: HvacCommand) -> ModelResult<()> {
        debug!(device = %self.name, ?command, "apply");
        self.commands.lock().push(command);
        Ok(())
    }
}
