//! Vehicle identities within a session

use std::fmt;

use serde::{Deserialize, Serialize};

/// Who is controlling a vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlClass {
    /// The player on this machine
    Local,
    /// Another human, connected remotely
    RemoteHuman,
    /// Computer controlled
    Ai,
}

impl ControlClass {
    pub fn as_str(self) -> &'static str {
        match self {
            ControlClass::Local => "local",
            ControlClass::RemoteHuman => "remote",
            ControlClass::Ai => "ai",
        }
    }
}

impl fmt::Display for ControlClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable key for a vehicle within a session.
///
/// Two entries with the same driver name but a different control class are
/// different vehicles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VehicleIdentity {
    driver: String,
    control: ControlClass,
}

impl VehicleIdentity {
    pub fn new(driver: impl Into<String>, control: ControlClass) -> Self {
        Self { driver: driver.into(), control }
    }

    pub fn driver(&self) -> &str {
        &self.driver
    }

    pub fn control(&self) -> ControlClass {
        self.control
    }

    pub fn is_local(&self) -> bool {
        self.control == ControlClass::Local
    }
}

impl fmt::Display for VehicleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.driver, self.control)
    }
}
