use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Healthy,
    Thirsty,
    Critical,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Healthy => "healthy",
            Status::Thirsty => "thirsty",
            Status::Critical => "critical",
        }
    }
}

/// Level boundaries for status classification.
///
/// `level >= healthy` is healthy, `level <= critical` is critical,
/// anything in between is thirsty.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusThresholds {
    #[serde(default = "default_healthy")]
    pub healthy: u8,
    #[serde(default = "default_critical")]
    pub critical: u8,
}

fn default_healthy() -> u8 {
    60
}

fn default_critical() -> u8 {
    20
}

impl Default for StatusThresholds {
    fn default() -> Self {
        Self {
            healthy: default_healthy(),
            critical: default_critical(),
        }
    }
}

impl StatusThresholds {
    pub fn classify(&self, level: u8) -> Status {
        if level >= self.healthy {
            Status::Healthy
        } else if level > self.critical {
            Status::Thirsty
        } else {
            Status::Critical
        }
    }

    pub fn is_valid(&self) -> bool {
        self.critical < self.healthy && self.healthy <= 100
    }
}
