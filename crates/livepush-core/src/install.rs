use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallMode {
    Immediate,
    OnNextRestart,
    OnNextResume,
    OnNextSuspend,
}

impl InstallMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::OnNextRestart => "on_next_restart",
            Self::OnNextResume => "on_next_resume",
            Self::OnNextSuspend => "on_next_suspend",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "immediate" => Some(Self::Immediate),
            "on_next_restart" | "restart" => Some(Self::OnNextRestart),
            "on_next_resume" | "resume" => Some(Self::OnNextResume),
            "on_next_suspend" | "suspend" => Some(Self::OnNextSuspend),
            _ => None,
        }
    }

    /// Numeric codes a host bridge may pass instead of the mode name.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Immediate),
            1 => Some(Self::OnNextRestart),
            2 => Some(Self::OnNextResume),
            3 => Some(Self::OnNextSuspend),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Immediate => 0,
            Self::OnNextRestart => 1,
            Self::OnNextResume => 2,
            Self::OnNextSuspend => 3,
        }
    }

    pub fn applies_on_restart(self) -> bool {
        !matches!(self, Self::Immediate)
    }

    pub fn applies_on_resume(self) -> bool {
        matches!(self, Self::OnNextResume | Self::OnNextSuspend)
    }
}

/// A deferred install waiting for a lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallOptions {
    pub install_mode: InstallMode,
    /// Seconds the app must spend in the background before a resume applies the update.
    #[serde(default)]
    pub minimum_background_duration: u64,
}

impl InstallOptions {
    pub fn new(install_mode: InstallMode, minimum_background_duration: u64) -> Self {
        Self {
            install_mode,
            minimum_background_duration,
        }
    }

    /// `background_secs` is `None` when no pause was observed in this process.
    pub fn is_due_on_resume(&self, background_secs: Option<u64>) -> bool {
        if !self.install_mode.applies_on_resume() {
            return false;
        }
        match background_secs {
            Some(secs) => secs >= self.minimum_background_duration,
            None => true,
        }
    }
}
