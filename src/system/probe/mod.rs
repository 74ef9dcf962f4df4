//! Platform probe layer: one strategy per OS, selected at runtime.

pub mod identify;
pub mod linux;
pub mod macos;
pub mod windows;

use std::process::Command;
use std::time::Duration;

#[cfg(windows)]
use std::os::windows::process::CommandExt;

use anyhow::{bail, Context};

use crate::system::cpu::{FrequencyValue, ProbeResult};

pub use self::identify::IdentificationProbe;
pub use self::linux::LinuxProbe;
pub use self::macos::MacProbe;
pub use self::windows::WindowsProbe;

/// A source of frequency readings for one platform.
///
/// Every method is total: failures come back as `ProbeResult::Unavailable`.
/// Implementations hold no mutable state and may block on I/O or subprocesses.
pub trait FrequencyProbe: Send + Sync {
    /// Short label recorded alongside resolved values.
    fn name(&self) -> &'static str;

    /// Nominal (base) clock.
    fn probe_base(&self) -> ProbeResult;

    /// Turbo ceiling; `base` is already resolved.
    fn probe_max(&self, base: FrequencyValue) -> ProbeResult;

    /// Live clock; `base` is already resolved.
    fn probe_current(&self, base: FrequencyValue) -> ProbeResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Linux,
    MacOs,
    Other,
}

impl Platform {
    pub fn from_os(os: &str) -> Self {
        match os {
            "windows" => Self::Windows,
            "linux" | "android" => Self::Linux,
            "macos" => Self::MacOs,
            _ => Self::Other,
        }
    }

    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    /// Build the probe strategy for this platform.
    pub fn probe(self, counter_delay: Duration) -> Box<dyn FrequencyProbe> {
        match self {
            Self::Windows => Box::new(WindowsProbe::new(counter_delay)),
            Self::Linux => Box::new(LinuxProbe::default()),
            Self::MacOs => Box::new(MacProbe),
            Self::Other => Box::new(IdentificationProbe),
        }
    }
}

/// Pick the strategy for the host OS.
pub fn detect_probe(counter_delay: Duration) -> Box<dyn FrequencyProbe> {
    let platform = Platform::current();
    let probe = platform.probe(counter_delay);
    log::debug!("{:?} host, using {} probe", platform, probe.name());
    probe
}

/// Run a short-lived management query and return its stdout.
/// `output()` waits for the child, so it is reaped on every path.
pub(crate) fn run_query(program: &str, args: &[&str]) -> anyhow::Result<String> {
    let mut command = Command::new(program);
    command.args(args);
    #[cfg(windows)]
    command.creation_flags(0x08000000); // CREATE_NO_WINDOW: prevent console flash

    let output = command
        .output()
        .with_context(|| format!("failed to spawn {}", program))?;
    if !output.status.success() {
        bail!("{} {} exited with {}", program, args.join(" "), output.status);
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_from_os() {
        assert_eq!(Platform::from_os("windows"), Platform::Windows);
        assert_eq!(Platform::from_os("linux"), Platform::Linux);
        assert_eq!(Platform::from_os("macos"), Platform::MacOs);
        assert_eq!(Platform::from_os("freebsd"), Platform::Other);
    }

    #[test]
    fn test_strategy_per_platform() {
        let delay = Duration::from_millis(100);
        assert_eq!(Platform::Windows.probe(delay).name(), "windows");
        assert_eq!(Platform::Linux.probe(delay).name(), "linux");
        assert_eq!(Platform::MacOs.probe(delay).name(), "macos");
        assert_eq!(Platform::Other.probe(delay).name(), "cpuid");
    }

    #[test]
    fn test_missing_program_is_an_error() {
        assert!(run_query("cpuclock-no-such-program", &[]).is_err());
    }
}
