//! Frequency values, probe outcomes and the reasons a probe can come up empty.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Frequencies are carried as gigahertz throughout.
pub type FrequencyValue = f64;

/// Readings at or below zero, or above this, are never accepted.
pub const MAX_PLAUSIBLE_GHZ: FrequencyValue = 10.0;

/// Lower edge of the window a current-frequency reading must clear.
pub const MIN_CURRENT_GHZ: FrequencyValue = 0.1;

/// Whether a value could be a real base/max clock.
pub fn is_plausible(ghz: FrequencyValue) -> bool {
    ghz.is_finite() && ghz > 0.0 && ghz <= MAX_PLAUSIBLE_GHZ
}

/// Whether a value may be reported as the current clock: `(0.1, 10.0]`.
pub fn in_current_window(ghz: FrequencyValue) -> bool {
    ghz.is_finite() && ghz > MIN_CURRENT_GHZ && ghz <= MAX_PLAUSIBLE_GHZ
}

/// Why a single probe step produced nothing. Diagnostic only.
#[derive(Debug, Error)]
pub enum Unavailable {
    #[error("not supported on this platform")]
    Unsupported,

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no value for {0}")]
    Missing(&'static str),

    #[error("could not parse {what} from {input:?}")]
    Parse { what: &'static str, input: String },

    #[error("implausible reading: {0} GHz")]
    Implausible(FrequencyValue),

    #[error("performance counter call {call} failed with status {status:#010x}")]
    Counter { call: &'static str, status: u32 },

    #[error("registry value {value} could not be read (status {status:#010x})")]
    Registry { value: &'static str, status: u32 },

    #[error(transparent)]
    Query(#[from] anyhow::Error),
}

/// Outcome of one probe attempt.
#[derive(Debug)]
pub enum ProbeResult {
    Found(FrequencyValue),
    Unavailable(Unavailable),
}

impl ProbeResult {
    /// Wrap a GHz reading, rejecting implausible values.
    pub fn ghz(value: FrequencyValue) -> Self {
        if is_plausible(value) {
            Self::Found(value)
        } else {
            Self::Unavailable(Unavailable::Implausible(value))
        }
    }

    pub fn mhz(value: f64) -> Self {
        Self::ghz(value / 1000.0)
    }

    pub fn khz(value: f64) -> Self {
        Self::ghz(value / 1_000_000.0)
    }

    pub fn hz(value: f64) -> Self {
        Self::ghz(value / 1_000_000_000.0)
    }

    /// Try the next source only if this one came up empty.
    /// The discarded reason is logged under `step`.
    pub fn or_else(self, step: &str, next: impl FnOnce() -> ProbeResult) -> ProbeResult {
        match self {
            Self::Found(_) => self,
            Self::Unavailable(reason) => {
                log::debug!("{}: {}", step, reason);
                next()
            }
        }
    }

    pub fn found(&self) -> Option<FrequencyValue> {
        match self {
            Self::Found(v) => Some(*v),
            Self::Unavailable(_) => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

impl From<Result<FrequencyValue, Unavailable>> for ProbeResult {
    fn from(result: Result<FrequencyValue, Unavailable>) -> Self {
        match result {
            Ok(v) => Self::ghz(v),
            Err(reason) => Self::Unavailable(reason),
        }
    }
}

/// How a cached base/max value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrequencySource {
    /// Reported by the named probe strategy.
    Probed(&'static str),
    /// No probe produced a value; a documented constant was used.
    Default,
}

impl fmt::Display for FrequencySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Probed(name) => write!(f, "{}", name),
            Self::Default => write!(f, "default"),
        }
    }
}

/// Parse a number out of a trimmed line of tool output.
pub(crate) fn parse_number(what: &'static str, text: &str) -> Result<f64, Unavailable> {
    text.trim().parse::<f64>().map_err(|_| Unavailable::Parse {
        what,
        input: text.trim().to_string(),
    })
}
