//! Progress reports published by running work.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Wire form of a progress report; normalized into [`Progress`] on the way in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
enum ProgressMode {
    Percent { percent: f32 },
    Count { current: Option<u64>, total: u64 },
    Indeterminate,
}

/// A progress report about a unit of work.
///
/// Exactly one representation is active:
///
/// - `26.2%` (percentage)
/// - `12/345` (current and total count)
/// - `?/345` (current unknown, total known)
/// - `?` (fully indeterminate)
///
/// Percentages are clamped into `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "ProgressMode", into = "ProgressMode")]
pub struct Progress {
    mode: ProgressMode,
}

impl Progress {
    /// Nothing known about progress.
    pub const INDETERMINATE: Self = Self {
        mode: ProgressMode::Indeterminate,
    };

    /// `0%`.
    pub const ZERO: Self = Self {
        mode: ProgressMode::Percent { percent: 0.0 },
    };

    /// `100%`.
    pub const COMPLETE: Self = Self {
        mode: ProgressMode::Percent { percent: 100.0 },
    };

    /// Progress as a percentage. Values above 100 clamp to 100, below 0 to 0;
    /// NaN yields [`Progress::INDETERMINATE`].
    #[must_use]
    pub fn percent(percent: f32) -> Self {
        if percent.is_nan() {
            return Self::INDETERMINATE;
        }
        Self {
            mode: ProgressMode::Percent {
                percent: percent.clamp(0.0, 100.0),
            },
        }
    }

    /// Progress as a current and total count.
    #[must_use]
    pub const fn count(current: u64, total: u64) -> Self {
        Self {
            mode: ProgressMode::Count {
                current: Some(current),
                total,
            },
        }
    }

    /// Progress with a known total but unknown current count (`?/total`).
    #[must_use]
    pub const fn count_unknown(total: u64) -> Self {
        Self {
            mode: ProgressMode::Count {
                current: None,
                total,
            },
        }
    }

    /// The percentage, if this report is expressed as one.
    #[must_use]
    pub const fn get_percent(&self) -> Option<f32> {
        match self.mode {
            ProgressMode::Percent { percent } => Some(percent),
            _ => None,
        }
    }

    /// The current count, if known.
    #[must_use]
    pub const fn current(&self) -> Option<u64> {
        match self.mode {
            ProgressMode::Count { current, .. } => current,
            _ => None,
        }
    }

    /// The total count (`0` unless expressed as a count).
    #[must_use]
    pub const fn total(&self) -> u64 {
        match self.mode {
            ProgressMode::Count { total, .. } => total,
            _ => 0,
        }
    }

    /// Whether this report is a percentage.
    #[must_use]
    pub const fn is_with_percent(&self) -> bool {
        matches!(self.mode, ProgressMode::Percent { .. })
    }

    /// Whether this report carries a known current count.
    #[must_use]
    pub const fn is_with_current_and_total(&self) -> bool {
        matches!(
            self.mode,
            ProgressMode::Count {
                current: Some(_),
                ..
            }
        )
    }

    /// Whether neither a percentage nor a current count is known.
    #[must_use]
    pub const fn is_indeterminate(&self) -> bool {
        !self.is_with_percent() && !self.is_with_current_and_total()
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::INDETERMINATE
    }
}

impl From<ProgressMode> for Progress {
    fn from(mode: ProgressMode) -> Self {
        match mode {
            ProgressMode::Percent { percent } => Self::percent(percent),
            ProgressMode::Count { current, total } => Self {
                mode: ProgressMode::Count { current, total },
            },
            ProgressMode::Indeterminate => Self::INDETERMINATE,
        }
    }
}

impl From<Progress> for ProgressMode {
    fn from(progress: Progress) -> Self {
        progress.mode
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get_percent() {
            Some(p) => write!(f, "Progress({p}%, ")?,
            None => write!(f, "Progress(?%, ")?,
        }
        match self.current() {
            Some(c) => write!(f, "{c}/{})", self.total()),
            None => write!(f, "?/{})", self.total()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_clamps_to_hundred() {
        let p = Progress::percent(150.0);
        assert_eq!(p.get_percent(), Some(100.0));
        assert!(p.is_with_percent());
        assert!(!p.is_indeterminate());
    }

    #[test]
    fn test_negative_percent_clamps_to_zero() {
        assert_eq!(Progress::percent(-3.0).get_percent(), Some(0.0));
        assert!(Progress::percent(f32::NAN).is_indeterminate());
    }

    #[test]
    fn test_count_modes() {
        let p = Progress::count(12, 345);
        assert!(p.is_with_current_and_total());
        assert_eq!(p.current(), Some(12));
        assert_eq!(p.total(), 345);
        assert_eq!(p.get_percent(), None);

        let unknown = Progress::count_unknown(345);
        assert!(unknown.is_indeterminate());
        assert_eq!(unknown.total(), 345);
    }

    #[test]
    fn test_display() {
        assert_eq!(Progress::percent(26.5).to_string(), "Progress(26.5%, ?/0)");
        assert_eq!(Progress::count(12, 345).to_string(), "Progress(?%, 12/345)");
        assert_eq!(Progress::INDETERMINATE.to_string(), "Progress(?%, ?/0)");
    }

    #[test]
    fn test_deserialize_reapplies_clamp() {
        let p: Progress =
            serde_json::from_str(r#"{"mode":"percent","percent":250.0}"#).unwrap();
        assert_eq!(p.get_percent(), Some(100.0));

        let json = serde_json::to_string(&Progress::count(1, 2)).unwrap();
        let back: Progress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Progress::count(1, 2));
    }
}
