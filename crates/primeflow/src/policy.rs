use core::{fmt, str::FromStr};

use crate::Error;

/// What the publisher does with a ready item when the subscriber has no
/// outstanding demand for it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum OverflowPolicy {
    /// Emit anyway, outside the demand bookkeeping.
    Ignore,
    /// Queue the item (unbounded, order preserving) until demand arrives.
    Buffer,
    /// Abort the run with [`Error::Overflow`].
    Error,
    /// Keep only the most recent undelivered item.
    Latest,
    /// Discard the item.
    Drop,
    /// Only emit in response to demand; overflow cannot happen.
    #[default]
    PushPull,
}

impl OverflowPolicy {
    pub const ALL: [Self; 6] = [
        Self::Ignore,
        Self::Buffer,
        Self::Error,
        Self::Latest,
        Self::Drop,
        Self::PushPull,
    ];

    /// Returns `true` for policies that may deliver fewer items than were
    /// produced.
    pub const fn is_lossy(self) -> bool {
        matches!(self, Self::Latest | Self::Drop)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ignore => "ignore",
            Self::Buffer => "buffer",
            Self::Error => "error",
            Self::Latest => "latest",
            Self::Drop => "drop",
            Self::PushPull => "push-pull",
        }
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverflowPolicy {
    type Err = Error;

    /// Parses a policy name case-insensitively; `-` and `_` are
    /// interchangeable.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|policy| policy.as_str() == normalized)
            .ok_or_else(|| Error::InvalidConfig {
                reason: format!(
                    "unknown overflow policy `{s}` (expected one of: {})",
                    Self::ALL.map(Self::as_str).join(", ")
                ),
            })
    }
}
