use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A half-open-at-either-end date range. An empty range (both ends absent)
/// contains every instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct DateRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn is_empty(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    /// Err when both bounds are set and inverted.
    pub fn validate(&self) -> Result<(), InvalidDateRange> {
        match (self.from, self.to) {
            (Some(from), Some(to)) if from > to => Err(InvalidDateRange { from, to }),
            _ => Ok(()),
        }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        if let Some(from) = self.from {
            if t < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if t > to {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, thiserror::Error)]
#[error("date range is inverted: from {from} is after to {to}")]
pub struct InvalidDateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}
