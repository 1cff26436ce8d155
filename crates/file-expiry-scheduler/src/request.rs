//! Caller-facing expiry requests and presets.

use std::fmt;
use std::str::FromStr;

use crate::ExpiryError;

/// When a file should expire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpiryRequest {
    /// An `at` time spec (`14:00`, `now + 1 day`, `noon tomorrow`).
    At(String),
    /// A number of minutes from now.
    After(u64),
}

impl ExpiryRequest {
    /// Build a request from two optional free-text fields, exactly one of
    /// which must be filled in.
    pub fn from_fields(at: Option<&str>, after: Option<&str>) -> Result<Self, ExpiryError> {
        let at = at.map(str::trim).filter(|s| !s.is_empty());
        let after = after.map(str::trim).filter(|s| !s.is_empty());

        match (at, after) {
            (Some(when), None) => Ok(Self::At(when.to_string())),
            (None, Some(minutes)) => Ok(Self::After(parse_minutes(minutes)?)),
            _ => Err(ExpiryError::InvalidInput(
                "fill in either a time string or minutes, but not both".to_string(),
            )),
        }
    }
}

/// Parse a strictly positive, digits-only minute count.
pub(crate) fn parse_minutes(text: &str) -> Result<u64, ExpiryError> {
    let invalid = || {
        ExpiryError::InvalidInput(format!(
            "expiry after must be a positive integer, got {:?}",
            text
        ))
    };

    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    match text.parse::<u64>() {
        Ok(0) | Err(_) => Err(invalid()),
        Ok(n) => Ok(n),
    }
}

/// The quick choices offered next to a custom expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryPreset {
    InOneHour,
    InOneDay,
    InOneWeek,
    InOneMonth,
    AfterOneWeek,
    AfterOneMonth,
}

impl ExpiryPreset {
    pub const ALL: [ExpiryPreset; 6] = [
        ExpiryPreset::InOneHour,
        ExpiryPreset::InOneDay,
        ExpiryPreset::InOneWeek,
        ExpiryPreset::InOneMonth,
        ExpiryPreset::AfterOneWeek,
        ExpiryPreset::AfterOneMonth,
    ];

    /// Stable name used on the command line.
    pub fn name(self) -> &'static str {
        match self {
            Self::InOneHour => "in-one-hour",
            Self::InOneDay => "in-one-day",
            Self::InOneWeek => "in-one-week",
            Self::InOneMonth => "in-one-month",
            Self::AfterOneWeek => "after-one-week",
            Self::AfterOneMonth => "after-one-month",
        }
    }

    /// The request this preset stands for.
    pub fn request(self) -> ExpiryRequest {
        match self {
            Self::InOneHour => ExpiryRequest::At("now + 1 hour".to_string()),
            Self::InOneDay => ExpiryRequest::At("now + 1 day".to_string()),
            Self::InOneWeek => ExpiryRequest::At("now + 1 week".to_string()),
            Self::InOneMonth => ExpiryRequest::At("now + 1 month".to_string()),
            // 7 * 24 * 60
            Self::AfterOneWeek => ExpiryRequest::After(10_080),
            // 30 days
            Self::AfterOneMonth => ExpiryRequest::After(43_200),
        }
    }
}

impl fmt::Display for ExpiryPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ExpiryPreset {
    type Err = ExpiryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| {
                let names: Vec<_> = Self::ALL.iter().map(|p| p.name()).collect();
                ExpiryError::InvalidInput(format!(
                    "unknown preset {:?}, expected one of: {}",
                    s,
                    names.join(", ")
                ))
            })
    }
}
