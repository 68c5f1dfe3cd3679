//! Requirement classification: what kind of requirement it is and how much it
//! matters. Both are stored as single-letter codes.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// What kind of statement a requirement makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequirementType {
    /// Behaviour the system must exhibit.
    Functional,
    /// A bound on speed, throughput or resource use.
    Performance,
    /// A measurable quality target.
    QualityMetric,
    /// A statement of fact or constraint.
    Declarative,
}

impl RequirementType {
    /// Every requirement type, in display order.
    pub const ALL: [Self; 4] = [
        Self::Functional,
        Self::Performance,
        Self::QualityMetric,
        Self::Declarative,
    ];

    /// The code stored in the database.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Functional => "F",
            Self::Performance => "P",
            Self::QualityMetric => "Q",
            Self::Declarative => "D",
        }
    }

    /// Looks up a type by its stored code.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Functional => "functional",
            Self::Performance => "performance",
            Self::QualityMetric => "quality metric",
            Self::Declarative => "declarative",
        }
    }
}

impl fmt::Display for RequirementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for RequirementType {
    type Err = UnknownAttributeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "f" | "functional" => Ok(Self::Functional),
            "p" | "performance" => Ok(Self::Performance),
            "q" | "quality-metric" | "quality" => Ok(Self::QualityMetric),
            "d" | "declarative" => Ok(Self::Declarative),
            _ => Err(UnknownAttributeError {
                attribute: "requirement type",
                value: s.to_string(),
            }),
        }
    }
}

/// How strongly a requirement must be met.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Priority {
    /// Must be met.
    Mandatory,
    /// Should be met if possible.
    Desirable,
    /// May be met.
    Optional,
}

impl Priority {
    /// Every priority, most important first.
    pub const ALL: [Self; 3] = [Self::Mandatory, Self::Desirable, Self::Optional];

    /// The code stored in the database.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Mandatory => "O",
            Self::Desirable => "D",
            Self::Optional => "F",
        }
    }

    /// Looks up a priority by its stored code.
    #[must_use]
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.code() == code)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mandatory => "mandatory",
            Self::Desirable => "desirable",
            Self::Optional => "optional",
        })
    }
}

impl FromStr for Priority {
    type Err = UnknownAttributeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mandatory" => Ok(Self::Mandatory),
            "desirable" => Ok(Self::Desirable),
            "optional" => Ok(Self::Optional),
            _ => Self::from_code(&s.to_ascii_uppercase()).ok_or_else(|| UnknownAttributeError {
                attribute: "priority",
                value: s.to_string(),
            }),
        }
    }
}

/// Error returned when parsing an unrecognised type or priority.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown {attribute} '{value}'")]
pub struct UnknownAttributeError {
    attribute: &'static str,
    value: String,
}
