use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// The kinds of entity managed by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    /// A system requirement. Requirements form a hierarchy.
    Requirement,
    /// A use case. Use cases form a hierarchy.
    UseCase,
    /// A system test.
    Test,
    /// The source a requirement originates from.
    Source,
}

impl EntityKind {
    /// Every entity kind, in display order.
    pub const ALL: [Self; 4] = [Self::Requirement, Self::UseCase, Self::Test, Self::Source];

    /// Returns how items of this kind are arranged.
    #[must_use]
    pub const fn layout(self) -> Layout {
        match self {
            Self::Requirement | Self::UseCase => Layout::Tree,
            Self::Test | Self::Source => Layout::Flat,
        }
    }

    /// Returns `true` if items of this kind may have a parent.
    #[must_use]
    pub const fn is_hierarchical(self) -> bool {
        matches!(self.layout(), Layout::Tree)
    }

    /// A short human-readable label, used in messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Requirement => "requirement",
            Self::UseCase => "use case",
            Self::Test => "test",
            Self::Source => "source",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for EntityKind {
    type Err = UnknownKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "requirement" | "requirements" | "req" => Ok(Self::Requirement),
            "use-case" | "use-cases" | "usecase" | "uc" => Ok(Self::UseCase),
            "test" | "tests" => Ok(Self::Test),
            "source" | "sources" => Ok(Self::Source),
            _ => Err(UnknownKindError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unrecognised entity kind.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown entity kind '{0}': expected requirement, use-case, test or source")]
pub struct UnknownKindError(String);

/// How the items of one entity kind are arranged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Layout {
    /// A forest: items may have a parent and any number of children.
    Tree,
    /// A plain list: every item is top-level.
    Flat,
}

/// One direction of a many-to-many association between two entity kinds.
///
/// The owner is the item being edited; the targets are the items that can be
/// toggled on or off for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Relation {
    owner: EntityKind,
    target: EntityKind,
}

impl Relation {
    /// Use cases linked to a requirement.
    pub const REQUIREMENT_USE_CASES: Self =
        Self::unchecked(EntityKind::Requirement, EntityKind::UseCase);
    /// Tests linked to a requirement.
    pub const REQUIREMENT_TESTS: Self = Self::unchecked(EntityKind::Requirement, EntityKind::Test);
    /// Requirements linked to a use case.
    pub const USE_CASE_REQUIREMENTS: Self =
        Self::unchecked(EntityKind::UseCase, EntityKind::Requirement);
    /// Requirements linked to a test.
    pub const TEST_REQUIREMENTS: Self = Self::unchecked(EntityKind::Test, EntityKind::Requirement);

    /// Every supported relation.
    pub const ALL: [Self; 4] = [
        Self::REQUIREMENT_USE_CASES,
        Self::REQUIREMENT_TESTS,
        Self::USE_CASE_REQUIREMENTS,
        Self::TEST_REQUIREMENTS,
    ];

    const fn unchecked(owner: EntityKind, target: EntityKind) -> Self {
        Self { owner, target }
    }

    /// The relations whose owner is of the given kind.
    pub fn owned_by(kind: EntityKind) -> impl Iterator<Item = Self> {
        Self::ALL.into_iter().filter(move |relation| relation.owner == kind)
    }

    /// Looks up the relation between two entity kinds.
    ///
    /// # Errors
    ///
    /// Returns [`UnsupportedRelation`] unless one side is a requirement and the
    /// other is a use case or a test.
    pub const fn new(owner: EntityKind, target: EntityKind) -> Result<Self, UnsupportedRelation> {
        match (owner, target) {
            (EntityKind::Requirement, EntityKind::UseCase | EntityKind::Test)
            | (EntityKind::UseCase | EntityKind::Test, EntityKind::Requirement) => {
                Ok(Self::unchecked(owner, target))
            }
            _ => Err(UnsupportedRelation { owner, target }),
        }
    }

    /// The kind of the item the association set belongs to.
    #[must_use]
    pub const fn owner(self) -> EntityKind {
        self.owner
    }

    /// The kind of the items that can be associated with the owner.
    #[must_use]
    pub const fn target(self) -> EntityKind {
        self.target
    }

    /// The same association seen from the other side.
    #[must_use]
    pub const fn inverse(self) -> Self {
        Self::unchecked(self.target, self.owner)
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {}", self.owner, self.target)
    }
}

/// Error returned when two entity kinds have no association table.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("{owner} items cannot be associated with {target} items")]
pub struct UnsupportedRelation {
    /// The requested owner kind.
    pub owner: EntityKind,
    /// The requested target kind.
    pub target: EntityKind,
}
