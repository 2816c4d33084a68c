//! Criterion model: modifiers, relation shapes and their compatibility table.
//!
//! Which modifiers a criterion accepts depends on the *shape* of the relation
//! it filters, not on the field name:
//!
//! | Shape            | Legal modifiers                                              |
//! |------------------|--------------------------------------------------------------|
//! | to-one-or-null   | EQUALS, NOT_EQUALS, IS_NULL, NOT_NULL, INCLUDES, EXCLUDES    |
//! | to-many          | INCLUDES, EXCLUDES, INCLUDES_ALL                             |
//!
//! [`filter`] validates a criterion against this table and compiles it.

pub mod filter;

pub use filter::{compile, CompiledCriterion, Predicate, Related, RelationSource};

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed set of comparison operators a criterion may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CriterionModifier {
    Equals,
    NotEquals,
    Includes,
    Excludes,
    IncludesAll,
    IsNull,
    NotNull,
    GreaterThan,
    LessThan,
}

impl CriterionModifier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "EQUALS",
            Self::NotEquals => "NOT_EQUALS",
            Self::Includes => "INCLUDES",
            Self::Excludes => "EXCLUDES",
            Self::IncludesAll => "INCLUDES_ALL",
            Self::IsNull => "IS_NULL",
            Self::NotNull => "NOT_NULL",
            Self::GreaterThan => "GREATER_THAN",
            Self::LessThan => "LESS_THAN",
        }
    }

    /// Whether the modifier compares against the criterion's value list.
    pub fn takes_values(self) -> bool {
        !matches!(self, Self::IsNull | Self::NotNull)
    }
}

impl fmt::Display for CriterionModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cardinality of a relation, which decides its legal modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationShape {
    /// At most one related value (e.g. studio)
    ToOneOrNull,
    /// Any number of related values (e.g. performers, tags)
    ToMany,
}

impl RelationShape {
    pub fn legal_modifiers(self) -> &'static [CriterionModifier] {
        use CriterionModifier::*;
        match self {
            Self::ToOneOrNull => &[Equals, NotEquals, IsNull, NotNull, Includes, Excludes],
            Self::ToMany => &[Includes, Excludes, IncludesAll],
        }
    }

    pub fn permits(self, modifier: CriterionModifier) -> bool {
        self.legal_modifiers().contains(&modifier)
    }
}

impl fmt::Display for RelationShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ToOneOrNull => f.write_str("to-one"),
            Self::ToMany => f.write_str("to-many"),
        }
    }
}

/// Scene relations that can be filtered by ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneRelation {
    Studio,
    Performers,
    Tags,
}

impl SceneRelation {
    pub fn name(self) -> &'static str {
        match self {
            Self::Studio => "studios",
            Self::Performers => "performers",
            Self::Tags => "tags",
        }
    }

    pub fn shape(self) -> RelationShape {
        match self {
            Self::Studio => RelationShape::ToOneOrNull,
            Self::Performers | Self::Tags => RelationShape::ToMany,
        }
    }
}

/// Filter on an ID relation: `value` compared via `modifier`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiIdCriterion {
    #[serde(default)]
    pub value: Vec<Uuid>,
    pub modifier: CriterionModifier,
}

impl MultiIdCriterion {
    pub fn new(modifier: CriterionModifier, value: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            value: value.into_iter().collect(),
            modifier,
        }
    }
}
