//! Criterion validation and compilation.
//!
//! [`compile`] checks a criterion's modifier against its relation's shape and
//! turns it into a [`CompiledCriterion`]: a shape-specific [`Predicate`] that
//! can be evaluated in-process against a [`RelationSource`] or translated by a
//! store into its own query language. Invalid criteria never compile, so a
//! malformed filter cannot reach storage.

use std::collections::BTreeSet;

use uuid::Uuid;

use super::{CriterionModifier, MultiIdCriterion, RelationShape, SceneRelation};
use crate::error::{CatalogError, Result};

/// A validated, shape-specific test on one relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// To-one: related value present and in the set
    In(BTreeSet<Uuid>),
    /// To-one: related value absent, or present and not in the set
    NotIn(BTreeSet<Uuid>),
    /// To-one: no related value
    IsNull,
    /// To-one: a related value exists
    NotNull,
    /// To-many: at least one related value is in the set
    IncludesAny(BTreeSet<Uuid>),
    /// To-many: no related value is in the set
    ExcludesAll(BTreeSet<Uuid>),
    /// To-many: every value of the set is related
    IncludesAll(BTreeSet<Uuid>),
}

/// A criterion that passed validation, ready for execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledCriterion {
    pub relation: SceneRelation,
    pub predicate: Predicate,
}

/// Values an entity holds for a relation.
#[derive(Debug, Clone, Copy)]
pub enum Related<'a> {
    One(Option<Uuid>),
    Many(&'a BTreeSet<Uuid>),
}

/// Anything whose relations can be tested by a compiled criterion.
pub trait RelationSource {
    fn related(&self, relation: SceneRelation) -> Related<'_>;
}

/// Validate `criterion` for `relation` and compile it.
///
/// Fails with [`CatalogError::InvalidModifier`] when the modifier is not legal
/// for the relation's shape, and with [`CatalogError::MissingCriterionValue`]
/// when a value-comparing modifier has no values.
pub fn compile(relation: SceneRelation, criterion: &MultiIdCriterion) -> Result<CompiledCriterion> {
    let shape = relation.shape();
    let modifier = criterion.modifier;

    if !shape.permits(modifier) {
        return Err(CatalogError::InvalidModifier {
            relation: relation.name(),
            shape,
            modifier,
        });
    }

    let values: BTreeSet<Uuid> = criterion.value.iter().copied().collect();
    if modifier.takes_values() && values.is_empty() {
        return Err(CatalogError::MissingCriterionValue {
            relation: relation.name(),
            modifier,
        });
    }

    use CriterionModifier as M;
    let predicate = match (shape, modifier) {
        (RelationShape::ToOneOrNull, M::Equals | M::Includes) => Predicate::In(values),
        (RelationShape::ToOneOrNull, M::NotEquals | M::Excludes) => Predicate::NotIn(values),
        (RelationShape::ToOneOrNull, M::IsNull) => Predicate::IsNull,
        (RelationShape::ToOneOrNull, M::NotNull) => Predicate::NotNull,
        (RelationShape::ToMany, M::Includes) => Predicate::IncludesAny(values),
        (RelationShape::ToMany, M::Excludes) => Predicate::ExcludesAll(values),
        (RelationShape::ToMany, M::IncludesAll) => Predicate::IncludesAll(values),
        // permits() above rejected every other pair
        _ => {
            return Err(CatalogError::InvalidModifier {
                relation: relation.name(),
                shape,
                modifier,
            })
        }
    };

    Ok(CompiledCriterion {
        relation,
        predicate,
    })
}

impl CompiledCriterion {
    /// Evaluate against an in-memory entity.
    pub fn matches<S: RelationSource + ?Sized>(&self, source: &S) -> bool {
        match (&self.predicate, source.related(self.relation)) {
            (Predicate::In(set), Related::One(value)) => value.is_some_and(|v| set.contains(&v)),
            (Predicate::NotIn(set), Related::One(value)) => {
                value.map_or(true, |v| !set.contains(&v))
            }
            (Predicate::IsNull, Related::One(value)) => value.is_none(),
            (Predicate::NotNull, Related::One(value)) => value.is_some(),
            (Predicate::IncludesAny(set), Related::Many(ids)) => !ids.is_disjoint(set),
            (Predicate::ExcludesAll(set), Related::Many(ids)) => ids.is_disjoint(set),
            (Predicate::IncludesAll(set), Related::Many(ids)) => set.is_subset(ids),
            _ => {
                tracing::warn!(
                    relation = self.relation.name(),
                    "Relation source returned a value of the wrong shape"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Entity {
        studio: Option<Uuid>,
        tags: BTreeSet<Uuid>,
    }

    impl RelationSource for Entity {
        fn related(&self, relation: SceneRelation) -> Related<'_> {
            match relation {
                SceneRelation::Studio => Related::One(self.studio),
                SceneRelation::Performers | SceneRelation::Tags => Related::Many(&self.tags),
            }
        }
    }

    fn criterion(modifier: CriterionModifier, ids: &[Uuid]) -> MultiIdCriterion {
        MultiIdCriterion::new(modifier, ids.iter().copied())
    }

    #[test]
    fn test_to_many_rejects_scalar_modifiers() {
        let id = Uuid::new_v4();
        for modifier in [
            CriterionModifier::Equals,
            CriterionModifier::NotEquals,
            CriterionModifier::IsNull,
            CriterionModifier::NotNull,
            CriterionModifier::GreaterThan,
            CriterionModifier::LessThan,
        ] {
            let err = compile(SceneRelation::Tags, &criterion(modifier, &[id])).unwrap_err();
            match err {
                CatalogError::InvalidModifier {
                    relation,
                    modifier: m,
                    shape,
                } => {
                    assert_eq!(relation, "tags");
                    assert_eq!(m, modifier);
                    assert_eq!(shape, RelationShape::ToMany);
                }
                other => panic!("Expected InvalidModifier, got: {:?}", other),
            }
        }
    }

    #[test]
    fn test_to_many_accepts_set_modifiers() {
        let id = Uuid::new_v4();
        for modifier in [
            CriterionModifier::Includes,
            CriterionModifier::Excludes,
            CriterionModifier::IncludesAll,
        ] {
            assert!(compile(SceneRelation::Performers, &criterion(modifier, &[id])).is_ok());
        }
    }

    #[test]
    fn test_to_one_rejects_ordering_and_includes_all() {
        let id = Uuid::new_v4();
        for modifier in [
            CriterionModifier::GreaterThan,
            CriterionModifier::LessThan,
            CriterionModifier::IncludesAll,
        ] {
            let err = compile(SceneRelation::Studio, &criterion(modifier, &[id])).unwrap_err();
            assert!(matches!(err, CatalogError::InvalidModifier { relation: "studios", .. }));
        }
    }

    #[test]
    fn test_error_message_names_relation_and_modifier() {
        let err = compile(
            SceneRelation::Tags,
            &criterion(CriterionModifier::Equals, &[Uuid::new_v4()]),
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("EQUALS"), "{message}");
        assert!(message.contains("tags"), "{message}");
    }

    #[test]
    fn test_value_modifiers_require_values() {
        let err = compile(SceneRelation::Tags, &criterion(CriterionModifier::Includes, &[]))
            .unwrap_err();
        assert!(matches!(err, CatalogError::MissingCriterionValue { .. }));
        assert!(err.is_validation());
    }

    #[test]
    fn test_null_checks_ignore_values() {
        let compiled = compile(
            SceneRelation::Studio,
            &criterion(CriterionModifier::IsNull, &[Uuid::new_v4()]),
        )
        .unwrap();
        assert_eq!(compiled.predicate, Predicate::IsNull);

        let compiled =
            compile(SceneRelation::Studio, &criterion(CriterionModifier::NotNull, &[])).unwrap();
        assert_eq!(compiled.predicate, Predicate::NotNull);
    }

    #[test]
    fn test_to_one_semantics() {
        let (s1, s2) = (Uuid::new_v4(), Uuid::new_v4());
        let with_s1 = Entity {
            studio: Some(s1),
            tags: BTreeSet::new(),
        };
        let with_s2 = Entity {
            studio: Some(s2),
            tags: BTreeSet::new(),
        };
        let without = Entity {
            studio: None,
            tags: BTreeSet::new(),
        };

        let eq =
            compile(SceneRelation::Studio, &criterion(CriterionModifier::Equals, &[s1])).unwrap();
        assert!(eq.matches(&with_s1));
        assert!(!eq.matches(&with_s2));
        assert!(!eq.matches(&without));

        let ne =
            compile(SceneRelation::Studio, &criterion(CriterionModifier::NotEquals, &[s1])).unwrap();
        assert!(!ne.matches(&with_s1));
        assert!(ne.matches(&with_s2));
        assert!(ne.matches(&without));

        let includes = compile(
            SceneRelation::Studio,
            &criterion(CriterionModifier::Includes, &[s1, s2]),
        )
        .unwrap();
        assert!(includes.matches(&with_s1));
        assert!(includes.matches(&with_s2));
        assert!(!includes.matches(&without));

        let excludes =
            compile(SceneRelation::Studio, &criterion(CriterionModifier::Excludes, &[s1])).unwrap();
        assert!(!excludes.matches(&with_s1));
        assert!(excludes.matches(&with_s2));
        assert!(excludes.matches(&without));

        let is_null =
            compile(SceneRelation::Studio, &criterion(CriterionModifier::IsNull, &[])).unwrap();
        let not_null =
            compile(SceneRelation::Studio, &criterion(CriterionModifier::NotNull, &[])).unwrap();
        for entity in [&with_s1, &with_s2, &without] {
            assert_ne!(is_null.matches(entity), not_null.matches(entity));
        }
        assert!(is_null.matches(&without));
        assert!(not_null.matches(&with_s1));
    }

    #[test]
    fn test_to_many_semantics() {
        let (t1, t2) = (Uuid::new_v4(), Uuid::new_v4());
        let only_t1 = Entity {
            studio: None,
            tags: BTreeSet::from([t1]),
        };
        let only_t2 = Entity {
            studio: None,
            tags: BTreeSet::from([t2]),
        };
        let both = Entity {
            studio: None,
            tags: BTreeSet::from([t1, t2]),
        };

        let includes =
            compile(SceneRelation::Tags, &criterion(CriterionModifier::Includes, &[t1])).unwrap();
        assert!(includes.matches(&only_t1));
        assert!(!includes.matches(&only_t2));
        assert!(includes.matches(&both));

        let excludes =
            compile(SceneRelation::Tags, &criterion(CriterionModifier::Excludes, &[t1])).unwrap();
        assert!(!excludes.matches(&only_t1));
        assert!(excludes.matches(&only_t2));
        assert!(!excludes.matches(&both));

        let all = compile(
            SceneRelation::Tags,
            &criterion(CriterionModifier::IncludesAll, &[t1, t2]),
        )
        .unwrap();
        assert!(!all.matches(&only_t1));
        assert!(!all.matches(&only_t2));
        assert!(all.matches(&both));
    }

    #[test]
    fn test_duplicate_values_collapse() {
        let t = Uuid::new_v4();
        let compiled = compile(
            SceneRelation::Tags,
            &criterion(CriterionModifier::IncludesAll, &[t, t, t]),
        )
        .unwrap();
        assert_eq!(compiled.predicate, Predicate::IncludesAll(BTreeSet::from([t])));
    }
}
