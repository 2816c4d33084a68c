//! The slice of a scene the core reads.
//!
//! Scenes are owned by the wider catalog; this crate only needs their
//! relations for filtering and their creation time for ordering.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::criterion::{Related, RelationSource, SceneRelation};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Scene {
    pub id: Uuid,
    pub title: Option<String>,
    pub studio_id: Option<Uuid>,
    pub performer_ids: BTreeSet<Uuid>,
    pub tag_ids: BTreeSet<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Scene {
    /// A scene with no relations, created now.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: Some(title.into()),
            studio_id: None,
            performer_ids: BTreeSet::new(),
            tag_ids: BTreeSet::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_studio(mut self, studio_id: Uuid) -> Self {
        self.studio_id = Some(studio_id);
        self
    }

    pub fn with_performers(mut self, ids: impl IntoIterator<Item = Uuid>) -> Self {
        self.performer_ids.extend(ids);
        self
    }

    pub fn with_tags(mut self, ids: impl IntoIterator<Item = Uuid>) -> Self {
        self.tag_ids.extend(ids);
        self
    }
}

impl RelationSource for Scene {
    fn related(&self, relation: SceneRelation) -> Related<'_> {
        match relation {
            SceneRelation::Studio => Related::One(self.studio_id),
            SceneRelation::Performers => Related::Many(&self.performer_ids),
            SceneRelation::Tags => Related::Many(&self.tag_ids),
        }
    }
}
