//! Scene query façade.
//!
//! Compiles a whole [`SceneFilter`] before anything runs, validates the
//! pagination request, and hands the result to a
//! [`SceneStore`](crate::store::SceneStore). One bad criterion aborts the
//! query without touching storage.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::criterion::{compile, CompiledCriterion, MultiIdCriterion, SceneRelation};
use crate::error::{CatalogError, Result};
use crate::scene::Scene;
use crate::store::SceneStore;

/// Default page size when the caller gives none.
pub const DEFAULT_PER_PAGE: u32 = 25;

/// Default upper bound on page size.
pub const DEFAULT_MAX_PER_PAGE: u32 = 100;

/// Caller-supplied scene filter; all present criteria are AND-ed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneFilter {
    /// Case-insensitive substring of the scene title
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub studios: Option<MultiIdCriterion>,
    #[serde(default)]
    pub performers: Option<MultiIdCriterion>,
    #[serde(default)]
    pub tags: Option<MultiIdCriterion>,
}

impl SceneFilter {
    /// Validate and compile every criterion, failing on the first invalid one.
    pub fn compile(&self) -> Result<CompiledFilter> {
        let relations = [
            (SceneRelation::Studio, &self.studios),
            (SceneRelation::Performers, &self.performers),
            (SceneRelation::Tags, &self.tags),
        ];

        let criteria = relations
            .into_iter()
            .filter_map(|(relation, criterion)| {
                criterion.as_ref().map(|c| compile(relation, c))
            })
            .collect::<Result<Vec<_>>>()?;

        let title = self
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase);

        Ok(CompiledFilter { title, criteria })
    }
}

/// A fully validated filter. Only [`SceneFilter::compile`] builds one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledFilter {
    title: Option<String>,
    criteria: Vec<CompiledCriterion>,
}

impl CompiledFilter {
    /// Lower-cased title fragment, if any.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn criteria(&self) -> &[CompiledCriterion] {
        &self.criteria
    }

    /// Evaluate in-process.
    pub fn matches(&self, scene: &Scene) -> bool {
        let title_ok = match &self.title {
            Some(fragment) => scene
                .title
                .as_deref()
                .is_some_and(|t| t.to_lowercase().contains(fragment.as_str())),
            None => true,
        };
        title_ok && self.criteria.iter().all(|c| c.matches(scene))
    }
}

/// Requested page, as received from a caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySpec {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub per_page: Option<u32>,
}

/// A validated page: `page ≥ 1`, `1 ≤ per_page ≤ max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    page: u32,
    per_page: u32,
}

impl Page {
    pub fn new(page: u32, per_page: u32, max_per_page: u32) -> Result<Self> {
        if page < 1 {
            return Err(CatalogError::InvalidPagination(format!(
                "page must be at least 1, got {page}"
            )));
        }
        if per_page < 1 || per_page > max_per_page {
            return Err(CatalogError::InvalidPagination(format!(
                "per_page must be between 1 and {max_per_page}, got {per_page}"
            )));
        }
        Ok(Self { page, per_page })
    }

    pub fn from_spec(spec: &QuerySpec, max_per_page: u32) -> Result<Self> {
        Self::new(
            spec.page.unwrap_or(1),
            spec.per_page.unwrap_or(DEFAULT_PER_PAGE.min(max_per_page)),
            max_per_page,
        )
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    /// Number of items to skip.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.per_page)
    }
}

/// One page of results plus the total match count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryResult<T> {
    pub count: u64,
    pub page: u32,
    pub per_page: u32,
    pub items: Vec<T>,
}

/// Runs scene queries against a [`SceneStore`].
#[derive(Clone)]
pub struct SceneQueryService {
    store: Arc<dyn SceneStore>,
    max_per_page: u32,
}

impl SceneQueryService {
    pub fn new(store: Arc<dyn SceneStore>) -> Self {
        Self {
            store,
            max_per_page: DEFAULT_MAX_PER_PAGE,
        }
    }

    pub fn with_max_per_page(mut self, max_per_page: u32) -> Self {
        self.max_per_page = max_per_page.max(1);
        self
    }

    /// Compile `filter`, validate `spec`, then fetch one page.
    pub async fn query_scenes(
        &self,
        filter: &SceneFilter,
        spec: &QuerySpec,
    ) -> Result<QueryResult<Scene>> {
        let compiled = filter.compile()?;
        let page = Page::from_spec(spec, self.max_per_page)?;

        let (items, count) = self.store.find_scenes(&compiled, &page).await?;
        tracing::debug!(
            count,
            returned = items.len(),
            page = page.page(),
            "Scene query executed"
        );

        Ok(QueryResult {
            count,
            page: page.page(),
            per_page: page.per_page(),
            items,
        })
    }
}

impl std::fmt::Debug for SceneQueryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneQueryService")
            .field("max_per_page", &self.max_per_page)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criterion::CriterionModifier;
    use uuid::Uuid;

    #[test]
    fn test_empty_filter_compiles_to_match_all() {
        let compiled = SceneFilter::default().compile().unwrap();
        assert!(compiled.criteria().is_empty());
        assert!(compiled.matches(&Scene::new("anything")));
    }

    #[test]
    fn test_one_invalid_criterion_fails_whole_filter() {
        let filter = SceneFilter {
            studios: Some(MultiIdCriterion::new(
                CriterionModifier::Equals,
                [Uuid::new_v4()],
            )),
            tags: Some(MultiIdCriterion::new(
                CriterionModifier::Equals,
                [Uuid::new_v4()],
            )),
            ..Default::default()
        };
        let err = filter.compile().unwrap_err();
        assert!(matches!(err, CatalogError::InvalidModifier { relation: "tags", .. }));
    }

    #[test]
    fn test_title_match_is_case_insensitive_substring() {
        let filter = SceneFilter {
            title: Some("  Beach ".to_string()),
            ..Default::default()
        };
        let compiled = filter.compile().unwrap();
        assert_eq!(compiled.title(), Some("beach"));
        assert!(compiled.matches(&Scene::new("Sunny BEACH day")));
        assert!(!compiled.matches(&Scene::new("Mountain")));
    }

    #[test]
    fn test_page_bounds() {
        assert!(Page::new(0, 10, 100).is_err());
        assert!(Page::new(1, 0, 100).is_err());
        assert!(Page::new(1, 101, 100).is_err());
        let page = Page::new(3, 10, 100).unwrap();
        assert_eq!(page.offset(), 20);
    }

    #[test]
    fn test_page_defaults() {
        let page = Page::from_spec(&QuerySpec::default(), 100).unwrap();
        assert_eq!(page.page(), 1);
        assert_eq!(page.per_page(), DEFAULT_PER_PAGE);

        let capped = Page::from_spec(&QuerySpec::default(), 10).unwrap();
        assert_eq!(capped.per_page(), 10);
    }

    #[test]
    fn test_filter_deserializes_from_wire_form() {
        let tag = Uuid::new_v4();
        let json = serde_json::json!({
            "title": "scene",
            "tags": { "value": [tag], "modifier": "INCLUDES_ALL" }
        });
        let filter: SceneFilter = serde_json::from_value(json).unwrap();
        assert_eq!(
            filter.tags,
            Some(MultiIdCriterion::new(CriterionModifier::IncludesAll, [tag]))
        );
        assert!(filter.studios.is_none());
    }
}
