//! Query options and the aspect algebra.
//!
//! A retrieval is shaped by up to four orthogonal aspects:
//!
//! - **Condition** - a filter [`Expr`] (absent means "match all")
//! - **PaginationSort** - `limit`, `skip` and an ordered list of sort keys
//! - **Projection** - fields to include or exclude
//! - **Populate** - reference fields to resolve into embedded documents
//!
//! [`QueryOptions`] records which aspects it carries in an [`AspectSet`] as
//! it is built, so the active combination is explicit rather than inferred by
//! probing fields at dispatch time. Multi-document fetches accept all sixteen
//! combinations; [`ByIdOptions`] only carries the three aspects meaningful for
//! an identity lookup (eight combinations), with pagination reduced to sort.

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::query::{Expr, Sort, SortDirection};

/// One of the four query aspects, listed in classification priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Aspect {
    Condition,
    PaginationSort,
    Projection,
    Populate,
}

impl Aspect {
    /// Every aspect, in the fixed priority order used for classification.
    pub const PRIORITY: [Aspect; 4] = [
        Aspect::Condition,
        Aspect::PaginationSort,
        Aspect::Projection,
        Aspect::Populate,
    ];

    fn bit(self) -> u8 {
        match self {
            Aspect::Condition => 0b0001,
            Aspect::PaginationSort => 0b0010,
            Aspect::Projection => 0b0100,
            Aspect::Populate => 0b1000,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Aspect::Condition => "condition",
            Aspect::PaginationSort => "options",
            Aspect::Projection => "projection",
            Aspect::Populate => "populate",
        }
    }
}

/// A subset of the four aspects; each of the sixteen values names exactly one
/// composition path.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AspectSet(u8);

impl AspectSet {
    pub const EMPTY: AspectSet = AspectSet(0);

    pub fn with(self, aspect: Aspect) -> Self {
        AspectSet(self.0 | aspect.bit())
    }

    pub fn without(self, aspect: Aspect) -> Self {
        AspectSet(self.0 & !aspect.bit())
    }

    pub fn contains(self, aspect: Aspect) -> bool {
        self.0 & aspect.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// The present aspects, in priority order.
    pub fn iter(self) -> impl Iterator<Item = Aspect> {
        Aspect::PRIORITY
            .into_iter()
            .filter(move |aspect| self.contains(*aspect))
    }

    /// All sixteen legal combinations for multi-document fetches.
    pub fn all() -> impl Iterator<Item = AspectSet> {
        (0u8..16).map(AspectSet)
    }

    /// The eight legal combinations for identity lookups.
    pub fn all_by_id() -> impl Iterator<Item = AspectSet> {
        Self::all().filter(|set| !set.contains(Aspect::Condition))
    }
}

impl FromIterator<Aspect> for AspectSet {
    fn from_iter<I: IntoIterator<Item = Aspect>>(iter: I) -> Self {
        iter.into_iter().fold(AspectSet::EMPTY, AspectSet::with)
    }
}

impl fmt::Display for AspectSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("simple");
        }

        let labels = self.iter().map(Aspect::label).collect::<Vec<_>>();
        f.write_str(&labels.join("+"))
    }
}

/// Whether a projected field is included in or excluded from results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Inclusion {
    Include,
    Exclude,
}

/// A set of field names, each tagged included or excluded.
///
/// Stores reject projections that mix both modes (other than excluding `_id`);
/// keeping a projection single-mode is the caller's responsibility.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    fields: Vec<(String, Inclusion)>,
}

impl Projection {
    /// A projection returning only the given fields (plus `_id`).
    pub fn include<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|f| (f.into(), Inclusion::Include))
                .collect(),
        }
    }

    /// A projection returning everything but the given fields.
    pub fn exclude<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|f| (f.into(), Inclusion::Exclude))
                .collect(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, inclusion: Inclusion) -> Self {
        self.fields.push((name.into(), inclusion));
        self
    }

    pub fn fields(&self) -> &[(String, Inclusion)] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// True when at least one field is explicitly included.
    pub fn is_inclusive(&self) -> bool {
        self.fields
            .iter()
            .any(|(_, inclusion)| *inclusion == Inclusion::Include)
    }

    /// Renders the projection as a store projection document (`{field: 1 | 0}`).
    pub fn to_document(&self) -> Document {
        self.fields
            .iter()
            .map(|(name, inclusion)| {
                (
                    name.clone(),
                    Bson::Int32(match inclusion {
                        Inclusion::Include => 1,
                        Inclusion::Exclude => 0,
                    }),
                )
            })
            .collect()
    }
}

/// Pagination and ordering parameters.
///
/// `limit` and `skip` follow store semantics: zero means "not set".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaginationSort {
    pub limit: Option<u64>,
    pub skip: Option<u64>,
    #[serde(default)]
    pub sort: Vec<Sort>,
}

impl PaginationSort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Appends a sort key; keys apply in the order they were added.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push(Sort::new(field, direction));
        self
    }

    /// The effective limit, with zero folded into "unbounded".
    pub fn effective_limit(&self) -> Option<u64> {
        self.limit.filter(|n| *n > 0)
    }

    /// The effective skip, with zero folded into "none".
    pub fn effective_skip(&self) -> Option<u64> {
        self.skip.filter(|n| *n > 0)
    }

    pub fn is_empty(&self) -> bool {
        self.effective_limit().is_none() && self.effective_skip().is_none() && self.sort.is_empty()
    }
}

/// A request to resolve one reference field into embedded documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulateSpec {
    /// The reference field to resolve.
    pub path: String,
    /// Projection applied to the populated documents.
    pub select: Option<Projection>,
    /// Ordering and windowing applied to populated arrays.
    pub options: Option<PaginationSort>,
}

impl PopulateSpec {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), select: None, options: None }
    }

    pub fn select(mut self, projection: Projection) -> Self {
        self.select = Some(projection);
        self
    }

    pub fn options(mut self, options: PaginationSort) -> Self {
        self.options = Some(options);
        self
    }
}

impl From<&str> for PopulateSpec {
    fn from(path: &str) -> Self {
        PopulateSpec::new(path)
    }
}

impl From<String> for PopulateSpec {
    fn from(path: String) -> Self {
        PopulateSpec::new(path)
    }
}

/// Options for multi-document fetches: any subset of the four aspects.
///
/// ```ignore
/// use docbind::options::QueryOptions;
/// use docbind::query::{Filter, SortDirection};
///
/// let options = QueryOptions::builder()
///     .condition(Filter::eq("status", "open"))
///     .limit(10)
///     .sort("createdAt", SortDirection::Desc)
///     .build();
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    condition: Option<Expr>,
    pagination: Option<PaginationSort>,
    projection: Option<Projection>,
    populate: Vec<PopulateSpec>,
    aspects: AspectSet,
}

impl QueryOptions {
    /// Options with no aspects: fetch every document.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> QueryOptionsBuilder {
        QueryOptionsBuilder::new()
    }

    /// The combination of aspects these options carry.
    pub fn aspects(&self) -> AspectSet {
        self.aspects
    }

    pub fn condition(&self) -> Option<&Expr> {
        self.condition.as_ref()
    }

    pub fn pagination(&self) -> Option<&PaginationSort> {
        self.pagination.as_ref()
    }

    pub fn projection(&self) -> Option<&Projection> {
        self.projection.as_ref()
    }

    pub fn populate(&self) -> &[PopulateSpec] {
        &self.populate
    }
}

/// Builder for [`QueryOptions`]; every setter records its aspect.
#[derive(Debug, Clone, Default)]
pub struct QueryOptionsBuilder {
    options: QueryOptions,
}

impl QueryOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the filter condition.
    pub fn condition(mut self, condition: Expr) -> Self {
        self.options.condition = Some(condition);
        self.options.aspects = self.options.aspects.with(Aspect::Condition);
        self
    }

    /// Sets the projection.
    pub fn projection(mut self, projection: Projection) -> Self {
        self.options.projection = Some(projection);
        self.options.aspects = self.options.aspects.with(Aspect::Projection);
        self
    }

    /// Replaces the whole pagination/sort aspect.
    pub fn pagination(mut self, pagination: PaginationSort) -> Self {
        self.options.pagination = Some(pagination);
        self.options.aspects = self.options.aspects.with(Aspect::PaginationSort);
        self
    }

    pub fn limit(self, limit: u64) -> Self {
        self.update_pagination(|p| p.limit(limit))
    }

    pub fn skip(self, skip: u64) -> Self {
        self.update_pagination(|p| p.skip(skip))
    }

    pub fn sort(self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.update_pagination(|p| p.sort(field, direction))
    }

    /// Adds a reference field to populate.
    pub fn populate(mut self, spec: impl Into<PopulateSpec>) -> Self {
        self.options.populate.push(spec.into());
        self.options.aspects = self.options.aspects.with(Aspect::Populate);
        self
    }

    pub fn build(self) -> QueryOptions {
        self.options
    }

    fn update_pagination(mut self, f: impl FnOnce(PaginationSort) -> PaginationSort) -> Self {
        let current = self.options.pagination.take().unwrap_or_default();
        self.pagination(f(current))
    }
}

impl From<QueryOptionsBuilder> for QueryOptions {
    fn from(builder: QueryOptionsBuilder) -> Self {
        builder.build()
    }
}

/// Options for identity lookups: projection, sort and populate only.
///
/// Converting from [`QueryOptions`] drops the condition, `limit` and `skip`,
/// since they are meaningless for a single document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ByIdOptions {
    sort: Vec<Sort>,
    projection: Option<Projection>,
    populate: Vec<PopulateSpec>,
    aspects: AspectSet,
}

impl ByIdOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn aspects(&self) -> AspectSet {
        self.aspects
    }

    pub fn sort_keys(&self) -> &[Sort] {
        &self.sort
    }

    pub fn projection(&self) -> Option<&Projection> {
        self.projection.as_ref()
    }

    pub fn populate(&self) -> &[PopulateSpec] {
        &self.populate
    }

    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push(Sort::new(field, direction));
        self.aspects = self.aspects.with(Aspect::PaginationSort);
        self
    }

    pub fn select(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self.aspects = self.aspects.with(Aspect::Projection);
        self
    }

    pub fn with_populate(mut self, spec: impl Into<PopulateSpec>) -> Self {
        self.populate.push(spec.into());
        self.aspects = self.aspects.with(Aspect::Populate);
        self
    }
}

impl From<QueryOptions> for ByIdOptions {
    fn from(options: QueryOptions) -> Self {
        let sort = options
            .pagination
            .map(|p| p.sort)
            .unwrap_or_default();
        let mut aspects = options
            .aspects
            .without(Aspect::Condition)
            .without(Aspect::PaginationSort);

        if !sort.is_empty() {
            aspects = aspects.with(Aspect::PaginationSort);
        }

        Self {
            sort,
            projection: options.projection,
            populate: options.populate,
            aspects,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Filter;

    #[test]
    fn builder_records_aspects() {
        let options = QueryOptions::builder()
            .condition(Filter::eq("status", "open"))
            .limit(10)
            .populate("customer")
            .build();

        let aspects = options.aspects();
        assert!(aspects.contains(Aspect::Condition));
        assert!(aspects.contains(Aspect::PaginationSort));
        assert!(!aspects.contains(Aspect::Projection));
        assert!(aspects.contains(Aspect::Populate));
        assert_eq!(aspects.to_string(), "condition+options+populate");
    }

    #[test]
    fn empty_options_are_simple() {
        assert!(QueryOptions::new().aspects().is_empty());
        assert_eq!(QueryOptions::new().aspects().to_string(), "simple");
    }

    #[test]
    fn combinations_are_exhaustive_and_distinct() {
        let all = AspectSet::all().collect::<Vec<_>>();
        let by_id = AspectSet::all_by_id().collect::<Vec<_>>();

        assert_eq!(all.len(), 16);
        assert_eq!(by_id.len(), 8);
        assert_eq!(
            all.iter().map(|s| s.to_string()).collect::<std::collections::HashSet<_>>().len(),
            16
        );
    }

    #[test]
    fn pagination_setters_merge() {
        let options = QueryOptions::builder()
            .limit(5)
            .skip(10)
            .sort("name", SortDirection::Asc)
            .build();

        assert_eq!(
            options.pagination(),
            Some(&PaginationSort::new().limit(5).skip(10).sort("name", SortDirection::Asc))
        );
    }

    #[test]
    fn by_id_conversion_drops_window_and_condition() {
        let options = QueryOptions::builder()
            .condition(Filter::eq("a", 1))
            .limit(3)
            .skip(1)
            .projection(Projection::include(["a"]))
            .build();

        let by_id = ByIdOptions::from(options);
        assert_eq!(by_id.aspects(), AspectSet::EMPTY.with(Aspect::Projection));
        assert!(by_id.sort_keys().is_empty());
    }

    #[test]
    fn zero_limit_is_unbounded() {
        let pagination = PaginationSort::new().limit(0).skip(0);

        assert!(pagination.is_empty());
        assert_eq!(pagination.effective_limit(), None);
    }
}
