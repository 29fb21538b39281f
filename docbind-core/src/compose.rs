//! Turns [`QueryOptions`] into a single [`StoreQuery`].
//!
//! The condition becomes the filter of the initial find. The remaining
//! aspects are attached by walking a fixed list of appliers (projection, then
//! pagination/sort, then populate) and running only those whose aspect is in
//! the options' [`AspectSet`]. Absent aspects add no clause at all.

use bson::Bson;

use crate::{
    backend::{Model, StoreQuery},
    options::{Aspect, ByIdOptions, QueryOptions},
};

type ManyApplier = fn(&QueryOptions, StoreQuery) -> StoreQuery;
type ByIdApplier = fn(&ByIdOptions, StoreQuery) -> StoreQuery;

static MANY_APPLIERS: [(Aspect, ManyApplier); 3] = [
    (Aspect::Projection, select_many),
    (Aspect::PaginationSort, paginate_many),
    (Aspect::Populate, populate_many),
];

static BY_ID_APPLIERS: [(Aspect, ByIdApplier); 3] = [
    (Aspect::Projection, select_by_id),
    (Aspect::PaginationSort, sort_by_id),
    (Aspect::Populate, populate_by_id),
];

/// Builds the query for a multi-document fetch.
pub fn compose_many(model: &Model, options: &QueryOptions) -> StoreQuery {
    let aspects = options.aspects();
    tracing::debug!(model = model.name(), combination = %aspects, "composing find");

    let filter = if aspects.contains(Aspect::Condition) {
        options.condition().cloned()
    } else {
        None
    };

    MANY_APPLIERS
        .iter()
        .filter(|(aspect, _)| aspects.contains(*aspect))
        .fold(model.find(filter), |query, (_, apply)| apply(options, query))
}

/// Builds the query for an identity lookup.
pub fn compose_by_id(model: &Model, id: Bson, options: &ByIdOptions) -> StoreQuery {
    let aspects = options.aspects();
    tracing::debug!(model = model.name(), combination = %aspects, "composing find by id");

    BY_ID_APPLIERS
        .iter()
        .filter(|(aspect, _)| aspects.contains(*aspect))
        .fold(model.find_by_id(id), |query, (_, apply)| apply(options, query))
}

fn select_many(options: &QueryOptions, query: StoreQuery) -> StoreQuery {
    match options.projection() {
        Some(projection) => query.select(projection.clone()),
        None => query,
    }
}

fn paginate_many(options: &QueryOptions, query: StoreQuery) -> StoreQuery {
    let Some(pagination) = options.pagination() else {
        return query;
    };

    let query = match pagination.effective_limit() {
        Some(limit) => query.limit(limit),
        None => query,
    };
    let query = match pagination.effective_skip() {
        Some(skip) => query.skip(skip),
        None => query,
    };

    if pagination.sort.is_empty() {
        query
    } else {
        query.sort(pagination.sort.clone())
    }
}

fn populate_many(options: &QueryOptions, query: StoreQuery) -> StoreQuery {
    options
        .populate()
        .iter()
        .cloned()
        .fold(query, StoreQuery::populate)
}

fn select_by_id(options: &ByIdOptions, query: StoreQuery) -> StoreQuery {
    match options.projection() {
        Some(projection) => query.select(projection.clone()),
        None => query,
    }
}

fn sort_by_id(options: &ByIdOptions, query: StoreQuery) -> StoreQuery {
    if options.sort_keys().is_empty() {
        query
    } else {
        query.sort(options.sort_keys().to_vec())
    }
}

fn populate_by_id(options: &ByIdOptions, query: StoreQuery) -> StoreQuery {
    options
        .populate()
        .iter()
        .cloned()
        .fold(query, StoreQuery::populate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::{DeleteAck, ModelBackend, QueryKind, QueryPlan},
        error::DocumentStoreResult,
        options::{AspectSet, PaginationSort, PopulateSpec, Projection},
        query::{Expr, Filter, Sort, SortDirection},
    };
    use async_trait::async_trait;
    use bson::{Document, doc};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct Spy {
        plans: Mutex<Vec<QueryPlan>>,
    }

    #[async_trait]
    impl ModelBackend for Spy {
        fn name(&self) -> &str {
            "Spy"
        }

        async fn execute(&self, plan: QueryPlan) -> DocumentStoreResult<Vec<Document>> {
            self.plans.lock().unwrap().push(plan);
            Ok(vec![])
        }

        async fn create(&self, document: Document) -> DocumentStoreResult<Document> {
            Ok(document)
        }

        async fn delete_by_id(&self, _id: Bson) -> DocumentStoreResult<DeleteAck> {
            Ok(DeleteAck::default())
        }

        async fn delete_all(&self, _filter: Option<Expr>) -> DocumentStoreResult<DeleteAck> {
            Ok(DeleteAck::default())
        }

        async fn count(&self, _filter: Option<Expr>) -> DocumentStoreResult<u64> {
            Ok(0)
        }
    }

    fn options_for(set: AspectSet) -> QueryOptions {
        set.iter()
            .fold(QueryOptions::builder(), |builder, aspect| match aspect {
                Aspect::Condition => builder.condition(Filter::eq("status", "open")),
                Aspect::PaginationSort => builder
                    .limit(10)
                    .skip(5)
                    .sort("createdAt", SortDirection::Desc),
                Aspect::Projection => builder.projection(Projection::include(["status"])),
                Aspect::Populate => builder.populate(PopulateSpec::new("customer")),
            })
            .build()
    }

    #[test]
    fn every_combination_applies_exactly_its_aspects() {
        let spy = Arc::new(Spy::default());
        let model = Model::new(spy.clone());

        for set in AspectSet::all() {
            let plan = compose_many(&model, &options_for(set)).plan().clone();

            let filtered = matches!(plan.kind, QueryKind::Find { filter: Some(_) });
            assert_eq!(filtered, set.contains(Aspect::Condition), "{set}");
            assert_eq!(plan.select.is_some(), set.contains(Aspect::Projection), "{set}");
            assert_eq!(plan.limit.is_some(), set.contains(Aspect::PaginationSort), "{set}");
            assert_eq!(plan.skip.is_some(), set.contains(Aspect::PaginationSort), "{set}");
            assert_eq!(plan.sort.is_some(), set.contains(Aspect::PaginationSort), "{set}");
            assert_eq!(!plan.populate.is_empty(), set.contains(Aspect::Populate), "{set}");
        }
    }

    #[test]
    fn every_by_id_combination_applies_exactly_its_aspects() {
        let model = Model::new(Arc::new(Spy::default()));

        for set in AspectSet::all_by_id() {
            let options = ByIdOptions::from(options_for(set));
            let plan = compose_by_id(&model, Bson::Int32(1), &options).plan().clone();

            assert!(matches!(plan.kind, QueryKind::FindById { .. }));
            assert_eq!(plan.select.is_some(), set.contains(Aspect::Projection), "{set}");
            assert_eq!(plan.sort.is_some(), set.contains(Aspect::PaginationSort), "{set}");
            assert_eq!(!plan.populate.is_empty(), set.contains(Aspect::Populate), "{set}");
            assert_eq!(plan.limit, None, "{set}");
            assert_eq!(plan.skip, None, "{set}");
        }
    }

    #[test]
    fn by_id_never_windows_even_when_options_carry_limit_and_skip() {
        let model = Model::new(Arc::new(Spy::default()));
        let options = QueryOptions::builder()
            .pagination(PaginationSort::new().limit(3).skip(2))
            .build();

        let plan = compose_by_id(&model, Bson::Int32(7), &options.into()).plan().clone();

        assert_eq!(plan.limit, None);
        assert_eq!(plan.skip, None);
        assert_eq!(plan.sort, None);
    }

    #[test]
    fn open_orders_compose_into_one_query() {
        let model = Model::new(Arc::new(Spy::default()));
        let options = QueryOptions::builder()
            .condition(Expr::from_document(&doc! { "status": "open" }).unwrap())
            .limit(10)
            .sort("createdAt", SortDirection::Desc)
            .build();

        let plan = compose_many(&model, &options).plan().clone();

        assert_eq!(
            plan,
            QueryPlan {
                kind: QueryKind::Find { filter: Some(Filter::eq("status", "open")) },
                select: None,
                limit: Some(10),
                skip: None,
                sort: Some(vec![Sort::desc("createdAt")]),
                populate: vec![],
            }
        );
    }

    #[test]
    fn zero_limit_attaches_no_clause() {
        let model = Model::new(Arc::new(Spy::default()));
        let options = QueryOptions::builder().limit(0).build();

        let plan = compose_many(&model, &options).plan().clone();

        assert_eq!(plan.limit, None);
    }
}
