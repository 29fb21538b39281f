//! Helpers for resolving reference fields into embedded documents.
//!
//! Backends fetch the referenced documents themselves (applying the nested
//! projection and sort at the store), then call [`embed`] to splice them into
//! the parent documents.

use bson::{Bson, Document};

use crate::options::PopulateSpec;

/// The distinct ids held in `path` across `documents`, in encounter order.
///
/// The field may hold a single id or an array of ids.
pub fn referenced_ids(documents: &[Document], path: &str) -> Vec<Bson> {
    let mut ids: Vec<Bson> = Vec::new();

    for value in documents.iter().filter_map(|doc| doc.get(path)) {
        let candidates = match value {
            Bson::Array(items) => items.iter().collect::<Vec<_>>(),
            Bson::Null => Vec::new(),
            single => vec![single],
        };

        for id in candidates {
            if !ids.contains(id) {
                ids.push(id.clone());
            }
        }
    }

    ids
}

/// Replaces the ids in `spec.path` with the matching documents from `related`.
///
/// A single id with no match becomes `null`. Arrays keep only the matched
/// documents; when `spec` carries a sort they follow the order of `related`
/// (which the backend sorted), otherwise the order of the ids. `skip` and
/// `limit` then window each array.
pub fn embed(documents: &mut [Document], spec: &PopulateSpec, related: &[Document]) {
    let find = |id: &Bson| {
        related
            .iter()
            .find(|doc| doc.get("_id") == Some(id))
    };
    let sorted = spec
        .options
        .as_ref()
        .is_some_and(|o| !o.sort.is_empty());
    let skip = spec
        .options
        .as_ref()
        .and_then(|o| o.effective_skip())
        .unwrap_or(0) as usize;
    let limit = spec
        .options
        .as_ref()
        .and_then(|o| o.effective_limit())
        .map(|n| n as usize)
        .unwrap_or(usize::MAX);

    for document in documents.iter_mut() {
        let replacement = match document.get(&spec.path) {
            None => continue,
            Some(Bson::Array(ids)) => {
                let matched: Vec<Bson> = if sorted {
                    related
                        .iter()
                        .filter(|doc| doc.get("_id").is_some_and(|id| ids.contains(id)))
                        .map(|doc| Bson::Document(doc.clone()))
                        .collect()
                } else {
                    ids.iter()
                        .filter_map(|id| find(id))
                        .map(|doc| Bson::Document(doc.clone()))
                        .collect()
                };

                Bson::Array(
                    matched
                        .into_iter()
                        .skip(skip)
                        .take(limit)
                        .collect(),
                )
            }
            Some(id) => find(id)
                .map(|doc| Bson::Document(doc.clone()))
                .unwrap_or(Bson::Null),
        };

        document.insert(spec.path.clone(), replacement);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{options::PaginationSort, query::SortDirection};
    use bson::doc;

    #[test]
    fn collects_distinct_ids() {
        let docs = vec![
            doc! { "customer": 1, "tags": [10, 11] },
            doc! { "customer": 1, "tags": [11, 12] },
            doc! { "customer": 2 },
        ];

        assert_eq!(referenced_ids(&docs, "customer"), vec![Bson::Int32(1), Bson::Int32(2)]);
        assert_eq!(
            referenced_ids(&docs, "tags"),
            vec![Bson::Int32(10), Bson::Int32(11), Bson::Int32(12)]
        );
    }

    #[test]
    fn embeds_single_and_missing_references() {
        let mut docs = vec![doc! { "customer": 1 }, doc! { "customer": 9 }];
        let related = vec![doc! { "_id": 1, "name": "Ada" }];

        embed(&mut docs, &PopulateSpec::new("customer"), &related);

        assert_eq!(docs[0].get_document("customer").unwrap(), &doc! { "_id": 1, "name": "Ada" });
        assert_eq!(docs[1].get("customer"), Some(&Bson::Null));
    }

    #[test]
    fn windows_sorted_arrays() {
        let mut docs = vec![doc! { "items": [1, 2, 3] }];
        let related = vec![
            doc! { "_id": 3, "n": "c" },
            doc! { "_id": 2, "n": "b" },
            doc! { "_id": 1, "n": "a" },
        ];
        let spec = PopulateSpec::new("items")
            .options(PaginationSort::new().sort("n", SortDirection::Desc).skip(1).limit(1));

        embed(&mut docs, &spec, &related);

        assert_eq!(docs[0].get_array("items").unwrap(), &vec![Bson::Document(doc! { "_id": 2, "n": "b" })]);
    }
}
