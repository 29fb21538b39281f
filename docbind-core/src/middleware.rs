//! Lifecycle hooks run around datastore operations.
//!
//! A [`MiddlewareChain`] holds middleware in registration order and runs every
//! hook over all of them in that order:
//!
//! - `on_create` runs before every `create` and `find_one_and_update`; an
//!   error aborts the write.
//! - `on_pre_check` receives the raw filter of a single-document fetch and
//!   writes into a shared accumulator of derived options. Middleware add to
//!   the accumulator; none of them replaces it.
//! - `on_post_check` votes on the fetched document. The verdicts are AND-ed
//!   and every middleware runs even after a `false`.

use bson::Document;
use std::{fmt, sync::Arc};

use crate::error::DocumentStoreResult;

/// A set of optional hooks. Every method defaults to a no-op.
pub trait DatastoreMiddleware: Send + Sync {
    /// Called with the document about to be written. May modify it.
    fn on_create(&self, _document: &mut Document) -> DocumentStoreResult<()> {
        Ok(())
    }

    /// Called with the raw filter of a single-document fetch.
    fn on_pre_check(&self, _raw: &Document, _derived: &mut Document) {}

    /// Called with the fetched document and the derived options; returning
    /// `false` hides the document from the caller.
    fn on_post_check(&self, _document: &Document, _derived: &Document) -> bool {
        true
    }
}

#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn DatastoreMiddleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, middleware: Arc<dyn DatastoreMiddleware>) {
        self.middlewares.push(middleware);
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    pub fn run_create(&self, document: &mut Document) -> DocumentStoreResult<()> {
        for middleware in &self.middlewares {
            middleware.on_create(document)?;
        }

        Ok(())
    }

    pub fn run_pre_check(&self, raw: &Document) -> Document {
        let mut derived = Document::new();

        for middleware in &self.middlewares {
            middleware.on_pre_check(raw, &mut derived);
        }

        derived
    }

    pub fn run_post_check(&self, document: &Document, derived: &Document) -> bool {
        self.middlewares
            .iter()
            .fold(true, |verdict, middleware| middleware.on_post_check(document, derived) & verdict)
    }
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("len", &self.middlewares.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DocumentStoreError;
    use bson::{Bson, doc};
    use std::sync::Mutex;

    struct Recorder {
        label: &'static str,
        verdict: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl DatastoreMiddleware for Recorder {
        fn on_create(&self, document: &mut Document) -> DocumentStoreResult<()> {
            self.log.lock().unwrap().push(format!("create:{}", self.label));
            document.insert(self.label, true);
            Ok(())
        }

        fn on_pre_check(&self, raw: &Document, derived: &mut Document) {
            self.log.lock().unwrap().push(format!("pre:{}", self.label));
            if let Some(value) = raw.get(self.label) {
                derived.insert(self.label, value.clone());
            }
        }

        fn on_post_check(&self, _document: &Document, _derived: &Document) -> bool {
            self.log.lock().unwrap().push(format!("post:{}", self.label));
            self.verdict
        }
    }

    fn chain(verdicts: &[(&'static str, bool)]) -> (MiddlewareChain, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = MiddlewareChain::new();

        for &(label, verdict) in verdicts {
            chain.push(Arc::new(Recorder { label, verdict, log: log.clone() }));
        }

        (chain, log)
    }

    #[test]
    fn post_check_runs_every_middleware_after_a_veto() {
        let (chain, log) = chain(&[("m1", false), ("m2", true)]);

        assert!(!chain.run_post_check(&doc! {}, &doc! {}));
        assert_eq!(*log.lock().unwrap(), vec!["post:m1", "post:m2"]);
    }

    #[test]
    fn post_check_is_the_conjunction_of_verdicts() {
        for (v1, v2) in [(true, true), (true, false), (false, true), (false, false)] {
            let (chain, _) = chain(&[("m1", v1), ("m2", v2)]);

            assert_eq!(chain.run_post_check(&doc! {}, &doc! {}), v1 && v2);
        }
    }

    #[test]
    fn empty_chain_accepts() {
        assert!(MiddlewareChain::new().run_post_check(&doc! {}, &doc! {}));
    }

    #[test]
    fn pre_check_accumulates_in_registration_order() {
        let (chain, log) = chain(&[("tenant", true), ("owner", true)]);

        let derived = chain.run_pre_check(&doc! { "tenant": "acme", "owner": "bob", "status": "open" });

        assert_eq!(derived, doc! { "tenant": "acme", "owner": "bob" });
        assert_eq!(*log.lock().unwrap(), vec!["pre:tenant", "pre:owner"]);
    }

    #[test]
    fn create_failure_stops_the_chain() {
        struct Reject;

        impl DatastoreMiddleware for Reject {
            fn on_create(&self, _document: &mut Document) -> DocumentStoreResult<()> {
                Err(DocumentStoreError::Middleware("rejected".into()))
            }
        }

        let (mut chain, log) = chain(&[("m1", true)]);
        chain.push(Arc::new(Reject));
        let mut document = doc! {};

        assert!(chain.run_create(&mut document).is_err());
        assert_eq!(document.get("m1"), Some(&Bson::Boolean(true)));
        assert_eq!(*log.lock().unwrap(), vec!["create:m1"]);
    }
}
