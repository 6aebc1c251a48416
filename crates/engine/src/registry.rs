//! Run registry: where execution contexts live between calls.

use std::sync::Arc;

use dashmap::DashMap;

use crate::context::ExecutionContext;

/// Key-value store of runs, keyed by run id.
///
/// Also answers "which run issued this callback id", by scan or by index,
/// at the implementation's choice.
pub trait RunStore: Send + Sync {
    fn put(&self, ctx: Arc<ExecutionContext>);

    fn get(&self, run_id: &str) -> Option<Arc<ExecutionContext>>;

    fn find_by_callback(&self, callback_id: &str) -> Option<Arc<ExecutionContext>>;

    fn remove(&self, run_id: &str) -> Option<Arc<ExecutionContext>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local store. Callback lookups scan every stored run.
#[derive(Default)]
pub struct InMemoryRunStore {
    runs: DashMap<String, Arc<ExecutionContext>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunStore for InMemoryRunStore {
    fn put(&self, ctx: Arc<ExecutionContext>) {
        self.runs.insert(ctx.run_id().to_owned(), ctx);
    }

    fn get(&self, run_id: &str) -> Option<Arc<ExecutionContext>> {
        self.runs.get(run_id).map(|entry| Arc::clone(entry.value()))
    }

    fn find_by_callback(&self, callback_id: &str) -> Option<Arc<ExecutionContext>> {
        self.runs
            .iter()
            .find(|entry| entry.value().owns_callback(callback_id))
            .map(|entry| Arc::clone(entry.value()))
    }

    fn remove(&self, run_id: &str) -> Option<Arc<ExecutionContext>> {
        self.runs.remove(run_id).map(|(_, ctx)| ctx)
    }

    fn len(&self) -> usize {
        self.runs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GraphRequest, Node};

    fn run(id: &str) -> Arc<ExecutionContext> {
        Arc::new(ExecutionContext::new(
            id,
            GraphRequest {
                nodes: vec![Node::callback("cb")],
                edges: vec![],
            },
        ))
    }

    #[test]
    fn put_get_remove() {
        let store = InMemoryRunStore::new();
        assert!(store.is_empty());

        store.put(run("r1"));
        store.put(run("r2"));
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("r1").map(|c| c.run_id().to_owned()).as_deref(), Some("r1"));
        assert!(store.get("nope").is_none());

        assert!(store.remove("r1").is_some());
        assert!(store.remove("r1").is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn finds_the_run_that_issued_a_callback() {
        let store = InMemoryRunStore::new();
        let (r1, r2) = (run("r1"), run("r2"));
        r2.suspend("cb", "cb-42");
        store.put(r1);
        store.put(r2);

        let owner = store.find_by_callback("cb-42").expect("owner found");
        assert_eq!(owner.run_id(), "r2");
        assert!(store.find_by_callback("cb-0").is_none());
    }
}
