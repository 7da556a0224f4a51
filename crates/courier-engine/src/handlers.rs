// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Named category handlers.
//!
//! A [`RequestCategory`](courier_core::RequestCategory) refers to its logic by
//! name. The same handler is called twice in a request's life: once as a
//! matcher during categorization, where it reports `category_match`, and
//! once to process the request after it was queued.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use courier_core::{CourierError, Metadata, Request};

/// Metadata key a matcher sets to a boolean.
pub const MATCH_KEY: &str = "category_match";

/// Match and process logic for one or more categories.
#[async_trait]
pub trait CategoryHandler: Send + Sync {
    /// Name categories use to refer to this handler.
    fn name(&self) -> &str;

    /// Run against `request` with a copy of its metadata.
    ///
    /// When matching, the returned map must carry a boolean
    /// [`MATCH_KEY`]; everything else in it is merged into the request on a
    /// match. When processing, the returned map replaces the request's
    /// metadata.
    async fn call(&self, request: &Request, metadata: Metadata) -> Result<Metadata, CourierError>;
}

/// Handlers indexed by name.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn CategoryHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its `name()`, replacing any previous one.
    pub fn register(&mut self, handler: Arc<dyn CategoryHandler>) {
        self.handlers.insert(handler.name().to_string(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CategoryHandler>> {
        self.handlers.get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// The boolean match decision in a matcher result, if there is one.
pub fn match_decision(result: &Metadata) -> Option<bool> {
    result.get(MATCH_KEY).and_then(serde_json::Value::as_bool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::Platform;

    struct Always(&'static str);

    #[async_trait]
    impl CategoryHandler for Always {
        fn name(&self) -> &str {
            self.0
        }

        async fn call(&self, _: &Request, mut metadata: Metadata) -> Result<Metadata, CourierError> {
            metadata.insert(MATCH_KEY.into(), true.into());
            Ok(metadata)
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = HandlerRegistry::new();
        assert!(registry.is_empty());
        registry.register(Arc::new(Always("billing")));
        registry.register(Arc::new(Always("abuse")));
        registry.register(Arc::new(Always("billing")));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["abuse", "billing"]);
        assert!(registry.get("billing").is_some());
        assert!(registry.get("unknown").is_none());
    }

    #[tokio::test]
    async fn match_decision_requires_a_boolean() {
        let request = Request::new(Platform::Email, "<m@x>", "a@x", "ch");
        let result = Always("x").call(&request, Metadata::new()).await.unwrap();
        assert_eq!(match_decision(&result), Some(true));

        let mut loose = Metadata::new();
        loose.insert(MATCH_KEY.into(), "yes".into());
        assert_eq!(match_decision(&loose), None);
        assert_eq!(match_decision(&Metadata::new()), None);
    }
}
