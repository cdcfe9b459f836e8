use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::Document;
use crate::error::Result;

type Step<T> = dyn Fn(Document) -> Result<T> + Send + Sync;

/// Ordered chain of mapping steps applied to each raw document on delivery.
///
/// Steps are composed once, when the cursor is configured; a started cursor's
/// chain never changes.
pub struct TransformChain<T> {
    apply: Arc<Step<T>>,
    steps: usize,
}

impl<T> Clone for TransformChain<T> {
    fn clone(&self) -> Self {
        Self {
            apply: Arc::clone(&self.apply),
            steps: self.steps,
        }
    }
}

impl TransformChain<Document> {
    pub fn identity() -> Self {
        Self {
            apply: Arc::new(|doc: Document| -> Result<Document> { Ok(doc) }),
            steps: 0,
        }
    }
}

impl<T: 'static> TransformChain<T> {
    /// Append an infallible step.
    pub fn then<U, F>(self, f: F) -> TransformChain<U>
    where
        U: 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let prev = self.apply;
        TransformChain {
            apply: Arc::new(move |doc: Document| prev(doc).map(&f)),
            steps: self.steps + 1,
        }
    }

    /// Append a fallible step; its error surfaces from the delivering call.
    pub fn try_then<U, F>(self, f: F) -> TransformChain<U>
    where
        U: 'static,
        F: Fn(T) -> Result<U> + Send + Sync + 'static,
    {
        let prev = self.apply;
        TransformChain {
            apply: Arc::new(move |doc: Document| prev(doc).and_then(&f)),
            steps: self.steps + 1,
        }
    }
}

impl<T> TransformChain<T> {
    pub fn apply(&self, doc: Document) -> Result<T> {
        (self.apply)(doc)
    }

    pub fn len(&self) -> usize {
        self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps == 0
    }
}

impl TransformChain<Document> {
    /// Deserialize each document into `U`.
    pub fn deserialize<U: DeserializeOwned + 'static>(self) -> TransformChain<U> {
        self.try_then(|doc| Ok(serde_json::from_value(Value::Object(doc))?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::doc;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn test_steps_apply_in_order() {
        let chain = TransformChain::identity()
            .then(|d: Document| d.get("n").and_then(Value::as_i64).unwrap_or(0))
            .then(|n| n * 10)
            .then(|n| n + 1);

        assert_eq!(chain.len(), 3);
        assert_eq!(chain.apply(doc(json!({"n": 4}))).unwrap(), 41);
    }

    #[test]
    fn test_deserialize_step() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Item {
            name: String,
        }

        let chain = TransformChain::identity().deserialize::<Item>();
        assert_eq!(
            chain.apply(doc(json!({"name": "a"}))).unwrap(),
            Item { name: "a".into() }
        );
        assert!(chain.apply(doc(json!({"other": 1}))).is_err());
    }
}
