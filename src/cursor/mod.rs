//! Lazy, restartable `find` cursors
//!
//! A [`FindCursor`] owns a buffer of fetched-but-undelivered documents and the
//! server's opaque continuation token. Pages are fetched on demand, one at a
//! time, and delivered FIFO through the cursor's transform chain.
//!
//! Lifecycle: `Unstarted → Started → (Exhausted | Closed)`. Configuration is
//! only accepted while `Unstarted`. `Closed` is reachable from any state and
//! `rewind` returns any state to `Unstarted`.
//!
//! Pages are not a snapshot: a multi-page iteration without a vector sort can
//! observe concurrent inserts and deletes as skips or duplicates.

pub mod options;
pub mod transform;

#[cfg(test)]
mod tests;

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::ops::ControlFlow;

use futures::stream::{self, Stream};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::Document;
use crate::client::CommandClient;
use crate::error::{CursorError, Result};
use crate::transport::{CommandTarget, PageState};

pub use options::{FindOptions, FindQuery};
pub use transform::TransformChain;

/// Cursor lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    Unstarted,
    Started,
    Exhausted,
    Closed,
}

/// Paginated iteration over a `find` result set.
pub struct FindCursor<T = Document> {
    client: CommandClient,
    target: CommandTarget,
    query: FindQuery,
    transform: TransformChain<T>,
    buffer: VecDeque<Document>,
    page_state: Option<PageState>,
    state: CursorState,
    fetched_once: bool,
    sort_vector: Option<Value>,
    delivered: u64,
    pages_fetched: u64,
}

impl FindCursor<Document> {
    /// Create an unstarted cursor. No I/O happens until the first read.
    pub fn new(client: CommandClient, target: CommandTarget, query: FindQuery) -> Self {
        Self {
            client,
            target,
            query,
            transform: TransformChain::identity(),
            buffer: VecDeque::new(),
            page_state: None,
            state: CursorState::Unstarted,
            fetched_once: false,
            sort_vector: None,
            delivered: 0,
            pages_fetched: 0,
        }
    }

    /// Deserialize delivered documents into `U`.
    pub fn deserialize_into<U: DeserializeOwned + 'static>(self) -> Result<FindCursor<U>> {
        self.ensure_unstarted("deserialize_into")?;
        let transform = self.transform.clone().deserialize::<U>();
        Ok(self.with_transform(transform))
    }
}

impl<T: 'static> FindCursor<T> {
    /* ---------------------------- configuration ---------------------------- */

    fn ensure_unstarted(&self, operation: &'static str) -> Result<()> {
        if self.state != CursorState::Unstarted {
            return Err(CursorError::AlreadyStarted { operation }.into());
        }
        Ok(())
    }

    fn with_transform<U>(self, transform: TransformChain<U>) -> FindCursor<U> {
        FindCursor {
            client: self.client,
            target: self.target,
            query: self.query,
            transform,
            buffer: self.buffer,
            page_state: self.page_state,
            state: self.state,
            fetched_once: self.fetched_once,
            sort_vector: self.sort_vector,
            delivered: self.delivered,
            pages_fetched: self.pages_fetched,
        }
    }

    pub fn filter(mut self, filter: Document) -> Result<Self> {
        self.ensure_unstarted("filter")?;
        self.query.filter = filter;
        Ok(self)
    }

    pub fn sort(mut self, sort: Document) -> Result<Self> {
        self.ensure_unstarted("sort")?;
        self.query.options.sort = Some(sort);
        Ok(self)
    }

    pub fn projection(mut self, projection: Document) -> Result<Self> {
        self.ensure_unstarted("projection")?;
        self.query.options.projection = Some(projection);
        Ok(self)
    }

    /// `0` means unlimited.
    pub fn limit(mut self, limit: u64) -> Result<Self> {
        self.ensure_unstarted("limit")?;
        self.query.set_limit(limit);
        Ok(self)
    }

    pub fn skip(mut self, skip: u64) -> Result<Self> {
        self.ensure_unstarted("skip")?;
        self.query.options.skip = Some(skip);
        Ok(self)
    }

    pub fn include_similarity(mut self, include: bool) -> Result<Self> {
        self.ensure_unstarted("include_similarity")?;
        self.query.options.include_similarity = include;
        Ok(self)
    }

    pub fn include_sort_vector(mut self, include: bool) -> Result<Self> {
        self.ensure_unstarted("include_sort_vector")?;
        self.query.options.include_sort_vector = include;
        Ok(self)
    }

    /// Append a mapping step, changing the delivered type.
    pub fn map<U, F>(self, f: F) -> Result<FindCursor<U>>
    where
        U: 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        self.ensure_unstarted("map")?;
        let transform = self.transform.clone().then(f);
        Ok(self.with_transform(transform))
    }

    /// Append a fallible mapping step.
    pub fn try_map<U, F>(self, f: F) -> Result<FindCursor<U>>
    where
        U: 'static,
        F: Fn(T) -> Result<U> + Send + Sync + 'static,
    {
        self.ensure_unstarted("try_map")?;
        let transform = self.transform.clone().try_then(f);
        Ok(self.with_transform(transform))
    }

    /* ------------------------------ accessors ------------------------------ */

    pub fn state(&self) -> CursorState {
        self.state
    }

    pub fn query(&self) -> &FindQuery {
        &self.query
    }

    pub fn target(&self) -> &CommandTarget {
        &self.target
    }

    /// Documents fetched but not yet delivered.
    pub fn buffered_count(&self) -> usize {
        self.buffer.len()
    }

    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched
    }

    /// Take up to `max` raw buffered documents without triggering I/O.
    ///
    /// Bypasses the transform chain; taken documents count towards `limit`.
    pub fn consume_buffer(&mut self, max: usize) -> Vec<Document> {
        let take = max.min(self.buffer.len()).min(self.remaining_under_limit());
        self.delivered += take as u64;
        self.buffer.drain(..take).collect()
    }

    /* ------------------------------ iteration ------------------------------ */

    fn remaining_under_limit(&self) -> usize {
        match self.query.limit() {
            Some(limit) => limit.saturating_sub(self.delivered) as usize,
            None => usize::MAX,
        }
    }

    /// Make a document available in the buffer if the result set has one.
    ///
    /// Returns `false` once the cursor is exhausted or closed. A failed fetch
    /// leaves the buffer and continuation token untouched.
    async fn fill_buffer(&mut self) -> Result<bool> {
        loop {
            match self.state {
                CursorState::Closed | CursorState::Exhausted => return Ok(false),
                CursorState::Unstarted => self.state = CursorState::Started,
                CursorState::Started => {}
            }

            if self.remaining_under_limit() == 0 {
                debug!("Cursor on {} reached its limit", self.target);
                self.exhaust();
                return Ok(false);
            }
            if !self.buffer.is_empty() {
                return Ok(true);
            }
            if self.fetched_once && self.page_state.is_none() {
                self.exhaust();
                return Ok(false);
            }

            self.fetch_page().await?;
        }
    }

    fn exhaust(&mut self) {
        self.buffer.clear();
        self.state = CursorState::Exhausted;
    }

    async fn fetch_page(&mut self) -> Result<()> {
        let first_page = !self.fetched_once;
        let command = self.query.to_command(self.page_state.as_ref(), first_page);
        let budget = self.client.budget(None);

        let response = self.client.run(&self.target, command, &budget).await?;
        let documents = response.documents()?;
        let next_page_state = response.next_page_state();

        if first_page && self.query.options.include_sort_vector {
            self.sort_vector = response.status_field("sortVector").cloned();
        }

        debug!(
            "Fetched page {} of {} documents from {} (more: {})",
            self.pages_fetched + 1,
            documents.len(),
            self.target,
            next_page_state.is_some()
        );

        self.buffer.extend(documents);
        self.page_state = next_page_state;
        self.fetched_once = true;
        self.pages_fetched += 1;
        Ok(())
    }

    /// Next document, or `None` when the result set is exhausted.
    ///
    /// Once exhausted or closed, returns `None` without any I/O.
    pub async fn next(&mut self) -> Result<Option<T>> {
        if !self.fill_buffer().await? {
            return Ok(None);
        }
        let Some(doc) = self.buffer.pop_front() else {
            return Ok(None);
        };
        self.delivered += 1;
        self.transform.apply(doc).map(Some)
    }

    /// Whether another document is available, fetching a page if needed.
    pub async fn has_next(&mut self) -> Result<bool> {
        self.fill_buffer().await
    }

    /// Drain the cursor into a vector and close it.
    pub async fn to_vec(&mut self) -> Result<Vec<T>> {
        let mut items = Vec::with_capacity(self.buffer.len());
        let outcome = loop {
            match self.next().await {
                Ok(Some(item)) => items.push(item),
                Ok(None) => break Ok(items),
                Err(e) => break Err(e),
            }
        };
        self.close();
        outcome
    }

    /// Visit every document until exhaustion or until the visitor breaks.
    ///
    /// The cursor is closed afterwards in both cases.
    pub async fn for_each<F>(&mut self, mut visitor: F) -> Result<()>
    where
        F: FnMut(T) -> ControlFlow<()>,
    {
        let outcome = loop {
            match self.next().await {
                Ok(Some(item)) => {
                    if visitor(item).is_break() {
                        break Ok(());
                    }
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.close();
        outcome
    }

    /// Consume the cursor as an asynchronous stream.
    ///
    /// The cursor is closed when the stream ends or is dropped. A failed
    /// fetch yields `Err` and polling again retries the same page.
    pub fn into_stream(self) -> impl Stream<Item = Result<T>> {
        stream::unfold(Some(self), |cursor| async move {
            let mut cursor = cursor?;
            match cursor.next().await {
                Ok(Some(item)) => Some((Ok(item), Some(cursor))),
                Ok(None) => {
                    cursor.close();
                    None
                }
                Err(e) => Some((Err(e), Some(cursor))),
            }
        })
    }

    /// Sort vector reported with the first page.
    ///
    /// `None` without I/O unless [`FindCursor::include_sort_vector`] was set;
    /// otherwise fetches the first page if needed (buffering its documents).
    pub async fn get_sort_vector(&mut self) -> Result<Option<Value>> {
        if !self.query.options.include_sort_vector {
            return Ok(None);
        }
        if !self.fetched_once {
            self.fill_buffer().await?;
        }
        Ok(self.sort_vector.clone())
    }

    /// Stop the iteration. Later reads return immediately without I/O.
    pub fn close(&mut self) {
        self.buffer.clear();
        self.state = CursorState::Closed;
    }

    /// Consuming [`FindCursor::rewind`] for cursors of any element type.
    ///
    /// Returns an `Unstarted` raw document cursor; mapping steps are dropped
    /// and configuration is kept.
    pub fn rewound(self) -> FindCursor<Document> {
        let mut cursor = self.with_transform(TransformChain::identity());
        cursor.reset();
        cursor
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.page_state = None;
        self.state = CursorState::Unstarted;
        self.fetched_once = false;
        self.sort_vector = None;
        self.delivered = 0;
        self.pages_fetched = 0;
    }

    /// A fresh unstarted cursor over raw documents with the same configuration.
    pub fn clone_fresh(&self) -> FindCursor<Document> {
        FindCursor::new(self.client.clone(), self.target.clone(), self.query.clone())
    }
}

impl FindCursor<Document> {
    /// Reset in place to `Unstarted`, discarding buffer, token, cached sort
    /// vector and mapping steps. Configuration is kept.
    pub fn rewind(&mut self) {
        self.transform = TransformChain::identity();
        self.reset();
    }

    /// Distinct values of `key` (dot-separated path) over the remaining documents.
    ///
    /// Arrays along the path are flattened. Values are compared by their JSON
    /// representation. Closes the cursor.
    pub async fn distinct(&mut self, key: &str) -> Result<Vec<Value>> {
        let path: Vec<&str> = key.split('.').collect();
        let mut seen = HashSet::new();
        let mut values = Vec::new();

        let outcome = loop {
            match self.next().await {
                Ok(Some(doc)) => {
                    let mut found = Vec::new();
                    collect_path(&Value::Object(doc), &path, &mut found);
                    for value in found {
                        if seen.insert(value.to_string()) {
                            values.push(value);
                        }
                    }
                }
                Ok(None) => break Ok(values),
                Err(e) => break Err(e),
            }
        };
        self.close();
        outcome
    }
}

fn collect_path(value: &Value, path: &[&str], out: &mut Vec<Value>) {
    match (value, path.split_first()) {
        (Value::Array(items), _) => {
            for item in items {
                collect_path(item, path, out);
            }
        }
        (_, None) => out.push(value.clone()),
        (Value::Object(map), Some((head, rest))) => {
            if let Some(child) = map.get(*head) {
                collect_path(child, rest, out);
            }
        }
        _ => {}
    }
}

impl<T> fmt::Debug for FindCursor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FindCursor")
            .field("target", &self.target)
            .field("state", &self.state)
            .field("buffered", &self.buffer.len())
            .field("page_state", &self.page_state)
            .field("delivered", &self.delivered)
            .field("transform_steps", &self.transform.len())
            .finish()
    }
}
