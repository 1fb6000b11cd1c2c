//! Query evaluation over iterables of documents.

use crate::error::DbResult;
use crate::query::Filter;
use gasdb_codec::Value;

/// Evaluates filter expressions against documents.
///
/// The engine is stateless; every helper compiles the filter once and
/// then scans. Callers running many evaluations against the same filter
/// should compile it themselves with [`Filter::compile`] and reuse it.
#[derive(Debug)]
pub struct QueryEngine;

impl QueryEngine {
    /// Tests a single document against a filter.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` when the filter is malformed.
    pub fn matches(doc: &Value, filter: &Value) -> DbResult<bool> {
        Ok(Filter::compile(filter)?.matches(doc))
    }

    /// Returns the first matching document.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` when the filter is malformed.
    pub fn find_first<'a, I>(docs: I, filter: &Value) -> DbResult<Option<&'a Value>>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let compiled = Filter::compile(filter)?;
        Ok(docs.into_iter().find(|doc| compiled.matches(doc)))
    }

    /// Returns every matching document.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` when the filter is malformed.
    pub fn find_all<'a, I>(docs: I, filter: &Value) -> DbResult<Vec<&'a Value>>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let compiled = Filter::compile(filter)?;
        Ok(docs
            .into_iter()
            .filter(|doc| compiled.matches(doc))
            .collect())
    }

    /// Counts the matching documents.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuery` when the filter is malformed.
    pub fn count<'a, I>(docs: I, filter: &Value) -> DbResult<usize>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        let compiled = Filter::compile(filter)?;
        Ok(docs.into_iter().filter(|doc| compiled.matches(doc)).count())
    }
}
