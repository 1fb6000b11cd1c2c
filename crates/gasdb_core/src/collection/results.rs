//! MongoDB-style operation results.

/// Result of a successful `insert_one`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertOneResult {
    /// The id the document was stored under.
    pub inserted_id: String,
    /// Always true once the call returns successfully.
    pub acknowledged: bool,
}

/// Result of a successful `update_one`, `update_many`, or
/// `replace_one`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateResult {
    /// How many documents matched the filter.
    pub matched_count: u64,
    /// How many documents actually changed.
    pub modified_count: u64,
    /// Always true once the call returns successfully.
    pub acknowledged: bool,
}

/// Result of a successful `delete_one` or `delete_many`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteResult {
    /// How many documents were removed.
    pub deleted_count: u64,
    /// Always true once the call returns successfully.
    pub acknowledged: bool,
}
