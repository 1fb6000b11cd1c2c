//! Document primitives: field paths and validation.

mod path;
mod validate;

pub use path::{FieldPath, PathError};
pub use validate::validate_document;
