//! # lamp-id
//!
//! Resource identity for lamp resources.
//!
//! ## Design Principles
//!
//! - A resource is identified by `namespace` + `name`, unique together
//! - The canonical string form is `{namespace}/{name}`
//! - Parsing is strict: both parts are validated and exactly one `/` is allowed
//! - Identities order by namespace first, then name
//!
//! Examples:
//! - `default/desk-lamp`
//! - `office.floor-2/hallway`

mod error;
mod types;

pub use error::IdError;
pub use types::*;
