// dblocalsync/src/links/mod.rs
pub(crate) mod rewrite;

pub use rewrite::{RelinkReport, relink_database};
