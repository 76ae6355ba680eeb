pub mod internal;

pub use internal::{Message, Role, SUMMARY_FAILURE_MARKER, SUMMARY_MARKER};
