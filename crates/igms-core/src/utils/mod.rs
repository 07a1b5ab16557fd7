//! Utility functions for parsing and formatting dashboard input.

pub mod format;

pub use format::{escape_key_component, normalize_department, parse_date, truncate_string};
