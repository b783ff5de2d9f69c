//! Utility modules

pub mod names;

pub use names::{generate_tag_name, sanitize_filename, validate_tag_name};
