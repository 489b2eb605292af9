#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::implicit_clone,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::needless_pass_by_value,
    clippy::redundant_closure_for_method_calls,
    clippy::similar_names,
    clippy::struct_field_names,
    clippy::too_many_lines,
    clippy::uninlined_format_args
)]

pub mod config;
pub mod infra;
pub mod relay;
pub mod router;
pub mod sessions;
pub mod slack;

pub use config::Config;
