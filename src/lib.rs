#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::needless_pass_by_value,
    clippy::return_self_not_must_use,
    clippy::similar_names,
    clippy::uninlined_format_args,
    clippy::unnecessary_map_or,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

pub mod config;
pub mod history;
pub mod infra;

pub use config::Config;
pub use history::{ChatThread, ConversationKey, ConversationStore};
