mod commands;
mod queries;
mod types;

pub(crate) use commands::save_if_revision;
pub(crate) use queries::{find_by_id, list_by_exam};
