//! CLI command handlers. Each command is in its own file.

mod checksum;
mod control;
mod follow;
mod get;
mod history;
mod list;

pub use checksum::run_checksum;
pub use control::{run_cancel, run_remove, run_resume};
pub use get::{run_get, GetArgs};
pub use history::run_history;
pub use list::run_list;
