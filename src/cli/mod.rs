//! CLI command handling

pub mod history;
pub mod output;
pub mod play;
pub mod shutdown;

pub use history::*;
pub use output::*;
pub use play::*;
pub use shutdown::*;
