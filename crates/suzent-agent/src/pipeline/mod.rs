pub mod attach;
pub mod context;
pub mod process;

pub use context::TurnContext;
pub use process::{process_turn, run_turn_collect, IncomingFile, TurnRequest};
