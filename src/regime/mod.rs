pub mod classifier;
pub mod history;
pub mod state_machine;
pub mod streak;

pub use classifier::*;
pub use history::*;
pub use state_machine::*;
pub use streak::*;
