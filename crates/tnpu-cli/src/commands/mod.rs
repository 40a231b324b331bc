//! CLI command implementations

pub mod golden;
pub mod inspect;
pub mod pack;
pub mod verify;

pub use golden::GoldenCommand;
pub use inspect::InspectCommand;
pub use pack::PackCommand;
pub use verify::VerifyCommand;
