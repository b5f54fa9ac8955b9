pub mod console;
pub mod error;
pub mod flags;
pub mod memory;
pub mod report;
pub mod system;
pub mod trace;
