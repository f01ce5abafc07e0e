pub mod enums;
pub mod history;
pub mod medication;
pub mod schedule;
pub mod timestamp;

pub use enums::*;
pub use history::*;
pub use medication::*;
pub use schedule::*;
