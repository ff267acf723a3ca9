pub mod events;
pub mod fetch;
pub mod format;
pub mod segments;
