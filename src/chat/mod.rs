pub mod commands;
pub mod doctor;
pub mod repl;
pub mod session;
