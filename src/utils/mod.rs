pub mod command;
pub mod counts;
pub mod file;
pub mod streams;
pub mod system;
