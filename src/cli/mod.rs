pub mod args;

use clap::Parser;

pub use args::{Arguments, Commands, CompareArgs};

pub fn parse() -> Arguments {
    Arguments::parse()
}
