pub mod batch;
pub mod config;
pub mod error;
pub mod generate;
pub mod output;
pub mod parser;
pub mod print;
pub mod roster;
pub mod rubric;
pub mod sheet;
pub mod stats;
pub mod totalize;

pub use error::{GradeError, Result};
