pub mod parsing;
pub mod task;
