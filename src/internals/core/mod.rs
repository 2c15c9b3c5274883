pub mod debouncer;
pub mod system;
