pub mod channel;
pub mod discovery;
pub mod services;
pub mod task;
