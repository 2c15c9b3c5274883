pub mod detector;
pub mod hardware;
