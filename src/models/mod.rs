pub mod alert_event;
pub mod command;
pub mod detection_sample;
