pub mod alert;
pub mod client;
pub mod log_entry;
