pub mod commands;
pub mod uploads;
