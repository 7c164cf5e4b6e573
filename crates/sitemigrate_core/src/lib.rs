pub mod analyze;
pub mod checksum;
pub mod config;
pub mod dates;
pub mod document;
pub mod extract;
pub mod news;
pub mod output;
pub mod render;
pub mod report;
pub mod segment;
pub mod verify;
