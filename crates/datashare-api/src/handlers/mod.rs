pub mod admin;
pub mod download;
