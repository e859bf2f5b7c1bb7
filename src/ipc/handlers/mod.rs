pub mod admin;
pub mod auth;
pub mod core;
pub mod parent;
pub mod shell;
pub mod student;
pub mod teacher;
