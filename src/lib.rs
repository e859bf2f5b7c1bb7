pub mod calc;
pub mod config;
pub mod db;
pub mod guard;
pub mod ipc;
pub mod model;
pub mod nav;
pub mod notify;
pub mod session;
