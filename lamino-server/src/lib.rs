pub mod error;
pub mod http;
pub mod pages;
pub mod session;
pub mod subsystems;
