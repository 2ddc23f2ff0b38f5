pub mod access;
pub mod assessments;
pub mod auth;
pub mod books;
pub mod catalog;
pub mod chapters;
pub mod classes;
pub mod content;
pub mod error;
pub mod in_flight;
pub mod json_extract;
pub mod pdf;
pub mod poller;
pub mod rate_limit;
pub mod session;
pub mod speech_text;
