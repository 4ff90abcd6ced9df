pub mod config;
pub mod dispatch;
pub mod error;
pub mod options;
pub mod parsers;
pub mod random;
pub mod task;
