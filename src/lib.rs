pub mod card;
pub mod config;
pub mod error;
pub mod progress;
pub mod review;
pub mod sm2;
pub mod store;
pub mod web;

pub use error::{Error, Result};
