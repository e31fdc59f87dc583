pub mod action;
pub mod config;
pub mod error;
pub mod events;
pub mod goal;
pub mod hold;
pub mod io;
pub mod paths;
pub mod scheduler;

pub use error::{Result, VigilError};
