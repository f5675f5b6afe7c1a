#![doc = include_str!("../README.md")]

pub use crate::error::{Error, Result};
pub use crate::types::*;

pub mod catalog;
pub mod convert;
pub mod coords;
mod error;
pub mod sector;
pub mod towns;
pub mod tree;
mod types;
pub mod utils;
