#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod action;
pub mod db;
pub mod engine;
pub mod error;
pub mod inventory;
pub mod resolve;
pub mod sink;
pub mod util;
