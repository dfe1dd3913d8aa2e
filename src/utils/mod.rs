//! Host process helpers.

pub mod command;
