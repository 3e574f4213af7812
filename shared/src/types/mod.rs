//! Core data types

pub mod click;
pub mod range;
