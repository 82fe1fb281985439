//! Reply drafting.

pub mod generator;

pub use generator::ReplyGenerator;
