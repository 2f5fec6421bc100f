pub mod assignments;
pub mod catalog;
pub mod committees;
pub mod core;
pub mod directory;
pub mod exam_questions;
pub mod setup;
