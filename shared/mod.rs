//! Plumbing shared by every pipeline stage.

pub mod artifact;
pub mod diagnostics;
pub mod linalg;
pub mod seeding;
pub mod stats;
pub mod table;
