//! Search planning: validated date windows and sender/subject filters.

pub mod plan;

pub use plan::{plan_range, plan_year, SearchSpec};
