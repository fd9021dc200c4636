//! Answer scoring
//!
//! - Keyword extraction from free-text justifications
//! - Option check plus keyword-overlap credit
//! - Quiz summaries and course recommendations

pub mod keywords;
pub mod verify;
pub mod recommend;

pub use keywords::{generate_keywords, normalize_keyword};
pub use verify::{verify_answer, Justification, ScoringPolicy, Verification};
pub use recommend::{build_progress, course_for, dashboard_level, level_for_percentage, summarize, QuizSummary};
