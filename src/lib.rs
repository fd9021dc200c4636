//! SmartSkill - Quiz Backend Library
//!
//! A quiz platform backend with:
//! - Keyword-overlap scoring of free-text answer justifications
//! - Quiz progress tracking and course recommendations
//! - OpenRouter tutor chat with difficulty prediction
//! - LLM-generated official justifications and keywords
//! - JWT authentication with bcrypt passwords
//!
//! # Example
//!
//! ```ignore
//! use smartskill::scoring::{verify_answer, Justification, ScoringPolicy};
//!
//! let result = verify_answer(&question, "Option2", &Justification::Text(text), ScoringPolicy::Tiered);
//! println!("{} ({} points)", result.message, result.total_score);
//! ```

pub mod types;
pub mod config;
pub mod scoring;
pub mod store;
pub mod tutor;
pub mod notify;
pub mod server;
pub mod cli;

pub use config::Config;

pub use scoring::{
    generate_keywords,
    verify_answer,
    Justification,
    ScoringPolicy,
    Verification,
};

pub use store::{SqliteStore, StoreError};

pub use tutor::{
    OpenRouterClient,
    TutorService,
};

pub use server::{
    router,
    ServerState,
    start as start_server,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - Quiz Backend Library", NAME, VERSION)
}
