//! SQLite-based persistent storage

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{StoreError, StoreResult};
use crate::types::{Level, ProgressEntry, Question, User};

/// Account fields supplied at registration
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// Row counts
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreStats {
    pub users: usize,
    pub questions: usize,
    pub questions_missing_content: usize,
    pub quizzes_taken: usize,
}

/// SQLite store for users, questions and progress
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`
    pub async fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let conn = Connection::open(&path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;")?;
        Self::init_schema(&conn)?;

        tracing::debug!("Opened store at {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store, mostly for tests
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> StoreResult<()> {
        conn.execute_batch(r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                reset_token TEXT,
                reset_token_expiry INTEGER,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS questions (
                id TEXT PRIMARY KEY,
                question TEXT NOT NULL,
                option1 TEXT NOT NULL,
                option2 TEXT NOT NULL,
                option3 TEXT NOT NULL,
                option4 TEXT NOT NULL,
                correct_option TEXT NOT NULL,
                difficulty_level TEXT,
                justification_text TEXT,
                keywords TEXT NOT NULL DEFAULT '[]'
            );

            CREATE TABLE IF NOT EXISTS progress (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                quiz_date TEXT NOT NULL,
                total_score REAL NOT NULL,
                total_possible_score REAL NOT NULL,
                score_percentage REAL NOT NULL,
                recommended_level TEXT NOT NULL,
                recommended_course TEXT NOT NULL,
                answers TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_users_reset_token ON users(reset_token);
            CREATE INDEX IF NOT EXISTS idx_questions_difficulty ON questions(difficulty_level);
            CREATE INDEX IF NOT EXISTS idx_progress_user ON progress(user_id, quiz_date);
        "#)?;
        Ok(())
    }

    // ============ Users ============

    /// Create an account; the email must be unused
    pub async fn create_user(&self, new_user: NewUser) -> StoreResult<User> {
        let conn = self.conn.lock().await;

        let email = new_user.email.trim().to_lowercase();
        let exists: bool = conn
            .query_row("SELECT 1 FROM users WHERE email = ?1", params![email], |_| Ok(true))
            .optional()?
            .unwrap_or(false);
        if exists {
            return Err(StoreError::Conflict("Email"));
        }

        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            username: new_user.username,
            email,
            password_hash: new_user.password_hash,
            reset_token: None,
            reset_token_expiry: None,
            created_at: Utc::now(),
        };

        conn.execute(
            "INSERT INTO users (id, username, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![user.id, user.username, user.email, user.password_hash, user.created_at.to_rfc3339()],
        )?;

        Ok(user)
    }

    pub async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let conn = self.conn.lock().await;
        let user = conn
            .query_row(
                "SELECT id, username, email, password_hash, reset_token, reset_token_expiry, created_at
                 FROM users WHERE email = ?1",
                params![email.trim().to_lowercase()],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub async fn find_user_by_id(&self, id: &str) -> StoreResult<Option<User>> {
        let conn = self.conn.lock().await;
        let user = conn
            .query_row(
                "SELECT id, username, email, password_hash, reset_token, reset_token_expiry, created_at
                 FROM users WHERE id = ?1",
                params![id],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Store a reset token for the account
    pub async fn set_reset_token(&self, user_id: &str, token: &str, expires_at: DateTime<Utc>) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE users SET reset_token = ?1, reset_token_expiry = ?2 WHERE id = ?3",
            params![token, expires_at.timestamp(), user_id],
        )?;
        Ok(())
    }

    /// Account owning an unexpired reset token
    pub async fn find_user_by_reset_token(&self, token: &str, now: DateTime<Utc>) -> StoreResult<Option<User>> {
        let conn = self.conn.lock().await;
        let user = conn
            .query_row(
                "SELECT id, username, email, password_hash, reset_token, reset_token_expiry, created_at
                 FROM users WHERE reset_token = ?1 AND reset_token_expiry > ?2",
                params![token, now.timestamp()],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// Replace the password hash and clear any reset token
    pub async fn update_password(&self, user_id: &str, password_hash: &str) -> StoreResult<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE users SET password_hash = ?1, reset_token = NULL, reset_token_expiry = NULL WHERE id = ?2",
            params![password_hash, user_id],
        )?;
        Ok(())
    }

    // ============ Questions ============

    /// Insert or replace a question; an empty id gets a fresh one
    pub async fn insert_question(&self, question: &Question) -> StoreResult<String> {
        let id = if question.id.trim().is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            question.id.clone()
        };
        let keywords = serde_json::to_string(&question.keywords)?;

        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT OR REPLACE INTO questions
               (id, question, option1, option2, option3, option4, correct_option,
                difficulty_level, justification_text, keywords)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
            params![
                id,
                question.question,
                question.option1,
                question.option2,
                question.option3,
                question.option4,
                question.correct_option,
                question.difficulty_level,
                question.justification_text,
                keywords,
            ],
        )?;

        Ok(id)
    }

    pub async fn get_question(&self, id: &str) -> StoreResult<Option<Question>> {
        let conn = self.conn.lock().await;
        let question = conn
            .query_row(
                &format!("SELECT {} FROM questions WHERE id = ?1", QUESTION_COLUMNS),
                params![id],
                row_to_question,
            )
            .optional()?;
        Ok(question)
    }

    /// Random sample of up to `size` questions
    pub async fn sample_questions(&self, size: usize) -> StoreResult<Vec<Question>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM questions ORDER BY RANDOM() LIMIT ?1",
            QUESTION_COLUMNS
        ))?;
        let questions = stmt
            .query_map(params![size as i64], row_to_question)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(questions)
    }

    pub async fn count_questions(&self) -> StoreResult<usize> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM questions", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Questions lacking a justification or keywords
    pub async fn questions_missing_content(&self, limit: usize) -> StoreResult<Vec<Question>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM questions {} ORDER BY id LIMIT ?1",
            QUESTION_COLUMNS, MISSING_CONTENT_FILTER
        ))?;
        let questions = stmt
            .query_map(params![limit as i64], row_to_question)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(questions)
    }

    /// Store generated justification and keywords
    pub async fn update_question_content(&self, id: &str, justification: &str, keywords: &[String]) -> StoreResult<()> {
        let keywords = serde_json::to_string(keywords)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE questions SET justification_text = ?1, keywords = ?2 WHERE id = ?3",
            params![justification, keywords, id],
        )?;
        Ok(())
    }

    // ============ Progress ============

    /// Append a finished quiz to a user's history
    pub async fn append_progress(&self, user_id: &str, entry: &ProgressEntry) -> StoreResult<()> {
        let course = serde_json::to_string(&entry.recommended_course)?;
        let answers = serde_json::to_string(&entry.answers)?;
        let id = if entry.id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            entry.id.clone()
        };

        let conn = self.conn.lock().await;
        conn.execute(
            r#"INSERT INTO progress
               (id, user_id, quiz_date, total_score, total_possible_score, score_percentage,
                recommended_level, recommended_course, answers)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
            params![
                id,
                user_id,
                entry.quiz_date.to_rfc3339_opts(SecondsFormat::Micros, true),
                entry.total_score,
                entry.total_possible_score,
                entry.score_percentage,
                entry.recommended_level.as_str(),
                course,
                answers,
            ],
        )?;
        Ok(())
    }

    /// A user's quiz history, oldest first
    pub async fn list_progress(&self, user_id: &str) -> StoreResult<Vec<ProgressEntry>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, quiz_date, total_score, total_possible_score, score_percentage,
                    recommended_level, recommended_course, answers
             FROM progress WHERE user_id = ?1 ORDER BY quiz_date ASC",
        )?;

        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut entries = Vec::with_capacity(rows.len());
        for (id, date, total, possible, pct, level, course, answers) in rows {
            entries.push(ProgressEntry {
                id,
                quiz_date: parse_timestamp(&date),
                total_score: total,
                total_possible_score: possible,
                score_percentage: pct,
                recommended_level: Level::parse(&level).unwrap_or(Level::Beginner),
                recommended_course: serde_json::from_str(&course)?,
                answers: serde_json::from_str(&answers)?,
            });
        }
        Ok(entries)
    }

    pub async fn stats(&self) -> StoreResult<StoreStats> {
        let conn = self.conn.lock().await;
        let count = |sql: &str| -> StoreResult<usize> {
            let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };

        Ok(StoreStats {
            users: count("SELECT COUNT(*) FROM users")?,
            questions: count("SELECT COUNT(*) FROM questions")?,
            questions_missing_content: count(&format!(
                "SELECT COUNT(*) FROM questions {}",
                MISSING_CONTENT_FILTER
            ))?,
            quizzes_taken: count("SELECT COUNT(*) FROM progress")?,
        })
    }
}

const QUESTION_COLUMNS: &str = "id, question, option1, option2, option3, option4, correct_option, \
                                difficulty_level, justification_text, keywords";

const MISSING_CONTENT_FILTER: &str = "WHERE justification_text IS NULL OR TRIM(justification_text) = '' \
                                      OR keywords = '[]' OR keywords = ''";

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    let expiry: Option<i64> = row.get(5)?;
    let created_at: String = row.get(6)?;
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        reset_token: row.get(4)?,
        reset_token_expiry: expiry.and_then(|ts| DateTime::from_timestamp(ts, 0)),
        created_at: parse_timestamp(&created_at),
    })
}

fn row_to_question(row: &Row<'_>) -> rusqlite::Result<Question> {
    let keywords_json: String = row.get(9)?;
    Ok(Question {
        id: row.get(0)?,
        question: row.get(1)?,
        option1: row.get(2)?,
        option2: row.get(3)?,
        option3: row.get(4)?,
        option4: row.get(5)?,
        correct_option: row.get(6)?,
        difficulty_level: row.get(7)?,
        justification_text: row.get(8)?,
        keywords: serde_json::from_str(&keywords_json).unwrap_or_default(),
    })
}
