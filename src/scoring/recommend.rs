//! Quiz summaries and course recommendations

use chrono::Utc;

use super::verify::MAX_POINTS_PER_ANSWER;
use crate::types::{AnswerRecord, CourseLink, Level, ProgressEntry, RecommendedCourse};

/// Recommended level for a score percentage
pub fn level_for_percentage(percentage: f64) -> Level {
    if percentage >= 90.0 {
        Level::Expert
    } else if percentage >= 65.0 {
        Level::Advanced
    } else if percentage >= 30.0 {
        Level::Intermediate
    } else {
        Level::Beginner
    }
}

fn link(kind: &str, title: &str, url: &str) -> CourseLink {
    CourseLink {
        kind: kind.to_string(),
        title: title.to_string(),
        url: url.to_string(),
    }
}

/// Course catalogue entry for a level
pub fn course_for(level: Level) -> RecommendedCourse {
    match level {
        Level::Beginner => RecommendedCourse {
            name: "Python Fundamentals Crash Course".into(),
            description: "Start from absolute scratch! Master basic syntax, variables, loops, and functions.".into(),
            links: vec![
                link("YouTube", "Python Full Course for Beginners (Mosh)", "https://www.youtube.com/watch?v=K5KVEU3aaeQ"),
                link("Web Course", "Google Crash Course on Python (Coursera)", "https://www.coursera.org/learn/python-crash-course"),
                link("Resource", "Official Python Tutorial", "https://docs.python.org/3/tutorial/index.html"),
            ],
        },
        Level::Intermediate => RecommendedCourse {
            name: "Core Data Structures & OOP".into(),
            description: "Deep dive into complex data types (sets, dictionaries, tuples) and Object-Oriented Programming (OOP) concepts.".into(),
            links: vec![
                link("YouTube", "Corey Schafer Python OOP Series", "https://www.youtube.com/@coreyms"),
                link("Web Course", "Intermediate Python Tutorials (Real Python)", "https://realpython.com/tutorials/intermediate/"),
                link("Course", "Data Structures in Python (IBM/Coursera)", "https://www.coursera.org/learn/python-for-applied-data-science-ai"),
            ],
        },
        Level::Advanced => RecommendedCourse {
            name: "Concurrency, Data Science & APIs".into(),
            description: "Focus on high-performance topics like Asynchronous I/O (`asyncio`), multithreading, and leveraging data libraries.".into(),
            links: vec![
                link("Web Course", "Learn Advanced Python 3: Concurrency (Codecademy)", "https://www.codecademy.com/learn/learn-advanced-python-3-concurrency"),
                link("Resource", "Asyncio Documentation & Guide", "https://docs.python.org/3/library/asyncio.html"),
            ],
        },
        Level::Expert => RecommendedCourse {
            name: "Machine Learning & Deployment".into(),
            description: "You are ready for advanced fields. Explore Machine Learning, Neural Networks, or cloud deployment (AWS/Azure).".into(),
            links: vec![
                link("Course", "Data Scientist Master's Program (Simplilearn)", "https://www.simplilearn.com/data-scientist-masters-program-course"),
                link("Resource", "Practical Data Science with Python (Web)", "https://www.datacamp.com/category/python"),
            ],
        },
    }
}

/// Totals for a finished quiz
#[derive(Debug, Clone, PartialEq)]
pub struct QuizSummary {
    pub total_score: f64,
    pub total_possible_score: f64,
    pub score_percentage: f64,
    pub recommended_level: Level,
}

/// Sum a quiz's answers and pick a level
pub fn summarize(answers: &[AnswerRecord]) -> QuizSummary {
    let total_score: f64 = answers.iter().map(|a| a.total_score).sum();
    let total_possible_score = answers.len() as f64 * MAX_POINTS_PER_ANSWER;
    let score_percentage = if total_possible_score > 0.0 {
        (total_score / total_possible_score * 100.0).max(0.0)
    } else {
        0.0
    };

    QuizSummary {
        total_score,
        total_possible_score,
        score_percentage,
        recommended_level: level_for_percentage(score_percentage),
    }
}

/// Build the progress entry stored for a finished quiz
pub fn build_progress(answers: Vec<AnswerRecord>) -> ProgressEntry {
    let summary = summarize(&answers);
    ProgressEntry {
        id: uuid::Uuid::new_v4().to_string(),
        quiz_date: Utc::now(),
        total_score: summary.total_score,
        total_possible_score: summary.total_possible_score,
        score_percentage: summary.score_percentage,
        recommended_level: summary.recommended_level,
        recommended_course: course_for(summary.recommended_level),
        answers,
    }
}

/// Hardest difficulty among correctly answered questions
pub fn highest_correct_difficulty(answers: &[AnswerRecord]) -> Level {
    answers
        .iter()
        .filter(|a| a.correct)
        .filter_map(|a| a.difficulty.as_deref().and_then(Level::parse))
        .filter(|l| *l <= Level::Advanced)
        .max()
        .unwrap_or(Level::Beginner)
}

/// Entry with the highest percentage; the earliest wins a tie
pub fn best_entry(progress: &[ProgressEntry]) -> Option<&ProgressEntry> {
    progress.iter().fold(None, |best: Option<&ProgressEntry>, current| match best {
        Some(b) if current.score_percentage <= b.score_percentage => Some(b),
        _ => Some(current),
    })
}

/// Level shown on the dashboard
pub fn dashboard_level(progress: &[ProgressEntry]) -> Level {
    best_entry(progress)
        .map(|p| p.recommended_level)
        .unwrap_or(Level::Beginner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(correct: bool, score: f64, difficulty: &str) -> AnswerRecord {
        AnswerRecord {
            q_id: "q".into(),
            question: None,
            selected: "Option1".into(),
            selected_justification: String::new(),
            correct,
            is_justification_relevant: score >= 2.0,
            total_score: score,
            official_justification: None,
            official_keywords: vec![],
            difficulty: Some(difficulty.into()),
        }
    }

    #[test]
    fn tier_boundaries() {
        assert_eq!(level_for_percentage(90.0), Level::Expert);
        assert_eq!(level_for_percentage(89.9), Level::Advanced);
        assert_eq!(level_for_percentage(65.0), Level::Advanced);
        assert_eq!(level_for_percentage(30.0), Level::Intermediate);
        assert_eq!(level_for_percentage(29.99), Level::Beginner);
    }

    #[test]
    fn summary_of_ten_answers() {
        let mut answers: Vec<_> = (0..7).map(|_| answer(true, 2.0, "Beginner")).collect();
        answers.extend((0..3).map(|_| answer(false, 0.0, "Advanced")));
        let summary = summarize(&answers);
        assert_eq!(summary.total_score, 14.0);
        assert_eq!(summary.total_possible_score, 20.0);
        assert_eq!(summary.score_percentage, 70.0);
        assert_eq!(summary.recommended_level, Level::Advanced);
    }

    #[test]
    fn empty_quiz_is_zero_percent() {
        let summary = summarize(&[]);
        assert_eq!(summary.score_percentage, 0.0);
        assert_eq!(summary.recommended_level, Level::Beginner);
    }

    #[test]
    fn negative_totals_clamp_to_zero_percent() {
        let summary = summarize(&[answer(false, -0.5, "Beginner")]);
        assert_eq!(summary.score_percentage, 0.0);
    }

    #[test]
    fn built_progress_carries_course() {
        let entry = build_progress(vec![answer(true, 2.0, "Advanced")]);
        assert_eq!(entry.recommended_level, Level::Expert);
        assert_eq!(entry.recommended_course.name, "Machine Learning & Deployment");
    }

    #[test]
    fn highest_difficulty_only_counts_correct_answers() {
        let answers = vec![
            answer(false, 0.0, "Advanced"),
            answer(true, 1.0, "Intermediate"),
            answer(true, 2.0, "Beginner"),
        ];
        assert_eq!(highest_correct_difficulty(&answers), Level::Intermediate);
        assert_eq!(highest_correct_difficulty(&[]), Level::Beginner);
    }

    #[test]
    fn dashboard_uses_best_attempt() {
        let low = build_progress(vec![answer(false, 0.0, "Beginner")]);
        let high = build_progress(vec![answer(true, 2.0, "Beginner"), answer(true, 1.0, "Beginner")]);
        let history = vec![low, high.clone()];
        assert_eq!(best_entry(&history).map(|p| p.score_percentage), Some(75.0));
        assert_eq!(dashboard_level(&history), Level::Advanced);
        assert_eq!(dashboard_level(&[]), Level::Beginner);
    }
}
