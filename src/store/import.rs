//! Question import from JSON seed files

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use walkdir::WalkDir;

use super::SqliteStore;
use crate::types::Question;

/// Accepted seed layouts
#[derive(Deserialize)]
#[serde(untagged)]
enum SeedFile {
    List(Vec<Question>),
    Wrapped { questions: Vec<Question> },
    Single(Question),
}

/// Parse one seed file into questions
pub fn load_question_file(path: &Path) -> Result<Vec<Question>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let seed: SeedFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    Ok(match seed {
        SeedFile::List(questions) | SeedFile::Wrapped { questions } => questions,
        SeedFile::Single(question) => vec![question],
    })
}

fn validate(question: &Question) -> Result<(), String> {
    if question.question.trim().is_empty() {
        return Err("empty question text".into());
    }
    if question.option_text(question.correct_option.trim()).is_none() {
        return Err(format!("Correct_Option '{}' is not Option1-Option4", question.correct_option));
    }
    Ok(())
}

/// Import a file, or every `.json` file under a directory. Returns the
/// number of questions stored. Unreadable files and invalid questions are
/// logged and skipped.
pub async fn import_path(store: &SqliteStore, path: &Path) -> Result<usize> {
    let files: Vec<_> = if path.is_dir() {
        WalkDir::new(path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
            .map(|e| e.into_path())
            .collect()
    } else {
        vec![path.to_path_buf()]
    };

    tracing::info!("Importing questions from {} file(s)", files.len());

    let mut imported = 0;
    for file in files {
        let questions = match load_question_file(&file) {
            Ok(q) => q,
            Err(e) => {
                tracing::error!("{:#}", e);
                continue;
            }
        };

        for question in questions {
            if let Err(reason) = validate(&question) {
                tracing::warn!("Skipping question in {}: {}", file.display(), reason);
                continue;
            }
            store.insert_question(&question).await?;
            imported += 1;
        }
    }

    tracing::info!("Imported {} question(s)", imported);
    Ok(imported)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE: &str = r#"{"Question":"Q","Option1":"a","Option2":"b","Option3":"c","Option4":"d","Correct_Option":"Option4"}"#;

    #[tokio::test]
    async fn imports_directory_of_mixed_layouts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("single.json"), ONE).unwrap();
        std::fs::write(dir.path().join("list.json"), format!("[{0},{0}]", ONE)).unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(
            dir.path().join("nested").join("wrapped.json"),
            format!(r#"{{"questions":[{}]}}"#, ONE),
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        std::fs::write(dir.path().join("broken.json"), "{").unwrap();

        let store = SqliteStore::open_in_memory().unwrap();
        let count = import_path(&store, dir.path()).await.unwrap();
        assert_eq!(count, 4);
        assert_eq!(store.count_questions().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn invalid_correct_option_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("bad.json");
        std::fs::write(&file, ONE.replace("Option4\"}", "Option7\"}")).unwrap();

        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(import_path(&store, &file).await.unwrap(), 0);
    }
}
