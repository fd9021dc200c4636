//! Difficulty prediction via an external script
//!
//! The script receives the question text as its only argument and prints
//! `{"success": true, "difficulty": "..."}` on stdout. Any failure yields the
//! configured fallback level.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::config::PredictorConfig;

/// Classifies question text into a difficulty label
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DifficultyPredictor: Send + Sync {
    async fn predict(&self, text: &str) -> String;
}

#[derive(Debug, Deserialize)]
struct ScriptOutput {
    #[serde(default)]
    success: bool,
    difficulty: Option<String>,
}

/// Runs `<program> <script> <text>` as a subprocess
#[derive(Debug, Clone)]
pub struct ScriptPredictor {
    program: String,
    script: PathBuf,
    fallback: String,
    timeout: Duration,
}

impl ScriptPredictor {
    pub fn new(config: &PredictorConfig) -> Self {
        Self {
            program: config.program.clone(),
            script: config.script.clone(),
            fallback: config.fallback.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    async fn run(&self, text: &str) -> Result<String, String> {
        let mut command = Command::new(&self.program);
        command
            .arg(&self.script)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| format!("timed out after {:?}", self.timeout))?
            .map_err(|e| format!("spawn error: {}", e))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            tracing::debug!("Predictor stderr: {}", stderr.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_output(&stdout)
    }
}

/// Difficulty from the script's stdout; the last JSON line wins so stray
/// prints before the result are tolerated
fn parse_output(stdout: &str) -> Result<String, String> {
    let line = stdout
        .lines()
        .rev()
        .find(|l| l.trim_start().starts_with('{'))
        .ok_or_else(|| format!("no JSON in output: {:?}", stdout.trim()))?;

    let parsed: ScriptOutput =
        serde_json::from_str(line.trim()).map_err(|e| format!("parse error: {}", e))?;

    match parsed.difficulty {
        Some(d) if parsed.success && !d.trim().is_empty() => Ok(d.trim().to_string()),
        _ => Err(format!("unsuccessful prediction: {}", line.trim())),
    }
}

#[async_trait]
impl DifficultyPredictor for ScriptPredictor {
    async fn predict(&self, text: &str) -> String {
        match self.run(text).await {
            Ok(level) => level,
            Err(reason) => {
                tracing::warn!("Difficulty prediction failed ({}); using {}", reason, self.fallback);
                self.fallback.clone()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_success_line() {
        assert_eq!(
            parse_output("{\"success\": true, \"difficulty\": \"Intermediate\"}\n").unwrap(),
            "Intermediate"
        );
    }

    #[test]
    fn ignores_noise_before_result() {
        let out = "loading model...\n{\"success\": true, \"difficulty\": \"Beginner\"}";
        assert_eq!(parse_output(out).unwrap(), "Beginner");
    }

    #[test]
    fn rejects_failures() {
        assert!(parse_output("{\"success\": false, \"error\": \"No question\"}").is_err());
        assert!(parse_output("{\"error\": \"Model files not found.\"}").is_err());
        assert!(parse_output("{\"success\": true, \"difficulty\": null}").is_err());
        assert!(parse_output("").is_err());
        assert!(parse_output("{not json").is_err());
    }

    #[tokio::test]
    async fn missing_program_falls_back() {
        let predictor = ScriptPredictor::new(&PredictorConfig {
            program: "/nonexistent/interpreter".into(),
            script: PathBuf::from("predict.py"),
            fallback: "Advanced".into(),
            timeout_secs: 5,
        });
        assert_eq!(predictor.predict("What is a list?").await, "Advanced");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_script_through_interpreter() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("predict.sh");
        std::fs::write(
            &script,
            "echo '{\"success\": true, \"difficulty\": \"Beginner\"}'\n",
        )
        .unwrap();

        let predictor = ScriptPredictor::new(&PredictorConfig {
            program: "sh".into(),
            script,
            fallback: "Advanced".into(),
            timeout_secs: 5,
        });
        assert_eq!(predictor.predict("What is a list?").await, "Beginner");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_script_times_out_to_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("slow.sh");
        std::fs::write(
            &script,
            "sleep 5\necho '{\"success\": true, \"difficulty\": \"Beginner\"}'\n",
        )
        .unwrap();

        let predictor = ScriptPredictor::new(&PredictorConfig {
            program: "sh".into(),
            script,
            fallback: "Advanced".into(),
            timeout_secs: 1,
        });
        let started = std::time::Instant::now();
        assert_eq!(predictor.predict("What is a list?").await, "Advanced");
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
