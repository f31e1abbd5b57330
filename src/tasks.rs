use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    error::{ConfigError, TrackError},
    interval::{PeakRecord, Strand},
    Result,
};

/// A single output channel of the generator
///
/// Stranded assays are described by two consecutive tasks sharing a `task_id`,
/// the `+` strand first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Task identifier (integers are accepted and kept as their string form)
    #[serde(deserialize_with = "string_or_number")]
    pub task_id: String,
    #[serde(default)]
    pub strand: Strand,
    /// Signal track (bedGraph)
    #[serde(default)]
    pub signal: Option<PathBuf>,
    /// Control track (bedGraph)
    #[serde(default)]
    pub control: Option<PathBuf>,
    /// Peaks (BED / narrowPeak)
    #[serde(default)]
    pub peaks: Option<PathBuf>,
}
impl Task {
    /// Creates an unstranded task without any files
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            strand: Strand::Unstranded,
            signal: None,
            control: None,
            peaks: None,
        }
    }

    #[must_use]
    pub fn with_strand(mut self, strand: Strand) -> Self {
        self.strand = strand;
        self
    }

    #[must_use]
    pub fn with_signal(mut self, path: impl Into<PathBuf>) -> Self {
        self.signal = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_control(mut self, path: impl Into<PathBuf>) -> Self {
        self.control = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_peaks(mut self, path: impl Into<PathBuf>) -> Self {
        self.peaks = Some(path.into());
        self
    }

    /// Path of the signal track, failing if it is not configured or does not exist
    pub fn require_signal(&self) -> Result<&Path> {
        self.require(self.signal.as_deref(), "signal")
    }

    /// Path of the control track, failing if it is not configured or does not exist
    pub fn require_control(&self) -> Result<&Path> {
        self.require(self.control.as_deref(), "control")
    }

    fn require<'a>(&self, path: Option<&'a Path>, kind: &'static str) -> Result<&'a Path> {
        match path {
            Some(path) if path.exists() => Ok(path),
            path => Err(TrackError::MissingTrack {
                task: self.task_id.clone(),
                kind,
                path: path.map(Path::to_path_buf),
            }
            .into()),
        }
    }

    /// Reads the peaks of this task, an empty set if no peaks file is configured
    pub fn read_peaks(&self) -> Result<Vec<PeakRecord>> {
        match &self.peaks {
            Some(path) => {
                if !path.exists() {
                    return Err(TrackError::MissingTrack {
                        task: self.task_id.clone(),
                        kind: "peaks",
                        path: Some(path.clone()),
                    }
                    .into());
                }
                PeakRecord::read_bed(path)
            }
            None => Ok(Vec::new()),
        }
    }
}

/// Returns true if the tasks describe stranded assays
#[must_use]
pub fn is_stranded(tasks: &[Task]) -> bool {
    tasks.first().is_some_and(|t| t.strand.is_stranded())
}

/// Validates the strand layout of a task list
///
/// Either every task is unstranded, or the tasks come in consecutive `(+, -)`
/// pairs sharing a `task_id`.
pub fn validate_strands(tasks: &[Task]) -> Result<()> {
    if !is_stranded(tasks) {
        return match tasks.iter().find(|t| t.strand.is_stranded()) {
            Some(task) => Err(ConfigError::UnpairedStrandedTasks(task.task_id.clone()).into()),
            None => Ok(()),
        };
    }
    for pair in tasks.chunks(2) {
        match pair {
            [plus, minus]
                if plus.strand == Strand::Plus
                    && minus.strand == Strand::Minus
                    && plus.task_id == minus.task_id => {}
            [task, ..] => {
                return Err(ConfigError::UnpairedStrandedTasks(task.task_id.clone()).into())
            }
            [] => {}
        }
    }
    Ok(())
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "task_id must be a string or a number, found {other}"
        ))),
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_deserialize() -> Result<()> {
        let tasks: Vec<Task> = serde_json::from_str(
            r#"[
                {"task_id": 0, "strand": "+", "signal": "plus.bedGraph", "peaks": "peaks.bed"},
                {"task_id": 0, "strand": "-", "signal": "minus.bedGraph"}
            ]"#,
        )?;
        assert_eq!(tasks[0].task_id, "0");
        assert_eq!(tasks[1].strand, Strand::Minus);
        assert_eq!(tasks[0].peaks.as_deref(), Some(Path::new("peaks.bed")));
        assert!(tasks[1].control.is_none());
        validate_strands(&tasks)?;
        assert!(is_stranded(&tasks));
        Ok(())
    }

    #[test]
    fn test_strand_pairing() {
        let plus = Task::new("a").with_strand(Strand::Plus);
        let minus = Task::new("a").with_strand(Strand::Minus);
        let other = Task::new("b").with_strand(Strand::Minus);
        let unstranded = Task::new("c");

        assert!(validate_strands(&[plus.clone(), minus.clone()]).is_ok());
        assert!(validate_strands(&[unstranded.clone(), unstranded.clone()]).is_ok());
        assert!(validate_strands(&[minus.clone(), plus.clone()]).is_err());
        assert!(validate_strands(&[plus.clone(), other]).is_err());
        assert!(validate_strands(&[plus.clone()]).is_err());
        assert!(validate_strands(&[unstranded, plus, minus]).is_err());
    }

    #[test]
    fn test_missing_tracks() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let signal = dir.path().join("signal.bedGraph");
        std::fs::write(&signal, "chr1\t0\t10\t1.0\n")?;

        let task = Task::new("t")
            .with_signal(&signal)
            .with_control(dir.path().join("absent.bedGraph"));
        assert_eq!(task.require_signal()?, signal.as_path());
        assert!(task.require_control().is_err());
        assert!(Task::new("t").require_signal().is_err());
        assert!(Task::new("t").read_peaks()?.is_empty());
        Ok(())
    }
}
