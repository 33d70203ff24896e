//! Jobs bound to events, and the runner seam the dispatcher calls through.

use crate::error::JobError;
use crate::events::Event;
use crate::item::SyncItem;
use serde::{Deserialize, Serialize};
use std::process::Command;
use tracing::{debug, info};

/// Work performed when an event fires for a sync item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Job {
    /// Write a log line naming the item.
    Log {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Run an external program with the item described in its environment.
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
    /// Fail unless the item's content still matches its recorded fingerprint.
    Verify,
}

impl Job {
    pub fn run(&self, item: &SyncItem) -> Result<(), JobError> {
        match self {
            Job::Log { message } => {
                match message {
                    Some(message) => info!(item = %item.name, "{}", message),
                    None => info!(item = %item.name, path = %item.path.display(), "Sync item changed"),
                }
                Ok(())
            }
            Job::Command { program, args } => run_command(program, args, item),
            Job::Verify => verify(item),
        }
    }
}

fn run_command(program: &str, args: &[String], item: &SyncItem) -> Result<(), JobError> {
    debug!("Running {} {:?} for {}", program, args, item.name);

    let status = Command::new(program)
        .args(args)
        .env("SYNC_ITEM_NAME", &item.name)
        .env("SYNC_ITEM_PATH", &item.path)
        .env("SYNC_ITEM_HOST", &item.host)
        .env("SYNC_ITEM_IS_DIR", if item.is_dir { "1" } else { "0" })
        .status()
        .map_err(|source| JobError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(JobError::Exit {
            program: program.to_string(),
            code: status.code(),
        })
    }
}

fn verify(item: &SyncItem) -> Result<(), JobError> {
    let actual = item
        .fingerprint()
        .map_err(|e| JobError::Failed(format!("fingerprint {}: {}", item.path.display(), e)))?;

    match item.hash.as_deref() {
        Some(expected) if expected == actual => Ok(()),
        expected => Err(JobError::Fingerprint {
            item: item.name.clone(),
            expected: expected.unwrap_or("<none>").to_string(),
            actual,
        }),
    }
}

/// Executes the job of a fired event.
#[cfg_attr(test, mockall::automock)]
pub trait JobRunner: Send + Sync {
    fn run(&self, event: &Event, item: &SyncItem) -> Result<(), JobError>;
}

/// Runs each event's own [`Job`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRunner;

impl JobRunner for DefaultRunner {
    fn run(&self, event: &Event, item: &SyncItem) -> Result<(), JobError> {
        event.job.run(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_job_serialization_is_tagged() {
        let job = Job::Command {
            program: "rsync".to_string(),
            args: vec!["-a".to_string()],
        };
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"kind": "command", "program": "rsync", "args": ["-a"]})
        );

        let parsed: Job = serde_json::from_str(r#"{"kind": "verify"}"#).unwrap();
        assert_eq!(parsed, Job::Verify);

        let parsed: Job = serde_json::from_str(r#"{"kind": "log"}"#).unwrap();
        assert_eq!(parsed, Job::Log { message: None });
    }

    #[test]
    fn test_log_job_succeeds() {
        let item = SyncItem::new("docs", "/tmp/docs", true);
        assert!(Job::Log { message: Some("changed".into()) }.run(&item).is_ok());
    }

    #[test]
    fn test_verify_job() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("report.txt");
        std::fs::write(&path, b"v1").unwrap();

        let mut item = SyncItem::new("report", &path, false);
        assert_matches!(Job::Verify.run(&item), Err(JobError::Fingerprint { .. }));

        item.set_hash().unwrap();
        assert!(Job::Verify.run(&item).is_ok());

        std::fs::remove_file(&path).unwrap();
        assert_matches!(Job::Verify.run(&item), Err(JobError::Failed(_)));
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let item = SyncItem::new("docs", "/tmp/docs", true);
        let job = Job::Command {
            program: "synctrust-no-such-program".to_string(),
            args: Vec::new(),
        };
        assert_matches!(job.run(&item), Err(JobError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_job_sees_item_environment() {
        let item = SyncItem::new("docs", "/tmp/docs", true);
        let ok = Job::Command {
            program: "sh".to_string(),
            args: vec!["-c".into(), r#"test "$SYNC_ITEM_NAME" = docs && test "$SYNC_ITEM_IS_DIR" = 1"#.into()],
        };
        assert!(ok.run(&item).is_ok());

        let failing = Job::Command {
            program: "sh".to_string(),
            args: vec!["-c".into(), "exit 3".into()],
        };
        assert_matches!(failing.run(&item), Err(JobError::Exit { code: Some(3), .. }));
    }
}
