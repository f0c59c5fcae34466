//! Human and JSON rendering of per-target results.

use crate::error::{ErrorKind, Result};
use cloudsync_engine::metadata::SyncedMetadata;
use cloudsync_engine::{DisabledReason, Settled, Status, SyncOutcome, TargetResult};
use cloudsync_storage::{DeleteReport, Tag};
use exn::ResultExt;
use serde::Serialize;

/// One-line description of a fulfilled result.
pub trait Summary {
    fn summary(&self) -> String;
}

impl Summary for SyncOutcome {
    fn summary(&self) -> String {
        match self.status {
            Status::Disabled(DisabledReason::Target) => "disabled".to_string(),
            Status::Disabled(DisabledReason::Global) => "skipped, sync is disabled".to_string(),
            Status::Completed => {
                let mut line = format!(
                    "{} uploaded, {} deleted ({} local, {} remote)",
                    self.uploaded.len(),
                    self.deleted.len(),
                    self.files.len(),
                    self.objects.len()
                );
                if !self.delete_failures.is_empty() {
                    line.push_str(&format!(", {} not deleted", self.delete_failures.len()));
                }
                if !self.skipped.is_empty() {
                    line.push_str(&format!(", {} skipped", self.skipped.len()));
                }
                line
            },
        }
    }
}

impl Summary for Vec<Tag> {
    fn summary(&self) -> String {
        let tags: Vec<_> = self.iter().map(|tag| format!("{}={}", tag.key, tag.value)).collect();
        format!("tags [{}]", tags.join(", "))
    }
}

impl Summary for Vec<SyncedMetadata> {
    fn summary(&self) -> String {
        format!("metadata replaced on {} objects", self.len())
    }
}

impl Summary for () {
    fn summary(&self) -> String {
        "created".to_string()
    }
}

impl Summary for DeleteReport {
    fn summary(&self) -> String {
        format!("purged {} versions, bucket deleted", self.deleted.len())
    }
}

#[derive(Serialize)]
struct Entry<'a, T> {
    target: &'a str,
    #[serde(flatten)]
    result: EntryResult<'a, T>,
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum EntryResult<'a, T> {
    Fulfilled { value: &'a T },
    Rejected { error: String },
}

impl<'a, T> From<&'a TargetResult<T>> for Entry<'a, T> {
    fn from(result: &'a TargetResult<T>) -> Self {
        let outcome = match &result.settled {
            Settled::Fulfilled(value) => EntryResult::Fulfilled { value },
            Settled::Rejected(err) => EntryResult::Rejected {
                error: err.to_string(),
            },
        };
        Self {
            target: &result.target,
            result: outcome,
        }
    }
}

pub fn render<T: Serialize + Summary>(results: &[TargetResult<T>], json: bool) -> Result<String> {
    if json {
        let entries: Vec<Entry<'_, T>> = results.iter().map(Entry::from).collect();
        return serde_json::to_string_pretty(&entries).or_raise(|| ErrorKind::Report);
    }
    let lines: Vec<String> = results
        .iter()
        .map(|result| match &result.settled {
            Settled::Fulfilled(value) => format!("{}: {}", result.target, value.summary()),
            Settled::Rejected(err) => format!("{}: failed: {err}", result.target),
        })
        .collect();
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudsync_engine::error::ErrorKind as EngineErrorKind;

    fn results() -> Vec<TargetResult<Vec<Tag>>> {
        vec![
            TargetResult {
                target: "assets".to_string(),
                settled: Settled::Fulfilled(vec![Tag::new("team", "web")]),
            },
            TargetResult {
                target: "missing".to_string(),
                settled: Settled::Rejected(exn::Exn::from(EngineErrorKind::TargetNotFound("missing".to_string()))),
            },
        ]
    }

    #[test]
    fn test_render_text() {
        let text = render(&results(), false).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "assets: tags [team=web]");
        assert!(lines[1].starts_with("missing: failed: "));
        assert!(lines[1].contains("target not found: missing"));
    }

    #[test]
    fn test_render_json() {
        let json: serde_json::Value = serde_json::from_str(&render(&results(), true).unwrap()).unwrap();
        assert_eq!(json[0]["target"], "assets");
        assert_eq!(json[0]["status"], "fulfilled");
        assert_eq!(json[0]["value"][0]["key"], "team");
        assert_eq!(json[1]["status"], "rejected");
        assert!(json[1]["error"].as_str().unwrap().contains("target not found: missing"));
    }
}
