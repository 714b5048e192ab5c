use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::info;

use crate::error::ReportError;
use crate::model::{Page, RawRecord, ServiceError};

/// Listing operations the report pipeline issues against the management API.
///
/// The variants mirror the provider's describe operations without exposing
/// its call signatures; a concrete [`InventoryService`] maps each request to
/// whatever transport and parameter encoding its provider expects.
#[derive(Debug, Clone, PartialEq)]
pub enum ListRequest {
    /// Compute-instance inventory. Records are reservation objects whose
    /// `Instances` field holds the actual instances.
    Instances,
    /// Patch compliance summary for one batch of instance ids.
    InstancePatchStates { instance_ids: Vec<String> },
    /// Managed-instance agent information.
    InstanceInformation,
    /// Patch listing for one instance, filtered to one patch state.
    InstancePatches { instance_id: String, state: String },
    /// Patch baselines whose names match any of the given prefixes.
    PatchBaselines { name_prefixes: Vec<String> },
    /// Effective patches for one resolved baseline.
    EffectivePatches { baseline_id: String },
}

/// Opaque capability over the remote management API.
///
/// A single paginated entry point is enough for both the token-driven
/// listings and the one-shot calls: the fetch loop keeps invoking `list`
/// with the previous token until the returned page carries none.
pub trait InventoryService {
    fn list(&mut self, request: &ListRequest, token: Option<&str>) -> Result<Page, ServiceError>;
}

/// One-shot sink for the finished artifact. The pipeline never retries an
/// upload internally; a failure is recorded in the run summary instead.
pub trait ReportSink {
    fn upload(&mut self, artifact: &Path, bucket: &str) -> Result<String, ReportError>;
}

/// An [`InventoryService`] backed by a captured JSON snapshot of the remote
/// API's responses, used by the CLI for offline report generation and by the
/// integration tests.
///
/// Layout: `Reservations`, `InstancePatchStates`, `InstanceInformationList`,
/// and `BaselineIdentities` are arrays; `InstancePatches` and
/// `EffectivePatches` are objects keyed by instance id and baseline id.
#[derive(Debug, Clone)]
pub struct SnapshotService {
    data: Value,
}

impl SnapshotService {
    pub fn from_value(data: Value) -> Result<Self, ReportError> {
        if !data.is_object() {
            return Err(ReportError::InvalidSnapshot(
                "top level must be an object".to_string(),
            ));
        }
        Ok(Self { data })
    }

    pub fn from_path(path: &Path) -> Result<Self, ReportError> {
        let source = fs::read_to_string(path)?;
        Self::from_value(serde_json::from_str(&source)?)
    }

    fn array(&self, key: &str) -> Vec<RawRecord> {
        self.data
            .get(key)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }

    fn keyed_array(&self, key: &str, entry: &str) -> Vec<RawRecord> {
        self.data
            .get(key)
            .and_then(|section| section.get(entry))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default()
    }
}

impl InventoryService for SnapshotService {
    fn list(&mut self, request: &ListRequest, _token: Option<&str>) -> Result<Page, ServiceError> {
        let records = match request {
            ListRequest::Instances => self.array("Reservations"),
            ListRequest::InstancePatchStates { instance_ids } => self
                .array("InstancePatchStates")
                .into_iter()
                .filter(|record| {
                    record
                        .get("InstanceId")
                        .and_then(Value::as_str)
                        .is_some_and(|id| instance_ids.iter().any(|wanted| wanted == id))
                })
                .collect(),
            ListRequest::InstanceInformation => self.array("InstanceInformationList"),
            ListRequest::InstancePatches { instance_id, state } => self
                .keyed_array("InstancePatches", instance_id)
                .into_iter()
                .filter(|record| {
                    record
                        .get("State")
                        .and_then(Value::as_str)
                        .is_some_and(|value| value == state)
                })
                .collect(),
            ListRequest::PatchBaselines { name_prefixes } => self
                .array("BaselineIdentities")
                .into_iter()
                .filter(|record| {
                    record
                        .get("BaselineName")
                        .and_then(Value::as_str)
                        .is_some_and(|name| {
                            name_prefixes.iter().any(|prefix| name.starts_with(prefix))
                        })
                })
                .collect(),
            ListRequest::EffectivePatches { baseline_id } => {
                self.keyed_array("EffectivePatches", baseline_id)
            }
        };
        Ok(Page::last(records))
    }
}

/// A [`ReportSink`] that copies the artifact into a destination directory,
/// standing in for an object-storage upload.
#[derive(Debug, Clone)]
pub struct DirectorySink;

impl ReportSink for DirectorySink {
    fn upload(&mut self, artifact: &Path, bucket: &str) -> Result<String, ReportError> {
        let file_name = artifact
            .file_name()
            .ok_or_else(|| ReportError::Upload(format!("no file name in {}", artifact.display())))?;
        let destination = PathBuf::from(bucket).join(file_name);
        fs::copy(artifact, &destination)
            .map_err(|err| ReportError::Upload(format!("{}: {err}", destination.display())))?;
        info!(destination = %destination.display(), "artifact delivered");
        Ok(format!(
            "File: {} uploaded to bucket: {bucket}",
            file_name.to_string_lossy()
        ))
    }
}

/// A [`ReportSink`] that leaves the artifact where it was written.
#[derive(Debug, Clone)]
pub struct NoopSink;

impl ReportSink for NoopSink {
    fn upload(&mut self, artifact: &Path, _bucket: &str) -> Result<String, ReportError> {
        Ok(format!("File: {} kept locally", artifact.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_filters_baselines_by_prefix() {
        let mut service = SnapshotService::from_value(json!({
            "BaselineIdentities": [
                {"BaselineId": "pb-1", "BaselineName": "LinuxApprovedPatches"},
                {"BaselineId": "pb-2", "BaselineName": "Experimental"},
            ]
        }))
        .expect("snapshot parsed");

        let page = service
            .list(
                &ListRequest::PatchBaselines {
                    name_prefixes: vec!["Linux".to_string()],
                },
                None,
            )
            .expect("listing succeeded");

        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0]["BaselineId"], json!("pb-1"));
        assert_eq!(page.next_token, None);
    }

    #[test]
    fn snapshot_filters_patches_by_instance_and_state() {
        let mut service = SnapshotService::from_value(json!({
            "InstancePatches": {
                "i-1": [
                    {"Title": "KB1", "State": "Installed"},
                    {"Title": "KB2", "State": "Missing"},
                ]
            }
        }))
        .expect("snapshot parsed");

        let page = service
            .list(
                &ListRequest::InstancePatches {
                    instance_id: "i-1".to_string(),
                    state: "Missing".to_string(),
                },
                None,
            )
            .expect("listing succeeded");

        assert_eq!(page.records.len(), 1);
        assert_eq!(page.records[0]["Title"], json!("KB2"));
    }

    #[test]
    fn snapshot_rejects_non_object_input() {
        assert!(SnapshotService::from_value(json!([1, 2, 3])).is_err());
    }
}
