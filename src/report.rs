use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::config::ReportConfig;
use crate::consolidate::{consolidate, index_by};
use crate::error::Result;
use crate::fetch::{self, DEFAULT_CHUNK_SIZE, RetryPolicy};
use crate::flatten::{flatten, normalize, project};
use crate::io::excel_write;
use crate::model::FlatRecord;
use crate::service::{InventoryService, ListRequest, ReportSink};
use crate::table::{WorkbookData, assemble};

/// Sheet holding the effective patches of each queried baseline.
pub const BASELINE_SHEET: &str = "PatchBaseLineReport";
/// Sheet holding the per-instance detailed patch listing.
pub const INSTANCE_PATCH_SHEET: &str = "EC2PatchReport";
/// Sheet holding the consolidated instance inventory.
pub const CONSOLIDATED_SHEET: &str = "EC2Report";

/// Patch states broken out in the per-instance detailed report.
const PATCH_STATES: [&str; 3] = ["Installed", "Missing", "Failed"];

/// Top-level instance fields kept in the consolidated inventory sheet.
const INSTANCE_FIELDS: [&str; 5] = [
    "InstanceId",
    "State",
    "IamInstanceProfile",
    "Tags",
    "LaunchTime",
];

/// Outcome of one report run: the artifact path plus a per-file outcome
/// message. Partial success (empty sheets, failed upload) is a valid
/// outcome, not an error.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub artifact: PathBuf,
    pub outcomes: HashMap<String, String>,
}

/// Runs the full collection pipeline and assembles the three report tables.
/// Branch failures degrade to empty or shortened tables; this function only
/// fails on local errors, never on remote ones.
#[instrument(level = "info", skip_all)]
pub fn build_report(service: &mut dyn InventoryService, config: &ReportConfig) -> WorkbookData {
    let policy = &config.retry;

    let baselines = resolve_baselines(service, &config.baseline_prefixes, policy);
    info!(baseline_count = baselines.len(), "resolved patch baselines");
    let baseline_table = assemble(
        BASELINE_SHEET,
        &effective_patches(service, &baselines, policy),
    );

    let inventory = instance_inventory(service, policy);
    let instance_ids: Vec<String> = inventory
        .iter()
        .filter_map(|record| record.get("InstanceId")?.as_str().map(str::to_string))
        .collect();
    info!(instance_count = instance_ids.len(), "gathered instance inventory");
    let inventory_by_id = index_by(&inventory, "InstanceId");

    let patch_table = assemble(
        INSTANCE_PATCH_SHEET,
        &detailed_patch_report(service, &inventory_by_id, &instance_ids, policy),
    );

    let patch_states = instance_patch_states(service, &instance_ids, policy);
    let patch_info = instance_information(service, policy);
    let consolidated = consolidate(inventory, &[patch_states, patch_info], "InstanceId");
    let consolidated_table = assemble(CONSOLIDATED_SHEET, &consolidated);

    WorkbookData {
        tables: vec![baseline_table, patch_table, consolidated_table],
    }
}

/// Builds the workbook, writes it under the configured output directory, and
/// hands it to the sink. An upload failure degrades to an outcome message;
/// failing to produce the artifact itself is terminal.
#[instrument(level = "info", skip_all, fields(bucket = %config.bucket))]
pub fn generate(
    service: &mut dyn InventoryService,
    sink: &mut dyn ReportSink,
    config: &ReportConfig,
) -> Result<RunSummary> {
    let workbook = build_report(service, config);
    let artifact = config.output_dir.join(artifact_name(Local::now()));
    excel_write::write_workbook(&artifact, &workbook)?;
    info!(path = %artifact.display(), "workbook written");

    let file_name = artifact
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut outcomes = HashMap::new();
    match sink.upload(&artifact, &config.bucket) {
        Ok(message) => {
            outcomes.insert(file_name, message);
        }
        Err(error) => {
            warn!(%error, "upload failed");
            outcomes.insert(file_name, "Upload Failed".to_string());
        }
    }

    Ok(RunSummary { artifact, outcomes })
}

/// `ConsolidatedReport_<dd_Mon_YYYY_HH_MM>.xlsx`
fn artifact_name(now: DateTime<Local>) -> String {
    format!("ConsolidatedReport_{}.xlsx", now.format("%d_%b_%Y_%H_%M"))
}

/// Resolves baseline name prefixes to `(id, name)` pairs.
fn resolve_baselines(
    service: &mut dyn InventoryService,
    prefixes: &[String],
    policy: &RetryPolicy,
) -> Vec<(String, String)> {
    let request = ListRequest::PatchBaselines {
        name_prefixes: prefixes.to_vec(),
    };
    fetch::fetch_all(|token| service.list(&request, token), policy)
        .into_iter()
        .filter_map(|identity| {
            let id = identity.get("BaselineId")?.as_str()?.to_string();
            let name = identity.get("BaselineName")?.as_str()?.to_string();
            Some((id, name))
        })
        .collect()
}

/// Effective-patch records per baseline: the `Patch` fields overlaid with
/// the `PatchStatus` fields, tagged with the baseline name and id. A
/// baseline whose query fails contributes nothing.
fn effective_patches(
    service: &mut dyn InventoryService,
    baselines: &[(String, String)],
    policy: &RetryPolicy,
) -> Vec<FlatRecord> {
    let mut patches = Vec::new();
    for (baseline_id, baseline_name) in baselines {
        let request = ListRequest::EffectivePatches {
            baseline_id: baseline_id.clone(),
        };
        let records = fetch::fetch_all(|token| service.list(&request, token), policy);
        debug!(baseline = %baseline_name, patch_count = records.len(), "effective patches fetched");
        for record in records {
            let mut merged = Map::new();
            if let Some(Value::Object(fields)) = record.get("Patch") {
                merged.extend(fields.clone());
            }
            if let Some(Value::Object(status)) = record.get("PatchStatus") {
                merged.extend(status.clone());
            }
            merged.insert("PBName".to_string(), Value::String(baseline_name.clone()));
            merged.insert("PBId".to_string(), Value::String(baseline_id.clone()));
            patches.push(flatten(&Value::Object(merged)));
        }
    }
    patches
}

/// Gathers the instance inventory, unwrapping the reservation → instances
/// nesting, projecting to the report's field set and normalizing.
fn instance_inventory(
    service: &mut dyn InventoryService,
    policy: &RetryPolicy,
) -> Vec<FlatRecord> {
    let reservations = fetch::fetch_all(
        |token| service.list(&ListRequest::Instances, token),
        policy,
    );

    let mut inventory = Vec::new();
    for reservation in &reservations {
        let Some(instances) = reservation.get("Instances").and_then(Value::as_array) else {
            continue;
        };
        for instance in instances {
            inventory.push(normalize(project(instance, &INSTANCE_FIELDS)));
        }
    }
    inventory
}

/// Per-instance, per-state patch listing. Each record is tagged with its
/// instance id and decorated with the instance name and run state from the
/// inventory (`"NA"` when the instance carries no name).
fn detailed_patch_report(
    service: &mut dyn InventoryService,
    inventory: &HashMap<String, FlatRecord>,
    instance_ids: &[String],
    policy: &RetryPolicy,
) -> Vec<FlatRecord> {
    let mut report = Vec::new();
    for instance_id in instance_ids {
        for state in PATCH_STATES {
            let request = ListRequest::InstancePatches {
                instance_id: instance_id.clone(),
                state: state.to_string(),
            };
            let records = fetch::fetch_all(|token| service.list(&request, token), policy);
            for record in records {
                let mut flat = flatten(&record);
                flat.insert(
                    "InstanceId".to_string(),
                    Value::String(instance_id.clone()),
                );
                if let Some(base) = inventory.get(instance_id) {
                    let name = base
                        .get("Name")
                        .cloned()
                        .unwrap_or_else(|| Value::String("NA".to_string()));
                    flat.insert("Name".to_string(), name);
                    if let Some(run_state) = base.get("State") {
                        flat.insert("RunState".to_string(), run_state.clone());
                    }
                }
                report.push(flat);
            }
        }
    }
    report
}

/// Patch compliance summaries, fetched in identifier chunks.
fn instance_patch_states(
    service: &mut dyn InventoryService,
    instance_ids: &[String],
    policy: &RetryPolicy,
) -> Vec<FlatRecord> {
    fetch::fetch_chunked(
        |chunk, token| {
            let request = ListRequest::InstancePatchStates {
                instance_ids: chunk.to_vec(),
            };
            service.list(&request, token)
        },
        instance_ids,
        DEFAULT_CHUNK_SIZE,
        policy,
    )
    .iter()
    .map(flatten)
    .collect()
}

/// Managed-instance agent information for the consolidated sheet.
fn instance_information(
    service: &mut dyn InventoryService,
    policy: &RetryPolicy,
) -> Vec<FlatRecord> {
    fetch::fetch_all(
        |token| service.list(&ListRequest::InstanceInformation, token),
        policy,
    )
    .iter()
    .map(flatten)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_name_carries_the_run_timestamp() {
        let moment = DateTime::parse_from_rfc3339("2024-05-01T12:30:00+00:00")
            .expect("timestamp parsed")
            .with_timezone(&Local);

        let name = artifact_name(moment);

        assert!(name.starts_with("ConsolidatedReport_"));
        assert!(name.ends_with(".xlsx"));
    }

    #[test]
    fn sheet_names_cover_the_three_reports() {
        let names: Vec<&str> = vec![BASELINE_SHEET, INSTANCE_PATCH_SHEET, CONSOLIDATED_SHEET];
        assert_eq!(
            names,
            vec!["PatchBaseLineReport", "EC2PatchReport", "EC2Report"]
        );
    }
}
