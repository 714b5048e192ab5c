use std::collections::HashMap;

use crate::model::FlatRecord;

/// Merges overlay datasets into a base dataset keyed by `key_field`.
///
/// Every overlay record whose key matches a base record shallow-merges into
/// it, field by field, with the overlay winning on name collisions; fields
/// unique to either side are preserved. Overlay records whose key does not
/// appear in the base are silently dropped, so the consolidated universe is
/// always bounded by the base inventory. Base order is preserved.
pub fn consolidate(
    mut base: Vec<FlatRecord>,
    overlays: &[Vec<FlatRecord>],
    key_field: &str,
) -> Vec<FlatRecord> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    for (position, record) in base.iter().enumerate() {
        if let Some(key) = string_key(record, key_field) {
            positions.insert(key, position);
        }
    }

    for overlay in overlays {
        for record in overlay {
            let Some(key) = string_key(record, key_field) else {
                continue;
            };
            // keys outside the base inventory are intentionally dropped
            if let Some(&position) = positions.get(&key) {
                for (field, value) in record {
                    base[position].insert(field.clone(), value.clone());
                }
            }
        }
    }

    base
}

/// Indexes records by a string key field. A later record with a duplicate
/// key replaces the earlier one.
pub fn index_by(records: &[FlatRecord], key_field: &str) -> HashMap<String, FlatRecord> {
    let mut index = HashMap::with_capacity(records.len());
    for record in records {
        if let Some(key) = string_key(record, key_field) {
            index.insert(key, record.clone());
        }
    }
    index
}

fn string_key(record: &FlatRecord, key_field: &str) -> Option<String> {
    record
        .get(key_field)
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> FlatRecord {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn overlay_overwrites_matching_fields_and_drops_orphans() {
        let base = vec![record(json!({"InstanceId": "i1", "Name": "x"}))];
        let overlay = vec![
            record(json!({"InstanceId": "i1", "Name": "y"})),
            record(json!({"InstanceId": "i2", "Name": "z"})),
        ];

        let merged = consolidate(base, &[overlay], "InstanceId");

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0]["Name"], json!("y"));
    }

    #[test]
    fn fields_unique_to_either_side_survive() {
        let base = vec![record(json!({"InstanceId": "i1", "State": "running"}))];
        let overlay = vec![record(
            json!({"InstanceId": "i1", "MissingCount": 3, "InstalledCount": 41}),
        )];

        let merged = consolidate(base, &[overlay], "InstanceId");

        assert_eq!(merged[0]["State"], json!("running"));
        assert_eq!(merged[0]["MissingCount"], json!(3));
        assert_eq!(merged[0]["InstalledCount"], json!(41));
    }

    #[test]
    fn later_overlays_win_over_earlier_ones() {
        let base = vec![record(json!({"InstanceId": "i1", "AgentVersion": "1.0"}))];
        let first = vec![record(json!({"InstanceId": "i1", "AgentVersion": "2.0"}))];
        let second = vec![record(json!({"InstanceId": "i1", "AgentVersion": "3.0"}))];

        let merged = consolidate(base, &[first, second], "InstanceId");

        assert_eq!(merged[0]["AgentVersion"], json!("3.0"));
    }

    #[test]
    fn base_order_is_preserved() {
        let base = vec![
            record(json!({"InstanceId": "i2"})),
            record(json!({"InstanceId": "i1"})),
        ];
        let overlay = vec![record(json!({"InstanceId": "i1", "Patched": true}))];

        let merged = consolidate(base, &[overlay], "InstanceId");

        assert_eq!(merged[0]["InstanceId"], json!("i2"));
        assert_eq!(merged[1]["InstanceId"], json!("i1"));
        assert_eq!(merged[1]["Patched"], json!(true));
    }

    #[test]
    fn records_without_the_key_field_are_skipped() {
        let base = vec![record(json!({"InstanceId": "i1"}))];
        let overlay = vec![record(json!({"Name": "orphan"}))];

        let merged = consolidate(base, &[overlay], "InstanceId");

        assert_eq!(merged[0].len(), 1);
    }
}
