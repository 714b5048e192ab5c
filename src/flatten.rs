use serde_json::{Map, Value};
use tracing::warn;

use crate::model::FlatRecord;

/// Copies only the named top-level fields out of a raw record. Fields absent
/// from the record are simply omitted; records stay sparse until table
/// assembly fills the gaps.
pub fn project(record: &Value, allowed: &[&str]) -> Map<String, Value> {
    let mut projected = Map::new();
    if let Value::Object(fields) = record {
        for &key in allowed {
            if let Some(value) = fields.get(key) {
                projected.insert(key.to_string(), value.clone());
            }
        }
    }
    projected
}

/// Known nested field shapes with a domain-specific promotion rule. Anything
/// else falls through to generic flattening untouched.
#[derive(Debug, Clone, Copy, PartialEq)]
enum NestedShape {
    Tags,
    SecurityGroups,
    IamInstanceProfile,
    State,
    LaunchTime,
    Generic,
}

impl NestedShape {
    fn classify(key: &str) -> Self {
        match key {
            "Tags" => Self::Tags,
            "SecurityGroups" => Self::SecurityGroups,
            "IamInstanceProfile" => Self::IamInstanceProfile,
            "State" => Self::State,
            "LaunchTime" => Self::LaunchTime,
            _ => Self::Generic,
        }
    }
}

/// Applies the domain promotion rules to the top level of `record`, then
/// flattens the result.
///
/// Tag lists explode into `Name` / `Tag_<Key>` fields, security groups
/// collapse to a comma-joined `GroupName:GroupId` string, instance profiles
/// and states collapse to their `Arn` / `Name`, and `LaunchTime` is renamed
/// `LastBootTime`. A rule only fires when its field is present; a field that
/// matches a rule's name but not its shape is dropped with a warning rather
/// than failing the record.
pub fn normalize(record: Map<String, Value>) -> FlatRecord {
    let mut shaped = Map::new();
    for (key, value) in record {
        match NestedShape::classify(&key) {
            NestedShape::Tags => explode_tags(&value, &mut shaped),
            NestedShape::SecurityGroups => match join_security_groups(&value) {
                Some(joined) => {
                    shaped.insert(key, Value::String(joined));
                }
                None => warn!(field = %key, "malformed security group list dropped"),
            },
            NestedShape::IamInstanceProfile => collapse_to(&key, value, "Arn", &mut shaped),
            NestedShape::State => collapse_to(&key, value, "Name", &mut shaped),
            NestedShape::LaunchTime => {
                shaped.insert("LastBootTime".to_string(), value);
            }
            NestedShape::Generic => {
                shaped.insert(key, value);
            }
        }
    }
    flatten(&Value::Object(shaped))
}

/// The pair whose `Key` is `"Name"` becomes the `Name` field; every other
/// pair becomes `Tag_<Key>`.
fn explode_tags(tags: &Value, shaped: &mut Map<String, Value>) {
    let Some(entries) = tags.as_array() else {
        warn!("malformed tag list dropped");
        return;
    };
    for entry in entries {
        let (Some(key), Some(value)) = (
            entry.get("Key").and_then(Value::as_str),
            entry.get("Value"),
        ) else {
            warn!("malformed tag entry dropped");
            continue;
        };
        let field = if key == "Name" {
            "Name".to_string()
        } else {
            format!("Tag_{key}")
        };
        shaped.insert(field, value.clone());
    }
}

fn join_security_groups(groups: &Value) -> Option<String> {
    let entries = groups.as_array()?;
    let mut parts = Vec::with_capacity(entries.len());
    for entry in entries {
        let name = entry.get("GroupName").and_then(Value::as_str)?;
        let id = entry.get("GroupId").and_then(Value::as_str)?;
        parts.push(format!("{name}:{id}"));
    }
    Some(parts.join(","))
}

/// Collapses a single-interesting-field mapping to that field's value.
fn collapse_to(key: &str, value: Value, inner: &str, shaped: &mut Map<String, Value>) {
    match value.get(inner) {
        Some(extracted) => {
            shaped.insert(key.to_string(), extracted.clone());
        }
        None => warn!(field = %key, missing = %inner, "malformed nested field dropped"),
    }
}

/// Flattens a nested value into a single level of scalar fields.
///
/// Parent path segments are joined with `_`: mapping keys by name, sequence
/// elements by their zero-based index. Descent terminates at the first
/// scalar on each path, so a record that is already flat comes back
/// unchanged. Inputs are tree-shaped; depth is bounded by the input.
pub fn flatten(value: &Value) -> FlatRecord {
    let mut flat = Map::new();
    let mut path: Vec<String> = Vec::new();
    descend(value, &mut path, &mut flat);
    flat
}

fn descend(value: &Value, path: &mut Vec<String>, flat: &mut FlatRecord) {
    match value {
        Value::Object(fields) => {
            for (key, child) in fields {
                path.push(key.clone());
                descend(child, path, flat);
                path.pop();
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                path.push(index.to_string());
                descend(child, path, flat);
                path.pop();
            }
        }
        scalar => {
            flat.insert(path.join("_"), scalar.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn project_keeps_only_allowed_present_fields() {
        let record = json!({"InstanceId": "i-1", "State": {"Name": "running"}, "Extra": 7});

        let projected = project(&record, &["InstanceId", "State", "Tags"]);

        assert_eq!(projected.len(), 2);
        assert!(projected.contains_key("InstanceId"));
        assert!(projected.contains_key("State"));
    }

    #[test]
    fn flatten_is_identity_on_already_flat_records() {
        let record = as_map(json!({"a": 1, "b": "two", "c": true}));

        assert_eq!(flatten(&Value::Object(record.clone())), record);
    }

    #[test]
    fn flatten_joins_mapping_and_sequence_segments() {
        let record = json!({
            "Placement": {"AvailabilityZone": "us-east-1a"},
            "BlockDevices": [{"DeviceName": "/dev/xvda"}, {"DeviceName": "/dev/xvdb"}]
        });

        let flat = flatten(&record);

        assert_eq!(flat["Placement_AvailabilityZone"], json!("us-east-1a"));
        assert_eq!(flat["BlockDevices_0_DeviceName"], json!("/dev/xvda"));
        assert_eq!(flat["BlockDevices_1_DeviceName"], json!("/dev/xvdb"));
    }

    #[test]
    fn tags_explode_into_name_and_prefixed_fields() {
        let record = as_map(json!({
            "Tags": [
                {"Key": "Name", "Value": "web1"},
                {"Key": "env", "Value": "prod"}
            ]
        }));

        let flat = normalize(record);

        assert_eq!(flat["Name"], json!("web1"));
        assert_eq!(flat["Tag_env"], json!("prod"));
        assert!(!flat.contains_key("Tags"));
    }

    #[test]
    fn security_groups_collapse_to_joined_string_in_order() {
        let record = as_map(json!({
            "SecurityGroups": [
                {"GroupName": "web", "GroupId": "sg-1"},
                {"GroupName": "ssh", "GroupId": "sg-2"}
            ]
        }));

        let flat = normalize(record);

        assert_eq!(flat["SecurityGroups"], json!("web:sg-1,ssh:sg-2"));
    }

    #[test]
    fn profile_and_state_collapse_and_launch_time_is_renamed() {
        let record = as_map(json!({
            "IamInstanceProfile": {"Arn": "arn:aws:iam::1:instance-profile/x", "Id": "AIP"},
            "State": {"Code": 16, "Name": "running"},
            "LaunchTime": "2024-05-01T12:00:00Z"
        }));

        let flat = normalize(record);

        assert_eq!(flat["IamInstanceProfile"], json!("arn:aws:iam::1:instance-profile/x"));
        assert_eq!(flat["State"], json!("running"));
        assert_eq!(flat["LastBootTime"], json!("2024-05-01T12:00:00Z"));
        assert!(!flat.contains_key("LaunchTime"));
    }

    #[test]
    fn malformed_shape_drops_the_field_but_keeps_the_record() {
        let record = as_map(json!({
            "InstanceId": "i-1",
            "State": {"Code": 16}
        }));

        let flat = normalize(record);

        assert_eq!(flat["InstanceId"], json!("i-1"));
        assert!(!flat.contains_key("State"));
    }

    #[test]
    fn unknown_fields_pass_through_generic_flattening() {
        let record = as_map(json!({
            "Monitoring": {"State": "disabled"}
        }));

        let flat = normalize(record);

        assert_eq!(flat["Monitoring_State"], json!("disabled"));
    }
}
