use crate::assign::{CandidateKind, PartitionBy};
use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Assignment,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "assignment" => Some(Self::Assignment),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Assignment => "setup.assignment",
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Assignment => "assignment",
        }
    }
}

const ALL_SECTIONS: [SetupSection; 1] = [SetupSection::Assignment];

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Assignment => json!({
            "defaultMaleQuota": 50,
            "teacherPartition": "district",
            "supervisorPartition": "workstation",
            "distributeRemainder": false,
            "softConflictCheck": true
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_bool(v: &Value, key: &str) -> Result<bool, String> {
    v.as_bool().ok_or_else(|| format!("{} must be boolean", key))
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_partition(v: &Value, key: &str) -> Result<PartitionBy, String> {
    v.as_str()
        .and_then(PartitionBy::parse)
        .ok_or_else(|| format!("{} must be one of: district, workstation", key))
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Assignment => match k.as_str() {
                "defaultMaleQuota" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, 100)?));
                }
                "teacherPartition" | "supervisorPartition" => {
                    let p = parse_partition(v, k)?;
                    obj.insert(k.clone(), Value::String(p.as_str().to_string()));
                }
                "distributeRemainder" | "softConflictCheck" => {
                    obj.insert(k.clone(), Value::Bool(parse_bool(v, k)?));
                }
                _ => return Err(format!("unknown assignment field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed historical values fall back to defaults instead of blocking.
            let _ = merge_section_patch(section, &mut current, saved_obj);
        }
    }
    Ok(current)
}

/// Typed view of the `assignment` section used by the selector handlers.
#[derive(Debug, Clone)]
pub struct AssignmentSettings {
    pub default_male_quota: i64,
    pub teacher_partition: PartitionBy,
    pub supervisor_partition: PartitionBy,
    pub distribute_remainder: bool,
    pub soft_conflict_check: bool,
}

impl AssignmentSettings {
    pub fn partition_for(&self, kind: CandidateKind) -> PartitionBy {
        match kind {
            CandidateKind::Teacher => self.teacher_partition,
            CandidateKind::Supervisor => self.supervisor_partition,
        }
    }
}

pub fn load_assignment_settings(conn: &rusqlite::Connection) -> anyhow::Result<AssignmentSettings> {
    let v = load_section(conn, SetupSection::Assignment)?;
    let partition = |key: &str, fallback: PartitionBy| {
        v.get(key)
            .and_then(|p| p.as_str())
            .and_then(PartitionBy::parse)
            .unwrap_or(fallback)
    };
    Ok(AssignmentSettings {
        default_male_quota: v
            .get("defaultMaleQuota")
            .and_then(|q| q.as_i64())
            .unwrap_or(50),
        teacher_partition: partition("teacherPartition", PartitionBy::District),
        supervisor_partition: partition("supervisorPartition", PartitionBy::Workstation),
        distribute_remainder: v
            .get("distributeRemainder")
            .and_then(|b| b.as_bool())
            .unwrap_or(false),
        soft_conflict_check: v
            .get("softConflictCheck")
            .and_then(|b| b.as_bool())
            .unwrap_or(true),
    })
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let mut out = Map::new();
    for section in ALL_SECTIONS {
        match load_section(conn, section) {
            Ok(v) => {
                out.insert(section.name().to_string(), v);
            }
            Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
        }
    }
    ok(&req.id, Value::Object(out))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(
        &req.id,
        json!({ "ok": true, "section": section.name(), "values": current }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
