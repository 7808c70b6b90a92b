use crate::assign::{normalize_sex, CandidateKind, Scope};
use crate::ipc::helpers::{get_optional_str, get_required_str, now_stamp, with_db, HandlerErr};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

struct CandidateInput {
    id: Option<String>,
    kind: CandidateKind,
    full_name: String,
    sex: String,
    region_code: String,
    district_number: String,
    workstation: String,
    status: String,
}

fn parse_kind(params: &Value) -> Result<CandidateKind, HandlerErr> {
    let raw = get_required_str(params, "kind")?;
    CandidateKind::parse(&raw)
        .ok_or_else(|| HandlerErr::bad_params("kind must be one of: teacher, supervisor"))
}

fn parse_status(raw: &str) -> Result<String, HandlerErr> {
    let s = raw.trim().to_ascii_lowercase();
    if s != "active" && s != "inactive" {
        return Err(HandlerErr::bad_params(
            "status must be one of: active, inactive",
        ));
    }
    Ok(s)
}

fn parse_candidate_input(raw: &Value, index: usize) -> Result<CandidateInput, HandlerErr> {
    let at = |e: HandlerErr| e.with_details(json!({ "index": index }));
    if !raw.is_object() {
        return Err(at(HandlerErr::bad_params("candidate must be an object")));
    }
    let kind = parse_kind(raw).map_err(at)?;
    let full_name = get_required_str(raw, "fullName").map_err(at)?;
    let sex_raw = get_required_str(raw, "sex").map_err(at)?;
    let Some(sex) = normalize_sex(&sex_raw) else {
        return Err(at(HandlerErr::bad_params("sex must be one of: M, F")));
    };
    let region_code = get_required_str(raw, "regionCode").map_err(at)?;
    let district_number = get_required_str(raw, "districtNumber").map_err(at)?;
    let workstation = get_required_str(raw, "workstation").map_err(at)?;
    let status = match get_optional_str(raw, "status").map_err(at)? {
        Some(s) => parse_status(&s).map_err(at)?,
        None => "active".to_string(),
    };
    Ok(CandidateInput {
        id: get_optional_str(raw, "id").map_err(at)?.filter(|s| !s.is_empty()),
        kind,
        full_name,
        sex,
        region_code,
        district_number,
        workstation,
        status,
    })
}

fn candidates_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let kind = parse_kind(params)?;
    let status = match get_optional_str(params, "status")? {
        Some(s) if !s.eq_ignore_ascii_case("all") => Some(parse_status(&s)?),
        _ => None,
    };
    let region = Scope::parse(get_optional_str(params, "regionCode")?.as_deref());
    let district = Scope::parse(get_optional_str(params, "districtNumber")?.as_deref());

    // Correlated subquery keeps the count from multiplying rows.
    let mut stmt = conn
        .prepare(
            "SELECT
               c.id, c.full_name, c.sex, c.region_code, c.district_number, c.workstation, c.status,
               (SELECT COUNT(*) FROM assignments a WHERE a.candidate_id = c.id) AS assignment_count
             FROM candidates c
             WHERE c.kind = ?
             ORDER BY c.region_code, c.district_number, c.full_name",
        )
        .map_err(HandlerErr::query)?;
    let rows = stmt
        .query_map([kind.as_str()], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, String>(4)?,
                r.get::<_, String>(5)?,
                r.get::<_, String>(6)?,
                r.get::<_, i64>(7)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;

    let candidates: Vec<Value> = rows
        .into_iter()
        .filter(|(_, _, _, region_code, district_number, _, st, _)| {
            region.admits(region_code)
                && district.admits(district_number)
                && status.as_deref().map(|s| s == st).unwrap_or(true)
        })
        .map(
            |(id, full_name, sex, region_code, district_number, workstation, st, count)| {
                json!({
                    "id": id,
                    "kind": kind.as_str(),
                    "fullName": full_name,
                    "sex": sex,
                    "regionCode": region_code,
                    "districtNumber": district_number,
                    "workstation": workstation,
                    "status": st,
                    "assignmentCount": count
                })
            },
        )
        .collect();
    Ok(json!({ "candidates": candidates }))
}

fn candidates_upsert(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let inputs: Vec<CandidateInput> = match (params.get("candidates"), params.get("candidate")) {
        (Some(Value::Array(items)), _) => items
            .iter()
            .enumerate()
            .map(|(i, raw)| parse_candidate_input(raw, i))
            .collect::<Result<_, _>>()?,
        (None, Some(single)) => vec![parse_candidate_input(single, 0)?],
        _ => {
            return Err(HandlerErr::bad_params(
                "expected candidates array or candidate object",
            ))
        }
    };

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let stamp = now_stamp();
    let mut ids = Vec::with_capacity(inputs.len());
    let mut created = 0usize;
    let mut updated = 0usize;
    for input in inputs {
        let existing_kind: Option<String> = match input.id.as_deref() {
            Some(id) => tx
                .query_row("SELECT kind FROM candidates WHERE id = ?", [id], |r| r.get(0))
                .optional()
                .map_err(HandlerErr::query)?,
            None => None,
        };
        if let Some(k) = existing_kind.as_deref() {
            if k != input.kind.as_str() {
                return Err(HandlerErr::bad_params("candidate kind cannot change")
                    .with_details(json!({ "candidateId": input.id })));
            }
        }
        let id = input
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        tx.execute(
            "INSERT INTO candidates(
               id, kind, full_name, sex, region_code, district_number, workstation, status, updated_at
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               full_name = excluded.full_name,
               sex = excluded.sex,
               region_code = excluded.region_code,
               district_number = excluded.district_number,
               workstation = excluded.workstation,
               status = excluded.status,
               updated_at = excluded.updated_at",
            (
                &id,
                input.kind.as_str(),
                &input.full_name,
                &input.sex,
                &input.region_code,
                &input.district_number,
                &input.workstation,
                &input.status,
                &stamp,
            ),
        )
        .map_err(|e| {
            HandlerErr::new("db_insert_failed", e.to_string())
                .with_details(json!({ "table": "candidates" }))
        })?;
        if existing_kind.is_some() {
            updated += 1;
        } else {
            created += 1;
        }
        ids.push(id);
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    tracing::info!(created, updated, "candidates upserted");
    Ok(json!({ "candidateIds": ids, "created": created, "updated": updated }))
}

fn candidates_set_status(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let candidate_id = get_required_str(params, "candidateId")?;
    let status = parse_status(&get_required_str(params, "status")?)?;
    let changed = conn
        .execute(
            "UPDATE candidates SET status = ?, updated_at = ? WHERE id = ?",
            (&status, now_stamp(), &candidate_id),
        )
        .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;
    if changed == 0 {
        return Err(HandlerErr::new("not_found", "candidate not found"));
    }
    Ok(json!({ "ok": true, "status": status }))
}

fn candidates_delete(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let candidate_id = get_required_str(params, "candidateId")?;
    let assigned: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM assignments WHERE candidate_id = ?",
            [&candidate_id],
            |r| r.get(0),
        )
        .map_err(HandlerErr::query)?;
    if assigned > 0 {
        return Err(HandlerErr::new("in_use", "candidate has assignments")
            .with_details(json!({ "assignmentCount": assigned })));
    }
    let deleted = conn
        .execute("DELETE FROM candidates WHERE id = ?", [&candidate_id])
        .map_err(|e| HandlerErr::new("db_delete_failed", e.to_string()))?;
    if deleted == 0 {
        return Err(HandlerErr::new("not_found", "candidate not found"));
    }
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "candidates.list" => Some(with_db(state, req, candidates_list)),
        "candidates.upsert" => Some(with_db(state, req, candidates_upsert)),
        "candidates.setStatus" => Some(with_db(state, req, candidates_set_status)),
        "candidates.delete" => Some(with_db(state, req, candidates_delete)),
        _ => None,
    }
}
