use crate::assign::{
    check_bulk, check_candidate, generate_draft, vacant_slots, Candidate, CheckOptions,
    ConflictOutcome, Draft, JobRef, PartitionBy, QuotaSplit, Scope, SelectionCriteria,
};
use crate::db::{self, JobRow};
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::jobs::job_json;
use crate::ipc::handlers::setup::load_assignment_settings;
use crate::ipc::helpers::{
    get_optional_bool, get_optional_i64_range, get_optional_str, get_optional_u64,
    get_required_str, now_stamp, with_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use uuid::Uuid;

fn require_job(conn: &Connection, params: &Value) -> Result<JobRow, HandlerErr> {
    let job_id = get_required_str(params, "jobId")?;
    db::load_job(conn, &job_id)
        .map_err(HandlerErr::query)?
        .ok_or_else(|| HandlerErr::new("not_found", "job not found"))
}

/// Synthetic rows padding a table up to `totalRequired`; numbered after the filled rows.
fn vacant_rows(filled: usize, vacant: usize) -> Vec<Value> {
    (0..vacant)
        .map(|i| json!({ "slot": filled + i + 1, "vacant": true }))
        .collect()
}

fn draft_json(draft: &Draft) -> Result<Value, HandlerErr> {
    let mut v =
        serde_json::to_value(draft).map_err(|e| HandlerErr::new("internal", e.to_string()))?;
    v["vacantSlots"] = Value::Array(vacant_rows(draft.rows.len(), draft.shortfall));
    Ok(v)
}

fn conflict_json(outcome: &ConflictOutcome) -> Result<Value, HandlerErr> {
    serde_json::to_value(outcome).map_err(|e| HandlerErr::new("internal", e.to_string()))
}

/// Job definition, optionally narrowed or overridden by the request, plus workspace settings.
fn build_criteria(
    conn: &Connection,
    job: &JobRow,
    params: &Value,
) -> Result<SelectionCriteria, HandlerErr> {
    let settings = load_assignment_settings(conn).map_err(HandlerErr::query)?;
    let total_required = get_optional_i64_range(params, "totalRequired", 0, 1_000_000)?
        .unwrap_or(job.total_required)
        .max(0) as usize;
    let region = match get_optional_str(params, "regionCode")? {
        Some(r) => Scope::parse(Some(r.as_str())),
        None => Scope::parse(Some(job.region_code.as_str())),
    };
    let district = match get_optional_str(params, "districtNumber")? {
        Some(d) => Scope::parse(Some(d.as_str())),
        None => Scope::parse(Some(job.district_number.as_str())),
    };
    let male_quota = get_optional_i64_range(params, "maleQuota", 0, 100)?
        .unwrap_or(job.male_quota)
        .clamp(0, 100) as u32;
    let partition_by = match get_optional_str(params, "partitionBy")? {
        Some(p) => PartitionBy::parse(&p).ok_or_else(|| {
            HandlerErr::bad_params("partitionBy must be one of: district, workstation")
        })?,
        None => settings.partition_for(job.kind),
    };
    let distribute_remainder =
        get_optional_bool(params, "distributeRemainder")?.unwrap_or(settings.distribute_remainder);

    Ok(SelectionCriteria {
        kind: job.kind,
        total_required,
        region,
        district,
        quotas: QuotaSplit::male_female(male_quota),
        partition_by,
        distribute_remainder,
    })
}

fn soft_check_enabled(conn: &Connection) -> Result<bool, HandlerErr> {
    Ok(load_assignment_settings(conn)
        .map_err(HandlerErr::query)?
        .soft_conflict_check)
}

fn assignments_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let job = require_job(conn, params)?;
    let mut stmt = conn
        .prepare(
            "SELECT a.candidate_id, c.full_name, c.sex, a.region_code, a.district_number,
                    a.workstation, a.assignment_year, a.created_at
             FROM assignments a
             JOIN candidates c ON c.id = a.candidate_id
             WHERE a.job_id = ?
             ORDER BY a.region_code, a.district_number, c.full_name",
        )
        .map_err(HandlerErr::query)?;
    let rows = stmt
        .query_map([&job.id], |r| {
            Ok(json!({
                "candidateId": r.get::<_, String>(0)?,
                "fullName": r.get::<_, String>(1)?,
                "sex": r.get::<_, String>(2)?,
                "regionCode": r.get::<_, String>(3)?,
                "districtNumber": r.get::<_, String>(4)?,
                "workstation": r.get::<_, String>(5)?,
                "assignmentYear": r.get::<_, i64>(6)?,
                "createdAt": r.get::<_, Option<String>>(7)?
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::query)?;

    let vacant = vacant_slots(job.total_required.max(0) as usize, rows.len());
    Ok(json!({
        "job": job_json(&job, rows.len() as i64),
        "vacantSlots": vacant_rows(rows.len(), vacant),
        "assignments": rows
    }))
}

fn handle_generate_draft(state: &mut AppState, req: &Request) -> Value {
    let AppState {
        db: open_db, drafts, ..
    } = state;
    let Some(conn) = open_db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let run = || -> Result<Draft, HandlerErr> {
        let job = require_job(conn, &req.params)?;
        let criteria = build_criteria(conn, &job, &req.params)?;
        let seed = get_optional_u64(&req.params, "seed")?;
        let pool = db::load_candidates(conn, job.kind).map_err(HandlerErr::query)?;
        let history = db::load_history(conn, job.kind).map_err(HandlerErr::query)?;
        Ok(generate_draft(&job.id, &pool, &history, &criteria, seed))
    };
    let draft = match run() {
        Ok(d) => d,
        Err(e) => return e.response(&req.id),
    };
    tracing::info!(
        job_id = %draft.job_id,
        seed = draft.seed,
        selected = draft.rows.len(),
        shortfall = draft.shortfall,
        "draft generated"
    );
    let body = match draft_json(&draft) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    drafts.insert(draft.job_id.clone(), draft);
    ok(&req.id, json!({ "draft": body }))
}

fn handle_draft_get(state: &mut AppState, req: &Request) -> Value {
    let job_id = match get_required_str(&req.params, "jobId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let Some(draft) = state.drafts.get(&job_id) else {
        return err(&req.id, "no_draft", "no draft held for this job", None);
    };
    match draft_json(draft) {
        Ok(body) => ok(&req.id, json!({ "draft": body })),
        Err(e) => e.response(&req.id),
    }
}

fn handle_draft_discard(state: &mut AppState, req: &Request) -> Value {
    let job_id = match get_required_str(&req.params, "jobId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let discarded = state.drafts.remove(&job_id).is_some();
    ok(&req.id, json!({ "ok": true, "discarded": discarded }))
}

enum CommitOutcome {
    Committed { inserted: usize, vacant: usize },
    NeedsConfirmation(Value),
}

/// Current registry rows for every drafted candidate. Any candidate that vanished, went
/// inactive, or changed workstation or geography since generation makes the draft stale.
fn reload_draft_candidates(
    conn: &Connection,
    job: &JobRow,
    draft: &Draft,
) -> Result<Vec<Candidate>, HandlerErr> {
    let mut fresh = Vec::with_capacity(draft.rows.len());
    let mut stale = Vec::new();
    for row in &draft.rows {
        let drafted = &row.candidate;
        match db::load_candidate(conn, &drafted.id).map_err(HandlerErr::query)? {
            Some(c)
                if c.active
                    && c.kind == job.kind
                    && c.workstation == drafted.workstation
                    && c.region_code == drafted.region_code
                    && c.district_number == drafted.district_number =>
            {
                fresh.push(c)
            }
            _ => stale.push(drafted.id.clone()),
        }
    }
    if !stale.is_empty() {
        tracing::warn!(job_id = %job.id, count = stale.len(), "draft is stale");
        return Err(HandlerErr::new(
            "stale_draft",
            "registry changed since the draft was generated; regenerate it",
        )
        .with_details(json!({ "candidateIds": stale })));
    }
    Ok(fresh)
}

fn commit_draft(
    conn: &Connection,
    draft: &Draft,
    params: &Value,
) -> Result<CommitOutcome, HandlerErr> {
    let job = db::load_job(conn, &draft.job_id)
        .map_err(HandlerErr::query)?
        .ok_or_else(|| HandlerErr::new("not_found", "job not found"))?;
    let confirm = get_optional_bool(params, "confirm")?.unwrap_or(false);
    let fresh = reload_draft_candidates(conn, &job, draft)?;
    let existing = db::load_conflict_scope(conn, &job).map_err(HandlerErr::query)?;
    let picks: Vec<(&str, &str)> = fresh
        .iter()
        .map(|c| (c.id.as_str(), c.workstation.as_str()))
        .collect();
    let job_ref = JobRef {
        id: &job.id,
        assignment_year: job.assignment_year,
    };
    let conflicts = check_bulk(job_ref, &picks, &existing, soft_check_enabled(conn)?);

    if !conflicts.is_clear() {
        if !conflicts.hard.is_empty() {
            tracing::warn!(job_id = %job.id, count = conflicts.hard.len(), "commit blocked by hard conflicts");
            return Err(HandlerErr::new(
                "hard_conflict",
                "draft contains candidates already assigned to this job",
            )
            .with_details(json!({ "conflicts": conflicts.hard })));
        }
        if !confirm {
            return Ok(CommitOutcome::NeedsConfirmation(json!({
                "status": "confirmation_required",
                "softConflicts": conflicts.soft
            })));
        }
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    let stamp = now_stamp();
    for c in &fresh {
        tx.execute(
            "INSERT INTO assignments(
               id, job_id, candidate_id, assignment_year, region_code, district_number,
               workstation, created_at
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                &job.id,
                &c.id,
                job.assignment_year,
                &c.region_code,
                &c.district_number,
                &c.workstation,
                &stamp,
            ),
        )
        .map_err(|e| {
            HandlerErr::new("db_insert_failed", e.to_string())
                .with_details(json!({ "table": "assignments", "candidateId": c.id }))
        })?;
    }
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;

    let assigned = db::count_assignments(conn, &job.id).map_err(HandlerErr::query)?;
    Ok(CommitOutcome::Committed {
        inserted: fresh.len(),
        vacant: vacant_slots(job.total_required.max(0) as usize, assigned.max(0) as usize),
    })
}

fn handle_commit(state: &mut AppState, req: &Request) -> Value {
    let AppState {
        db: open_db, drafts, ..
    } = state;
    let Some(conn) = open_db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let job_id = match get_required_str(&req.params, "jobId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let Some(draft) = drafts.get(&job_id) else {
        return err(&req.id, "no_draft", "generate a draft before committing", None);
    };

    // The draft stays in place on every non-success path so the commit can be retried.
    match commit_draft(conn, draft, &req.params) {
        Ok(CommitOutcome::Committed { inserted, vacant }) => {
            tracing::info!(job_id = %job_id, inserted, vacant, "draft committed");
            drafts.remove(&job_id);
            ok(
                &req.id,
                json!({ "status": "committed", "inserted": inserted, "vacantCount": vacant }),
            )
        }
        Ok(CommitOutcome::NeedsConfirmation(body)) => ok(&req.id, body),
        Err(e) => {
            tracing::warn!(job_id = %job_id, code = e.code, "commit failed");
            e.response(&req.id)
        }
    }
}

fn assignments_reset(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let job = require_job(conn, params)?;
    let deleted = conn
        .execute("DELETE FROM assignments WHERE job_id = ?", [&job.id])
        .map_err(|e| {
            HandlerErr::new("db_delete_failed", e.to_string())
                .with_details(json!({ "table": "assignments" }))
        })?;
    tracing::info!(job_id = %job.id, deleted, "assignments reset");
    Ok(json!({ "ok": true, "deleted": deleted }))
}

struct ManualCheck {
    job: JobRow,
    candidate_id: String,
    replacing: Option<String>,
    outcome: ConflictOutcome,
}

/// Shared pre-flight for single-candidate paths.
fn manual_check(conn: &Connection, params: &Value) -> Result<ManualCheck, HandlerErr> {
    let job = require_job(conn, params)?;
    let candidate_id = get_required_str(params, "candidateId")?;
    let replacing = get_optional_str(params, "replaceCandidateId")?.filter(|s| !s.is_empty());
    let Some(candidate) = db::load_candidate(conn, &candidate_id).map_err(HandlerErr::query)?
    else {
        return Err(HandlerErr::new("not_found", "candidate not found"));
    };
    if candidate.kind != job.kind {
        return Err(HandlerErr::bad_params(format!(
            "job draws {} candidates",
            job.kind.as_str()
        )));
    }
    if !candidate.active {
        return Err(HandlerErr::new("inactive_candidate", "candidate is inactive"));
    }

    let existing = db::load_conflict_scope(conn, &job).map_err(HandlerErr::query)?;
    let outcome = check_candidate(
        JobRef {
            id: &job.id,
            assignment_year: job.assignment_year,
        },
        &candidate.id,
        &candidate.workstation,
        &existing,
        CheckOptions {
            replacing: replacing.as_deref(),
            soft_check: soft_check_enabled(conn)?,
        },
    );
    Ok(ManualCheck {
        job,
        candidate_id,
        replacing,
        outcome,
    })
}

fn assignments_check_conflict(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let check = manual_check(conn, params)?;
    Ok(json!({ "conflict": conflict_json(&check.outcome)? }))
}

fn assignments_reassign(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let check = manual_check(conn, params)?;
    let confirm = get_optional_bool(params, "confirm")?.unwrap_or(false);
    match &check.outcome {
        ConflictOutcome::HardConflict(_) => {
            tracing::warn!(job_id = %check.job.id, candidate_id = %check.candidate_id, "reassign blocked");
            return Err(
                HandlerErr::new("hard_conflict", "candidate cannot be assigned to this job")
                    .with_details(json!({ "conflict": conflict_json(&check.outcome)? })),
            );
        }
        ConflictOutcome::SoftConflict(_) if !confirm => {
            return Ok(json!({
                "status": "confirmation_required",
                "conflict": conflict_json(&check.outcome)?
            }));
        }
        _ => {}
    }

    let candidate = db::load_candidate(conn, &check.candidate_id)
        .map_err(HandlerErr::query)?
        .ok_or_else(|| HandlerErr::new("not_found", "candidate not found"))?;
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| HandlerErr::new("db_tx_failed", e.to_string()))?;
    if let Some(old) = check.replacing.as_deref() {
        let deleted = tx
            .execute(
                "DELETE FROM assignments WHERE job_id = ? AND candidate_id = ?",
                (&check.job.id, old),
            )
            .map_err(|e| HandlerErr::new("db_delete_failed", e.to_string()))?;
        if deleted == 0 {
            return Err(HandlerErr::new(
                "not_found",
                "replaced candidate is not assigned to this job",
            ));
        }
    }
    tx.execute(
        "INSERT INTO assignments(
           id, job_id, candidate_id, assignment_year, region_code, district_number,
           workstation, created_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        (
            Uuid::new_v4().to_string(),
            &check.job.id,
            &candidate.id,
            check.job.assignment_year,
            &candidate.region_code,
            &candidate.district_number,
            &candidate.workstation,
            now_stamp(),
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string())
            .with_details(json!({ "table": "assignments" }))
    })?;
    tx.commit()
        .map_err(|e| HandlerErr::new("db_commit_failed", e.to_string()))?;
    tracing::info!(
        job_id = %check.job.id,
        candidate_id = %candidate.id,
        replaced = check.replacing.as_deref().unwrap_or(""),
        "candidate assigned"
    );

    Ok(json!({
        "status": "assigned",
        "candidateId": candidate.id,
        "replacedCandidateId": check.replacing
    }))
}

fn assignments_remove(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let job = require_job(conn, params)?;
    let candidate_id = get_required_str(params, "candidateId")?;
    let exists: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM assignments WHERE job_id = ? AND candidate_id = ?",
            (&job.id, &candidate_id),
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::query)?;
    if exists.is_none() {
        return Err(HandlerErr::new("not_found", "assignment not found"));
    }
    conn.execute(
        "DELETE FROM assignments WHERE job_id = ? AND candidate_id = ?",
        (&job.id, &candidate_id),
    )
    .map_err(|e| HandlerErr::new("db_delete_failed", e.to_string()))?;
    Ok(json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assignments.list" => Some(with_db(state, req, assignments_list)),
        "assignments.generateDraft" => Some(handle_generate_draft(state, req)),
        "assignments.draftGet" => Some(handle_draft_get(state, req)),
        "assignments.draftDiscard" => Some(handle_draft_discard(state, req)),
        "assignments.commit" => Some(handle_commit(state, req)),
        "assignments.reset" => Some(with_db(state, req, assignments_reset)),
        "assignments.checkConflict" => Some(with_db(state, req, assignments_check_conflict)),
        "assignments.reassign" => Some(with_db(state, req, assignments_reassign)),
        "assignments.remove" => Some(with_db(state, req, assignments_remove)),
        _ => None,
    }
}
