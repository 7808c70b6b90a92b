use crate::assign::{vacant_slots, CandidateKind, Scope};
use crate::db::{self, JobRow};
use crate::ipc::handlers::setup::load_assignment_settings;
use crate::ipc::helpers::{
    get_optional_i64_range, get_optional_str, get_required_str, now_stamp, with_db, HandlerErr,
};
use crate::ipc::types::{AppState, Request};
use chrono::Datelike;
use rusqlite::Connection;
use serde_json::{json, Value};
use uuid::Uuid;

pub fn job_json(job: &JobRow, assigned: i64) -> Value {
    json!({
        "id": job.id,
        "name": job.name,
        "kind": job.kind.as_str(),
        "totalRequired": job.total_required,
        "regionCode": job.region_code,
        "districtNumber": job.district_number,
        "maleQuota": job.male_quota,
        "femaleQuota": 100 - job.male_quota,
        "assignmentYear": job.assignment_year,
        "assignedCount": assigned,
        "vacantCount": vacant_slots(job.total_required.max(0) as usize, assigned.max(0) as usize)
    })
}

fn jobs_list(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let year = get_optional_i64_range(params, "assignmentYear", 1900, 9999)?;
    let jobs = db::list_jobs(conn, year).map_err(HandlerErr::query)?;
    let mut out = Vec::with_capacity(jobs.len());
    for job in &jobs {
        let assigned = db::count_assignments(conn, &job.id).map_err(HandlerErr::query)?;
        out.push(job_json(job, assigned));
    }
    Ok(json!({ "jobs": out }))
}

fn jobs_create(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let kind_raw = get_required_str(params, "kind")?;
    let Some(kind) = CandidateKind::parse(&kind_raw) else {
        return Err(HandlerErr::bad_params(
            "kind must be one of: teacher, supervisor",
        ));
    };
    let Some(total_required) = get_optional_i64_range(params, "totalRequired", 0, 1_000_000)?
    else {
        return Err(HandlerErr::bad_params("missing totalRequired"));
    };
    let region = Scope::parse(get_optional_str(params, "regionCode")?.as_deref());
    let district = Scope::parse(get_optional_str(params, "districtNumber")?.as_deref());
    let male_quota = match get_optional_i64_range(params, "maleQuota", 0, 100)? {
        Some(q) => q,
        None => {
            load_assignment_settings(conn)
                .map_err(HandlerErr::query)?
                .default_male_quota
        }
    };
    let assignment_year = get_optional_i64_range(params, "assignmentYear", 1900, 9999)?
        .unwrap_or_else(|| i64::from(chrono::Utc::now().year()));

    let job_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO jobs(
           id, name, kind, total_required, region_code, district_number, male_quota,
           assignment_year, created_at
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &job_id,
            &name,
            kind.as_str(),
            total_required,
            region.as_str(),
            district.as_str(),
            male_quota,
            assignment_year,
            now_stamp(),
        ),
    )
    .map_err(|e| {
        HandlerErr::new("db_insert_failed", e.to_string()).with_details(json!({ "table": "jobs" }))
    })?;
    tracing::info!(job_id = %job_id, kind = kind.as_str(), total_required, "job created");

    let job = db::load_job(conn, &job_id)
        .map_err(HandlerErr::query)?
        .ok_or_else(|| HandlerErr::new("not_found", "job not found"))?;
    Ok(json!({ "jobId": job_id, "job": job_json(&job, 0) }))
}

fn jobs_update(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let job_id = get_required_str(params, "jobId")?;
    let Some(patch) = params.get("patch").filter(|v| v.is_object()) else {
        return Err(HandlerErr::bad_params("patch must be an object"));
    };
    let Some(mut job) = db::load_job(conn, &job_id).map_err(HandlerErr::query)? else {
        return Err(HandlerErr::new("not_found", "job not found"));
    };

    if let Some(obj) = patch.as_object() {
        for key in obj.keys() {
            match key.as_str() {
                "name" => job.name = get_required_str(patch, "name")?,
                "totalRequired" => {
                    job.total_required =
                        get_optional_i64_range(patch, key, 0, 1_000_000)?.unwrap_or(job.total_required)
                }
                "regionCode" => {
                    job.region_code = Scope::parse(get_optional_str(patch, key)?.as_deref())
                        .as_str()
                        .to_string()
                }
                "districtNumber" => {
                    job.district_number = Scope::parse(get_optional_str(patch, key)?.as_deref())
                        .as_str()
                        .to_string()
                }
                "maleQuota" => {
                    job.male_quota =
                        get_optional_i64_range(patch, key, 0, 100)?.unwrap_or(job.male_quota)
                }
                "assignmentYear" => {
                    let year = get_optional_i64_range(patch, key, 1900, 9999)?
                        .unwrap_or(job.assignment_year);
                    // Committed rows carry the year the conflict scope filters on.
                    if year != job.assignment_year {
                        let assigned =
                            db::count_assignments(conn, &job.id).map_err(HandlerErr::query)?;
                        if assigned > 0 {
                            return Err(HandlerErr::new(
                                "in_use",
                                "reset the job's assignments before changing its year",
                            )
                            .with_details(json!({ "assignmentCount": assigned })));
                        }
                    }
                    job.assignment_year = year;
                }
                other => {
                    return Err(HandlerErr::bad_params(format!("unknown job field: {}", other)))
                }
            }
        }
    }

    conn.execute(
        "UPDATE jobs SET
           name = ?, total_required = ?, region_code = ?, district_number = ?,
           male_quota = ?, assignment_year = ?
         WHERE id = ?",
        (
            &job.name,
            job.total_required,
            &job.region_code,
            &job.district_number,
            job.male_quota,
            job.assignment_year,
            &job.id,
        ),
    )
    .map_err(|e| HandlerErr::new("db_update_failed", e.to_string()))?;

    let assigned = db::count_assignments(conn, &job.id).map_err(HandlerErr::query)?;
    Ok(json!({ "job": job_json(&job, assigned) }))
}

fn jobs_delete(conn: &Connection, params: &Value) -> Result<Value, HandlerErr> {
    let job_id = get_required_str(params, "jobId")?;
    let assigned = db::count_assignments(conn, &job_id).map_err(HandlerErr::query)?;
    if assigned > 0 {
        return Err(
            HandlerErr::new("in_use", "reset the job's assignments before deleting it")
                .with_details(json!({ "assignmentCount": assigned })),
        );
    }
    let deleted = conn
        .execute("DELETE FROM jobs WHERE id = ?", [&job_id])
        .map_err(|e| HandlerErr::new("db_delete_failed", e.to_string()))?;
    if deleted == 0 {
        return Err(HandlerErr::new("not_found", "job not found"));
    }
    Ok(json!({ "ok": true }))
}

fn handle_jobs_delete(state: &mut AppState, req: &Request) -> Value {
    let resp = with_db(state, req, jobs_delete);
    if resp.get("ok").and_then(|v| v.as_bool()) == Some(true) {
        if let Some(job_id) = req.params.get("jobId").and_then(|v| v.as_str()) {
            state.drafts.remove(job_id.trim());
        }
    }
    resp
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "jobs.list" => Some(with_db(state, req, jobs_list)),
        "jobs.create" => Some(with_db(state, req, jobs_create)),
        "jobs.update" => Some(with_db(state, req, jobs_update)),
        "jobs.delete" => Some(handle_jobs_delete(state, req)),
        _ => None,
    }
}
