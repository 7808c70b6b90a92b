mod test_support;

use serde_json::json;
use test_support::{
    candidate, draft_ids, error_code, request, request_ok, spawn_sidecar, temp_dir,
};

fn seed_teachers() -> Vec<serde_json::Value> {
    let mut out = Vec::new();
    for i in 1..=8 {
        out.push(candidate(&format!("m{}", i), "teacher", "M", "R1", "D1", &format!("W-m{}", i)));
        out.push(candidate(&format!("f{}", i), "teacher", "F", "R1", "D1", &format!("W-f{}", i)));
    }
    // Outside the job's district; must never be drawn.
    for i in 1..=3 {
        out.push(candidate(&format!("x{}", i), "teacher", "M", "R1", "D2", &format!("W-x{}", i)));
    }
    out
}

#[test]
fn draft_commit_reset_and_regenerate_flow() {
    let workspace = temp_dir("examassign-draft-flow");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let upsert = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "candidates.upsert",
        json!({ "candidates": seed_teachers() }),
    );
    assert_eq!(upsert.get("created").and_then(|v| v.as_u64()), Some(19));

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "jobs.create",
        json!({
            "name": "Grade 9 marking",
            "kind": "teacher",
            "totalRequired": 10,
            "regionCode": "R1",
            "districtNumber": "D1",
            "maleQuota": 60,
            "assignmentYear": 2026
        }),
    );
    let job_id = created
        .get("jobId")
        .and_then(|v| v.as_str())
        .expect("jobId")
        .to_string();
    assert_eq!(created["job"]["femaleQuota"].as_i64(), Some(40));

    let gen = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "assignments.generateDraft",
        json!({ "jobId": job_id, "seed": 7 }),
    );
    let draft = gen.get("draft").expect("draft");
    assert_eq!(draft["seed"].as_u64(), Some(7));
    assert_eq!(draft["shortfall"].as_u64(), Some(0));
    assert_eq!(draft["eligibleCount"].as_u64(), Some(16));
    let rows = draft["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 10);
    let males = rows
        .iter()
        .filter(|r| r["candidate"]["sex"].as_str() == Some("M"))
        .count();
    assert_eq!(males, 6);
    assert!(rows
        .iter()
        .all(|r| r["candidate"]["districtNumber"].as_str() == Some("D1")));
    assert!(rows.iter().all(|r| r["tier"].as_u64() == Some(1)));
    assert_eq!(draft["vacantSlots"].as_array().map(|v| v.len()), Some(0));
    let first_ids = draft_ids(draft);

    let held = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "assignments.draftGet",
        json!({ "jobId": job_id }),
    );
    assert_eq!(draft_ids(&held["draft"]), first_ids);

    let commit = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "assignments.commit",
        json!({ "jobId": job_id }),
    );
    assert_eq!(commit["status"].as_str(), Some("committed"));
    assert_eq!(commit["inserted"].as_u64(), Some(10));
    assert_eq!(commit["vacantCount"].as_u64(), Some(0));

    let gone = request(
        &mut stdin,
        &mut reader,
        "7",
        "assignments.draftGet",
        json!({ "jobId": job_id }),
    );
    assert_eq!(error_code(&gone), "no_draft");

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "assignments.list",
        json!({ "jobId": job_id }),
    );
    assert_eq!(listed["assignments"].as_array().map(|v| v.len()), Some(10));
    assert_eq!(listed["job"]["assignedCount"].as_i64(), Some(10));

    // Committing over existing rows is blocked and the draft survives the failure.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "assignments.generateDraft",
        json!({ "jobId": job_id, "seed": 7 }),
    );
    let blocked = request(
        &mut stdin,
        &mut reader,
        "10",
        "assignments.commit",
        json!({ "jobId": job_id }),
    );
    assert_eq!(error_code(&blocked), "hard_conflict");
    assert!(blocked["error"]["details"]["conflicts"]
        .as_array()
        .map(|v| !v.is_empty())
        .unwrap_or(false));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "assignments.draftGet",
        json!({ "jobId": job_id }),
    );

    let reset = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "assignments.reset",
        json!({ "jobId": job_id }),
    );
    assert_eq!(reset["deleted"].as_u64(), Some(10));

    // The job's own past rows never count against it, so the same seed reproduces the draft.
    let again = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "assignments.generateDraft",
        json!({ "jobId": job_id, "seed": 7 }),
    );
    assert_eq!(draft_ids(&again["draft"]), first_ids);
    let recommit = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "assignments.commit",
        json!({ "jobId": job_id }),
    );
    assert_eq!(recommit["status"].as_str(), Some("committed"));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn shared_workstation_is_drawn_once_and_shortfall_stays_vacant() {
    let workspace = temp_dir("examassign-shared-workstation");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "candidates.upsert",
        json!({
            "candidates": [
                candidate("s1", "supervisor", "M", "R1", "D1", "C1"),
                candidate("s2", "supervisor", "M", "R1", "D1", "C1"),
                candidate("s3", "supervisor", "F", "R1", "D1", "C1"),
                candidate("s4", "supervisor", "F", "R1", "D1", "C1"),
                candidate("s5", "supervisor", "M", "R1", "D1", "C2"),
            ]
        }),
    );
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "jobs.create",
        json!({
            "name": "Invigilation",
            "kind": "supervisor",
            "totalRequired": 4,
            "maleQuota": 50,
            "assignmentYear": 2026
        }),
    );
    let job_id = created["jobId"].as_str().expect("jobId").to_string();

    let gen = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "assignments.generateDraft",
        json!({ "jobId": job_id, "partitionBy": "district", "seed": 3 }),
    );
    let draft = &gen["draft"];
    let rows = draft["rows"].as_array().expect("rows");
    assert_eq!(rows.len(), 2);
    let mut workstations: Vec<&str> = rows
        .iter()
        .filter_map(|r| r["candidate"]["workstation"].as_str())
        .collect();
    workstations.sort();
    assert_eq!(workstations, vec!["C1", "C2"]);
    assert_eq!(draft["shortfall"].as_u64(), Some(2));
    let vacant = draft["vacantSlots"].as_array().expect("vacantSlots");
    assert_eq!(vacant.len(), 2);
    assert_eq!(vacant[0]["slot"].as_u64(), Some(3));

    let commit = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "assignments.commit",
        json!({ "jobId": job_id }),
    );
    assert_eq!(commit["inserted"].as_u64(), Some(2));
    assert_eq!(commit["vacantCount"].as_u64(), Some(2));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn draft_requires_known_job_and_held_draft() {
    let workspace = temp_dir("examassign-draft-errors");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let missing = request(
        &mut stdin,
        &mut reader,
        "2",
        "assignments.generateDraft",
        json!({ "jobId": "nope" }),
    );
    assert_eq!(error_code(&missing), "not_found");

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "jobs.create",
        json!({ "name": "Empty", "kind": "teacher", "totalRequired": 3 }),
    );
    let job_id = created["jobId"].as_str().expect("jobId").to_string();

    let no_draft = request(
        &mut stdin,
        &mut reader,
        "4",
        "assignments.commit",
        json!({ "jobId": job_id }),
    );
    assert_eq!(error_code(&no_draft), "no_draft");

    // An empty registry still yields a draft: all slots vacant.
    let gen = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "assignments.generateDraft",
        json!({ "jobId": job_id }),
    );
    assert_eq!(gen["draft"]["rows"].as_array().map(|v| v.len()), Some(0));
    assert_eq!(gen["draft"]["shortfall"].as_u64(), Some(3));
    assert!(gen["draft"]["seed"].as_u64().is_some());

    let discarded = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "assignments.draftDiscard",
        json!({ "jobId": job_id }),
    );
    assert_eq!(discarded["discarded"].as_bool(), Some(true));

    let bad_partition = request(
        &mut stdin,
        &mut reader,
        "7",
        "assignments.generateDraft",
        json!({ "jobId": job_id, "partitionBy": "county" }),
    );
    assert_eq!(error_code(&bad_partition), "bad_params");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn commit_rejects_a_draft_the_registry_has_moved_past() {
    let workspace = temp_dir("examassign-stale-draft");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "candidates.upsert",
        json!({ "candidates": [
            candidate("t1", "teacher", "M", "R1", "D1", "W1"),
            candidate("t2", "teacher", "F", "R1", "D1", "W2"),
        ]}),
    );
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "jobs.create",
        json!({ "name": "Oral exams", "kind": "teacher", "totalRequired": 2, "maleQuota": 50 }),
    );
    let job_id = created["jobId"].as_str().expect("jobId").to_string();
    let gen = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "assignments.generateDraft",
        json!({ "jobId": job_id, "seed": 5 }),
    );
    assert_eq!(gen["draft"]["rows"].as_array().map(|v| v.len()), Some(2));

    // t2 moves onto t1's workstation and t1 is deactivated after the draft was taken.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "candidates.upsert",
        json!({ "candidate": candidate("t2", "teacher", "F", "R1", "D1", "W1") }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "candidates.setStatus",
        json!({ "candidateId": "t1", "status": "inactive" }),
    );

    let stale = request(
        &mut stdin,
        &mut reader,
        "7",
        "assignments.commit",
        json!({ "jobId": job_id, "confirm": true }),
    );
    assert_eq!(error_code(&stale), "stale_draft", "{}", stale);
    let mut ids: Vec<&str> = stale["error"]["details"]["candidateIds"]
        .as_array()
        .expect("candidateIds")
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["t1", "t2"]);

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "assignments.list",
        json!({ "jobId": job_id }),
    );
    assert_eq!(listed["assignments"].as_array().map(|v| v.len()), Some(0));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "assignments.draftGet",
        json!({ "jobId": job_id }),
    );

    // A fresh draft sees only t2, on the new workstation.
    let regen = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "assignments.generateDraft",
        json!({ "jobId": job_id, "seed": 5 }),
    );
    assert_eq!(draft_ids(&regen["draft"]), vec!["t2".to_string()]);
    let commit = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "assignments.commit",
        json!({ "jobId": job_id }),
    );
    assert_eq!(commit["inserted"].as_u64(), Some(1));
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "assignments.list",
        json!({ "jobId": job_id }),
    );
    assert_eq!(listed["assignments"][0]["workstation"].as_str(), Some("W1"));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn supervisor_jobs_partition_by_center_by_default() {
    let workspace = temp_dir("examassign-supervisor-centers");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "candidates.upsert",
        json!({ "candidates": [
            candidate("s1", "supervisor", "M", "R1", "D1", "C1"),
            candidate("s2", "supervisor", "F", "R1", "D1", "C1"),
            candidate("s3", "supervisor", "M", "R1", "D2", "C2"),
            candidate("s4", "supervisor", "F", "R1", "D2", "C3"),
        ]}),
    );
    let created = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "jobs.create",
        json!({ "name": "Hall duty", "kind": "supervisor", "totalRequired": 3, "maleQuota": 50 }),
    );
    let job_id = created["jobId"].as_str().expect("jobId").to_string();

    let gen = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "assignments.generateDraft",
        json!({ "jobId": job_id, "seed": 9 }),
    );
    let draft = &gen["draft"];
    let keys: Vec<&str> = draft["partitions"]
        .as_array()
        .expect("partitions")
        .iter()
        .filter_map(|p| p["key"].as_str())
        .collect();
    assert_eq!(keys, vec!["C1", "C2", "C3"]);
    assert!(draft["partitions"]
        .as_array()
        .expect("partitions")
        .iter()
        .all(|p| p["target"].as_u64() == Some(1) && p["selected"].as_u64() == Some(1)));
    let mut picked = draft_ids(draft);
    picked.sort();
    assert_eq!(picked, vec!["s1", "s3", "s4"]);

    let _ = std::fs::remove_dir_all(workspace);
}
