mod test_support;

use serde_json::json;
use test_support::{candidate, error_code, request, request_ok, spawn_sidecar, temp_dir};

fn create_job(
    stdin: &mut std::process::ChildStdin,
    reader: &mut std::io::BufReader<std::process::ChildStdout>,
    id: &str,
    name: &str,
    total: i64,
    year: i64,
) -> String {
    let created = request_ok(
        stdin,
        reader,
        id,
        "jobs.create",
        json!({
            "name": name,
            "kind": "teacher",
            "totalRequired": total,
            "maleQuota": 50,
            "assignmentYear": year
        }),
    );
    created["jobId"].as_str().expect("jobId").to_string()
}

#[test]
fn same_year_overlap_needs_confirmation_and_hard_conflicts_block() {
    let workspace = temp_dir("examassign-conflicts");
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
                candidate("t1", "teacher", "M", "R1", "D1", "W1"),
                candidate("t2", "teacher", "M", "R1", "D1", "W2"),
                candidate("t3", "teacher", "F", "R1", "D1", "W3"),
                candidate("t4", "teacher", "F", "R1", "D1", "W4"),
            ]
        }),
    );

    let first = create_job(&mut stdin, &mut reader, "3", "Session A", 4, 2026);
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "assignments.generateDraft",
        json!({ "jobId": first, "seed": 11 }),
    );
    let commit = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "assignments.commit",
        json!({ "jobId": first }),
    );
    assert_eq!(commit["status"].as_str(), Some("committed"));

    // Everyone is already busy in Session A this year.
    let second = create_job(&mut stdin, &mut reader, "6", "Session B", 4, 2026);
    let gen = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "assignments.generateDraft",
        json!({ "jobId": second, "seed": 11 }),
    );
    assert!(gen["draft"]["rows"]
        .as_array()
        .expect("rows")
        .iter()
        .all(|r| r["tier"].as_u64() == Some(4)));

    let pending = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "assignments.commit",
        json!({ "jobId": second }),
    );
    assert_eq!(pending["status"].as_str(), Some("confirmation_required"));
    let soft = pending["softConflicts"].as_array().expect("softConflicts");
    assert_eq!(soft.len(), 4);
    assert_eq!(soft[0]["jobs"][0]["jobName"].as_str(), Some("Session A"));

    let not_written = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "assignments.list",
        json!({ "jobId": second }),
    );
    assert_eq!(not_written["assignments"].as_array().map(|v| v.len()), Some(0));

    let confirmed = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "assignments.commit",
        json!({ "jobId": second, "confirm": true }),
    );
    assert_eq!(confirmed["status"].as_str(), Some("committed"));
    assert_eq!(confirmed["inserted"].as_u64(), Some(4));

    let hard = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "assignments.checkConflict",
        json!({ "jobId": first, "candidateId": "t1" }),
    );
    assert_eq!(hard["conflict"]["outcome"].as_str(), Some("hardConflict"));
    assert_eq!(
        hard["conflict"]["details"]["reason"].as_str(),
        Some("alreadyAssigned")
    );

    let other_year = create_job(&mut stdin, &mut reader, "12", "Last year", 2, 2025);
    let clear = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "assignments.checkConflict",
        json!({ "jobId": other_year, "candidateId": "t1" }),
    );
    assert_eq!(clear["conflict"]["outcome"].as_str(), Some("clear"));

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn manual_reassign_respects_workstation_claims_and_confirmation() {
    let workspace = temp_dir("examassign-reassign");
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
                candidate("t1", "teacher", "M", "R1", "D1", "W1"),
                candidate("t2", "teacher", "F", "R1", "D1", "W2"),
                candidate("t5", "teacher", "M", "R1", "D1", "W1"),
                candidate("t6", "teacher", "F", "R1", "D1", "W6"),
                candidate("s1", "supervisor", "M", "R1", "D1", "C1"),
            ]
        }),
    );

    let job = create_job(&mut stdin, &mut reader, "3", "Session A", 2, 2026);
    let other = create_job(&mut stdin, &mut reader, "4", "Session B", 1, 2026);

    let assigned = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "assignments.reassign",
        json!({ "jobId": job, "candidateId": "t1" }),
    );
    assert_eq!(assigned["status"].as_str(), Some("assigned"));

    // t5 shares t1's workstation.
    let claimed = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "assignments.checkConflict",
        json!({ "jobId": job, "candidateId": "t5" }),
    );
    assert_eq!(
        claimed["conflict"]["details"]["reason"].as_str(),
        Some("workstationClaimed")
    );
    assert_eq!(claimed["conflict"]["details"]["heldBy"].as_str(), Some("t1"));
    let blocked = request(
        &mut stdin,
        &mut reader,
        "7",
        "assignments.reassign",
        json!({ "jobId": job, "candidateId": "t5" }),
    );
    assert_eq!(error_code(&blocked), "hard_conflict");

    // Swapping t1 out releases the workstation.
    let swapped = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "assignments.reassign",
        json!({ "jobId": job, "candidateId": "t5", "replaceCandidateId": "t1" }),
    );
    assert_eq!(swapped["replacedCandidateId"].as_str(), Some("t1"));

    let soft = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "assignments.reassign",
        json!({ "jobId": other, "candidateId": "t5" }),
    );
    assert_eq!(soft["status"].as_str(), Some("confirmation_required"));
    assert_eq!(soft["conflict"]["outcome"].as_str(), Some("softConflict"));
    let confirmed = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "assignments.reassign",
        json!({ "jobId": other, "candidateId": "t5", "confirm": true }),
    );
    assert_eq!(confirmed["status"].as_str(), Some("assigned"));

    let wrong_kind = request(
        &mut stdin,
        &mut reader,
        "11",
        "assignments.reassign",
        json!({ "jobId": job, "candidateId": "s1" }),
    );
    assert_eq!(error_code(&wrong_kind), "bad_params");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "candidates.setStatus",
        json!({ "candidateId": "t6", "status": "inactive" }),
    );
    let inactive = request(
        &mut stdin,
        &mut reader,
        "13",
        "assignments.checkConflict",
        json!({ "jobId": job, "candidateId": "t6" }),
    );
    assert_eq!(error_code(&inactive), "inactive_candidate");

    let removed = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "assignments.remove",
        json!({ "jobId": job, "candidateId": "t5" }),
    );
    assert_eq!(removed["ok"].as_bool(), Some(true));
    let again = request(
        &mut stdin,
        &mut reader,
        "15",
        "assignments.remove",
        json!({ "jobId": job, "candidateId": "t5" }),
    );
    assert_eq!(error_code(&again), "not_found");

    let _ = std::fs::remove_dir_all(workspace);
}
