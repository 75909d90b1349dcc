use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[test]
fn test_malformed_csv_handling() {
    let csv = tempfile::NamedTempFile::new().unwrap();
    let mut wtr = csv::Writer::from_path(csv.path()).unwrap();
    wtr.write_record(["type", "purchase", "user", "plan", "at"])
        .unwrap();

    wtr.write_record(["create", "p1", "alice", "cosmo", "2024-05-01T12:00:00Z"])
        .unwrap();
    // Unknown event type
    wtr.write_record(["refund", "p1", "", "", "2024-05-01T12:01:00Z"])
        .unwrap();
    // Unparseable timestamp
    wtr.write_record(["pay", "p1", "", "", "yesterday"]).unwrap();
    wtr.write_record(["pay", "p1", "", "", "2024-05-01T12:02:00Z"])
        .unwrap();
    wtr.write_record(["reconcile", "p1", "", "", "2024-05-01T12:03:00Z"])
        .unwrap();
    wtr.flush().unwrap();
    drop(wtr);

    let mut cmd = Command::new(cargo_bin!("pixvip"));
    cmd.arg("simulate").arg(csv.path());

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Error reading event"))
        .stdout(predicate::str::contains(
            "p1,alice,cosmo,29.90,completed,2024-05-01T12:03:00Z",
        ));
}

#[test]
fn test_invalid_event_references() {
    let csv = tempfile::NamedTempFile::new().unwrap();
    let mut wtr = csv::Writer::from_path(csv.path()).unwrap();
    wtr.write_record(["type", "purchase", "user", "plan", "at"])
        .unwrap();

    // Unknown plan
    wtr.write_record(["create", "p1", "alice", "platinum", "2024-05-01T12:00:00Z"])
        .unwrap();
    // Missing user
    wtr.write_record(["create", "p2", "", "cosmo", "2024-05-01T12:00:00Z"])
        .unwrap();
    // Purchase never created
    wtr.write_record(["pay", "p9", "", "", "2024-05-01T12:01:00Z"])
        .unwrap();
    wtr.write_record(["create", "p3", "bob", "legacy", "2024-05-01T12:02:00Z"])
        .unwrap();
    wtr.flush().unwrap();
    drop(wtr);

    let mut cmd = Command::new(cargo_bin!("pixvip"));
    cmd.arg("simulate").arg(csv.path());

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Unknown plan: platinum"))
        .stderr(predicate::str::contains("unknown purchase p9"))
        .stdout(predicate::str::contains("p3,bob,legacy,79.90,pending,"))
        .stdout(predicate::str::contains("alice").not());
}

#[test]
fn test_oracle_outage_keeps_purchase_pending() {
    let csv = tempfile::NamedTempFile::new().unwrap();
    let mut wtr = csv::Writer::from_path(csv.path()).unwrap();
    wtr.write_record(["type", "purchase", "user", "plan", "at"])
        .unwrap();
    wtr.write_record(["create", "p1", "alice", "cosmo", "2024-05-01T12:00:00Z"])
        .unwrap();
    wtr.write_record(["pay", "p1", "", "", "2024-05-01T12:01:00Z"])
        .unwrap();
    wtr.write_record(["outage", "", "", "", "2024-05-01T12:02:00Z"])
        .unwrap();
    wtr.write_record(["reconcile", "p1", "", "", "2024-05-01T12:03:00Z"])
        .unwrap();
    wtr.flush().unwrap();
    drop(wtr);

    let mut cmd = Command::new(cargo_bin!("pixvip"));
    cmd.arg("simulate").arg(csv.path());

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Confirmation oracle unreachable"))
        .stdout(predicate::str::contains("p1,alice,cosmo,29.90,pending,"));
}
