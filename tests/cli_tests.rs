use assert_cmd::Command;
use predicates::str::contains;

#[test]
fn missing_wizard_prints_usage() {
    Command::cargo_bin("docflow_cli")
        .unwrap()
        .assert()
        .failure()
        .code(2)
        .stderr(contains("Usage: docflow_cli <wizard>"))
        .stderr(contains("approval-group"));
}

#[test]
fn unknown_wizard_is_reported() {
    Command::cargo_bin("docflow_cli")
        .unwrap()
        .arg("payroll")
        .assert()
        .failure()
        .stderr(contains("unknown wizard 'payroll'"));
}

#[test]
fn invalid_document_id_is_reported() {
    Command::cargo_bin("docflow_cli")
        .unwrap()
        .args(["ligne", "--document", "abc"])
        .assert()
        .failure()
        .stderr(contains("invalid document id 'abc'"));
}
