use std::io::Write;

use assert_cmd::Command;
use predicates as pred;
use tempfile::NamedTempFile;

fn commands(rows: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    writeln!(
        file,
        "type,owner,peer,currency,amount,target_currency,target_amount,channel,reference\n{rows}"
    )
    .unwrap();
    file
}

#[test]
fn end_to_end_outputs_expected_balances() {
    // alice sends 30 USD through xavier, then pays bob 10 USD.
    // yara cannot cover the transfer, and the oversized pay is rejected.
    let file = commands(
        "user, alice,, USD, 100,,,,\n\
         user, bob,, NGN, 0,,,,\n\
         agent, xavier,, USD, 40,,,,\n\
         agent, yara,, USD, 20,,,,\n\
         transfer, alice,, USD, 30, NGN, 45000, bank, t1\n\
         match,,,,,,,, t1\n\
         complete,,,,,,,, t1\n\
         pay, alice, bob, USD, 10,,,,\n\
         pay, alice, bob, USD, 1000,,,,",
    );

    let exe = env!("CARGO_BIN_EXE_purse_engine");
    let mut cmd = Command::new(exe);
    cmd.arg(file.path());

    cmd.assert()
        .success()
        .stdout(pred::str::contains(
            "owner,role,currency,available,pending,total_volume,active",
        ))
        .stdout(pred::str::contains("alice,user,USD,60.0000,0.0000,40.0000,true"))
        .stdout(pred::str::contains("bob,user,NGN,0.0000,0.0000,0.0000,true"))
        .stdout(pred::str::contains("bob,user,USD,10.0000,0.0000,10.0000,true"))
        .stdout(pred::str::contains("xavier,agent,USD,70.0000,0.0000,30.0000,true"))
        .stdout(pred::str::contains("yara,agent,USD,20.0000,0.0000,0.0000,true"))
        .stderr(pred::str::contains("insufficient funds for alice"));
}

#[test]
fn unknown_rows_are_reported_and_skipped() {
    let file = commands(
        "user, alice,, USD, 5,,,,\n\
         refund, alice,, USD, 5,,,,\n\
         complete,,,,,,,, nope",
    );

    let mut cmd = Command::new(env!("CARGO_BIN_EXE_purse_engine"));
    cmd.arg(file.path());

    cmd.assert()
        .success()
        .stdout(pred::str::contains("alice,user,USD,5.0000,0.0000,0.0000,true"))
        .stderr(pred::str::contains("Invalid command type: refund"))
        .stderr(pred::str::contains("unknown transaction reference: nope"));
}

#[test]
fn settings_file_selects_match_policy() {
    // first_found takes xavier even though yara has no pending exposure.
    let file = commands(
        "user, alice,, USD, 100,,,,\n\
         agent, xavier,, USD, 50,,,,\n\
         agent, yara,, USD, 50,,,,\n\
         transfer, alice,, USD, 10, NGN, 15000, bank, t1\n\
         transfer, alice,, USD, 10, NGN, 15000, bank, t2\n\
         match,,,,,,,, t1\n\
         match,,,,,,,, t2",
    );
    let mut settings = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("create settings file");
    writeln!(settings, "[matching]\npolicy = \"first_found\"").unwrap();

    let mut cmd = Command::new(env!("CARGO_BIN_EXE_purse_engine"));
    cmd.arg(file.path()).arg(settings.path());

    cmd.assert()
        .success()
        .stdout(pred::str::contains("xavier,agent,USD,30.0000,20.0000,0.0000,true"))
        .stdout(pred::str::contains("yara,agent,USD,50.0000,0.0000,0.0000,true"));
}

#[test]
fn missing_input_fails_with_usage() {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_purse_engine"));

    cmd.assert()
        .failure()
        .stderr(pred::str::contains("usage: purse_engine"));
}
