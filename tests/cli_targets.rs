use predicates::prelude::*;

fn pagewatch(data_dir: &std::path::Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("pagewatch");
    cmd.env_remove("SENDGRID_API_KEY")
        .env_remove("PAGEWATCH_SEED_URLS")
        .arg("--data-dir")
        .arg(data_dir);
    cmd
}

#[test]
fn add_list_remove_round_trip() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;

    let output = pagewatch(dir.path())
        .args(["add", "--url", "https://news.example/world/"])
        .assert()
        .success()
        .stdout(predicate::str::contains("https://news.example/world/"))
        .get_output()
        .stdout
        .clone();
    let line = String::from_utf8(output)?;
    let id = line
        .split('\t')
        .next()
        .map(str::to_owned)
        .unwrap_or_default();
    assert!(!id.is_empty());

    pagewatch(dir.path())
        .args(["add", "--url", "https://news.example/world/"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with(id.as_str()));

    pagewatch(dir.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("{id}\thttps://news.example/world/\t-\t-")));

    pagewatch(dir.path())
        .args(["versions", "--id", id.as_str()])
        .assert()
        .success()
        .stdout("");

    pagewatch(dir.path())
        .args(["remove", "--id", id.as_str()])
        .assert()
        .success()
        .stdout(predicate::str::contains("removed"));

    pagewatch(dir.path()).arg("list").assert().success().stdout("");
    Ok(())
}

#[test]
fn add_rejects_non_http_urls() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    pagewatch(dir.path())
        .args(["add", "--url", "ftp://files.example/pub/"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must be http or https"));
    Ok(())
}

#[test]
fn unknown_target_is_an_error() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    pagewatch(dir.path())
        .args(["remove", "--id", "does-not-exist"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("target not found: does-not-exist"));
    pagewatch(dir.path())
        .args(["check", "--id", "does-not-exist"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("target not found"));
    Ok(())
}

#[test]
fn test_notify_without_transport_logs_only() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    pagewatch(dir.path())
        .arg("test-notify")
        .assert()
        .success()
        .stdout("test notification sent\n");
    Ok(())
}

#[test]
fn rust_log_debug_emits_debug_line_to_stderr() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    pagewatch(dir.path())
        .env("RUST_LOG", "debug")
        .arg("list")
        .assert()
        .success()
        .stderr(predicate::str::contains("parsed cli"));
    Ok(())
}

#[test]
fn invalid_numeric_config_fails_fast() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    pagewatch(dir.path())
        .env("PAGEWATCH_TIMEOUT_MS", "soon")
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("PAGEWATCH_TIMEOUT_MS"));
    Ok(())
}
