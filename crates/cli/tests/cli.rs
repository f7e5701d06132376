use assert_cmd::Command;

#[test]
fn help_lists_subcommands() {
    let output = Command::cargo_bin("libris")
        .unwrap()
        .arg("--help")
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    for subcommand in ["serve", "provision", "routes"] {
        assert!(stdout.contains(subcommand), "missing `{subcommand}` in:\n{stdout}");
    }
}

#[test]
fn routes_prints_book_endpoints() {
    let output = Command::cargo_bin("libris")
        .unwrap()
        .arg("routes")
        .env("LIBRIS_CONFIG_DIR", env!("CARGO_MANIFEST_DIR"))
        .env("RUST_LOG", "off")
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("PATCH   /books/Future"));
    assert!(stdout.contains("DELETE  /books/before-year"));
    assert!(stdout.contains("POST    /collection/books/index"));
}

#[test]
fn unknown_subcommand_fails() {
    Command::cargo_bin("libris")
        .unwrap()
        .arg("migrate")
        .assert()
        .failure();
}
