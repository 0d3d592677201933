// Exit codes of the hashcheck subcommand
// Run with: cargo test --test hashcheck_cli

use std::fs;
use std::process::Command;

fn hashcheck(args: &[&str]) -> i32 {
    Command::new(env!("CARGO_BIN_EXE_arqx"))
        .arg("hashcheck")
        .args(args)
        .output()
        .expect("Failed to run arqx")
        .status
        .code()
        .expect("terminated by signal")
}

#[test]
fn test_hashcheck_exit_codes() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.txt");
    let b = dir.path().join("b.txt");
    let c = dir.path().join("c.txt");
    fs::write(&a, b"identical").unwrap();
    fs::write(&b, b"identical").unwrap();
    fs::write(&c, b"different").unwrap();

    let a = a.to_str().unwrap();
    let b = b.to_str().unwrap();
    let c = c.to_str().unwrap();
    let missing = dir.path().join("missing.txt");

    assert_eq!(hashcheck(&[a, b]), 0);
    assert_eq!(hashcheck(&[a, c]), 1);
    assert_eq!(hashcheck(&[a, c, "--algo", "blake3"]), 1);
    assert_eq!(hashcheck(&[a, b, "--algo", "sha1"]), 0);
    assert_eq!(hashcheck(&[a, missing.to_str().unwrap()]), 2);
}
