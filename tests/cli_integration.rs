//! CLI integration tests
//!
//! Tests the command-line interface end-to-end.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

/// Run blockchurn with the secret piped through stdin
fn run_with_secret(args: &[&str], secret: &[u8]) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_blockchurn"))
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn blockchurn");

    {
        let mut stdin = child.stdin.take().expect("failed to open stdin");
        // Ignore BrokenPipe errors - the command may exit before reading stdin
        // if it encounters an error (e.g., file not found)
        let _ = stdin.write_all(secret);
    }

    child.wait_with_output().expect("failed to wait for blockchurn")
}

fn assert_success(output: &Output, what: &str) {
    assert!(
        output.status.success(),
        "{} failed: {}",
        what,
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Paths printed on stdout, one per churned file
fn printed_paths(output: &Output) -> Vec<PathBuf> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(PathBuf::from)
        .collect()
}

fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_encrypt_decrypt_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let plaintext = temp_dir.path().join("hello.txt");
    fs::write(&plaintext, "Hello, world!\n").unwrap();

    let result = run_with_secret(&["encrypt", arg(&plaintext)], b"test");
    assert_success(&result, "encrypt");
    let encrypted = printed_paths(&result).remove(0);
    assert!(encrypted.to_str().unwrap().ends_with(".txt.enc"));
    assert!(!plaintext.exists());

    let result = run_with_secret(&["decrypt", arg(&encrypted)], b"test");
    assert_success(&result, "decrypt");
    let decrypted = printed_paths(&result).remove(0);
    assert_eq!(fs::read_to_string(&decrypted).unwrap(), "Hello, world!\n");
    assert!(!encrypted.exists());
}

#[test]
fn test_secret_file() {
    let temp_dir = TempDir::new().unwrap();
    let key = temp_dir.path().join("key.bin");
    let plaintext = temp_dir.path().join("notes.md");
    fs::write(&key, [0xffu8, 0x00, 0x13, 0x37]).unwrap();
    fs::write(&plaintext, "# notes").unwrap();

    let result = run_with_secret(
        &["--secret-file", arg(&key), "encrypt", "--keep-source", arg(&plaintext)],
        b"",
    );
    assert_success(&result, "encrypt");
    let encrypted = printed_paths(&result).remove(0);

    let restored = temp_dir.path().join("restored.md");
    let result = run_with_secret(
        &[
            "decrypt",
            "--secret-file",
            arg(&key),
            "--target-name",
            "restored.md",
            arg(&encrypted),
        ],
        b"",
    );
    assert_success(&result, "decrypt");
    assert_eq!(fs::read_to_string(&restored).unwrap(), "# notes");
}

#[test]
fn test_wrong_secret_fails() {
    let temp_dir = TempDir::new().unwrap();
    let plaintext = temp_dir.path().join("secret.txt");
    fs::write(&plaintext, "Original").unwrap();

    let result = run_with_secret(&["encrypt", arg(&plaintext)], b"correct_secret");
    assert_success(&result, "encrypt");
    let encrypted = printed_paths(&result).remove(0);

    let result = run_with_secret(&["decrypt", arg(&encrypted)], b"wrong_secret");
    assert_eq!(result.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&result.stderr);
    assert!(
        stderr.starts_with("Error: failed to decrypt"),
        "Expected error message about decryption, got: {}",
        stderr
    );
    assert!(stderr.contains("wrong secret"), "got: {}", stderr);

    // Nothing but the untouched container is left behind.
    let entries: Vec<_> = fs::read_dir(temp_dir.path()).unwrap().collect();
    assert_eq!(entries.len(), 1);
    assert!(encrypted.exists());
}

#[test]
fn test_decrypt_nonexistent_file_fails() {
    let temp_dir = TempDir::new().unwrap();
    let nonexistent = temp_dir.path().join("nonexistent.enc");

    let result = run_with_secret(&["decrypt", arg(&nonexistent)], b"test");
    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stderr).contains("does not exist"));
}

#[test]
fn test_empty_secret_fails() {
    let temp_dir = TempDir::new().unwrap();
    let plaintext = temp_dir.path().join("plain.txt");
    fs::write(&plaintext, "content").unwrap();

    let result = run_with_secret(&["encrypt", arg(&plaintext)], b"");
    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stderr).contains("secret is empty"));
    assert!(plaintext.exists());
}

#[test]
fn test_auth_file_and_skip_auth() {
    let temp_dir = TempDir::new().unwrap();
    let plaintext = temp_dir.path().join("data.bin");
    let content: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
    fs::write(&plaintext, &content).unwrap();

    let result = run_with_secret(&["encrypt", "--auth-file", "--ccm", arg(&plaintext)], b"test");
    assert_success(&result, "encrypt");
    let encrypted = printed_paths(&result).remove(0);
    let mut tag_file = encrypted.clone().into_os_string();
    tag_file.push(".gmac");
    assert!(Path::new(&tag_file).exists());

    // Without the side file only an unauthenticated decrypt is possible.
    fs::remove_file(&tag_file).unwrap();
    let result = run_with_secret(
        &["decrypt", "--auth-file", "--ccm", "--keep-source", arg(&encrypted)],
        b"test",
    );
    assert!(!result.status.success());

    let result = run_with_secret(
        &["decrypt", "--auth-file", "--ccm", "--skip-auth", arg(&encrypted)],
        b"test",
    );
    assert_success(&result, "decrypt");
    let decrypted = printed_paths(&result).remove(0);
    assert_eq!(fs::read(&decrypted).unwrap(), content);
}

#[test]
fn test_directory_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let nested = temp_dir.path().join("sub");
    fs::create_dir(&nested).unwrap();
    fs::write(temp_dir.path().join("a.txt"), "alpha").unwrap();
    fs::write(nested.join("b.txt"), "beta").unwrap();

    let result = run_with_secret(&["encrypt", "--shallow", arg(temp_dir.path())], b"test");
    assert_success(&result, "shallow encrypt");
    assert_eq!(printed_paths(&result).len(), 1);
    assert!(nested.join("b.txt").exists());

    let result = run_with_secret(&["encrypt", arg(temp_dir.path())], b"test");
    assert_success(&result, "encrypt");
    assert!(!nested.join("b.txt").exists());

    let result = run_with_secret(&["decrypt", arg(temp_dir.path())], b"test");
    assert_success(&result, "decrypt");
    let mut contents: Vec<String> = printed_paths(&result)
        .iter()
        .map(|path| fs::read_to_string(path).unwrap())
        .collect();
    contents.sort();
    assert_eq!(contents, vec!["alpha".to_string(), "beta".to_string()]);
}

#[test]
fn test_target_name_rejected_for_directories() {
    let temp_dir = TempDir::new().unwrap();
    let result = run_with_secret(
        &["encrypt", "--target-name", "x.enc", arg(temp_dir.path())],
        b"test",
    );
    assert!(!result.status.success());
    assert!(String::from_utf8_lossy(&result.stderr).contains("--target-name"));
}

#[test]
fn test_large_file_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let plaintext = temp_dir.path().join("large.txt");
    let large_content = vec![0x42u8; 1024 * 1024 + 17];
    fs::write(&plaintext, &large_content).unwrap();

    let result = run_with_secret(&["encrypt", arg(&plaintext)], b"test");
    assert_success(&result, "encrypt");
    let encrypted = printed_paths(&result).remove(0);
    // 33 blocks, each with a 16-byte tag, plus the 32-byte pepper.
    assert_eq!(
        fs::metadata(&encrypted).unwrap().len(),
        large_content.len() as u64 + 33 * 16 + 32
    );

    let result = run_with_secret(&["decrypt", arg(&encrypted)], b"test");
    assert_success(&result, "decrypt");
    let decrypted = printed_paths(&result).remove(0);
    assert_eq!(fs::read(&decrypted).unwrap(), large_content);
}

#[test]
fn test_fingerprint() {
    let temp_dir = TempDir::new().unwrap();
    let file = temp_dir.path().join("big.bin");
    fs::write(&file, vec![7u8; 300_000]).unwrap();

    let result = run_with_secret(&["fingerprint", arg(&file)], b"");
    assert_success(&result, "fingerprint");
    let hex = String::from_utf8(result.stdout.clone()).unwrap();
    assert_eq!(hex.trim().len(), 64);

    let again = run_with_secret(&["fingerprint", arg(&file)], b"");
    assert_eq!(again.stdout, result.stdout);

    let result = run_with_secret(
        &["fingerprint", "--algo", "sha512", "--codec", "base64", arg(&file)],
        b"",
    );
    assert_success(&result, "fingerprint");
    assert_eq!(String::from_utf8(result.stdout).unwrap().trim().len(), 88);
    assert!(file.exists());
}
