use std::path::{Path, PathBuf};
use std::process::{Command, Output};

pub fn bin_path() -> PathBuf {
    let env_keys = ["CARGO_BIN_EXE_fmcsync", "CARGO_BIN_EXE_fmcsync-cli"];
    for key in env_keys {
        if let Ok(value) = std::env::var(key) {
            return PathBuf::from(value);
        }
    }
    let target_dir = std::env::var("CARGO_TARGET_DIR")
        .ok()
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            Path::new(env!("CARGO_MANIFEST_DIR"))
                .join("..")
                .join("..")
                .join("target")
        });
    target_dir.join("debug").join("fmcsync")
}

/// command for the cli binary pointed at a mock fmc.
pub fn fmcsync(base_url: &str, state: &Path) -> Command {
    let mut cmd = Command::new(bin_path());
    cmd.env("FMC_URL", base_url)
        .env("FMC_USERNAME", "admin")
        .env("FMC_PASSWORD", "secret")
        .env_remove("FMC_INSECURE")
        .env_remove("RUST_LOG")
        .arg("--state")
        .arg(state);
    cmd
}

pub fn run_command(mut command: Command, context: &str) -> String {
    let output = command.output().unwrap_or_else(|err| {
        panic!("{context}: failed to start command: {err}");
    });
    if !output.status.success() {
        panic!(
            "{context}: command failed\nstdout:\n{}\nstderr:\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
    }
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn run_failing(mut command: Command, context: &str) -> Output {
    let output = command.output().unwrap_or_else(|err| {
        panic!("{context}: failed to start command: {err}");
    });
    assert!(
        !output.status.success(),
        "{context}: command unexpectedly succeeded\nstdout:\n{}",
        String::from_utf8_lossy(&output.stdout)
    );
    output
}
