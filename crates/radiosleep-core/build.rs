use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

/// Short HEAD hash, with `-dirty` appended when the work tree has changes.
fn git_describe() -> Option<String> {
    let run = |args: &[&str]| {
        Command::new("git")
            .args(args)
            .output()
            .ok()
            .filter(|o| o.status.success())
            .and_then(|o| String::from_utf8(o.stdout).ok())
    };

    let hash = run(&["rev-parse", "--short", "HEAD"])?;
    let dirty = run(&["status", "--porcelain", "--untracked-files=no"])
        .is_some_and(|s| !s.trim().is_empty());
    Some(format!("{}{}", hash.trim(), if dirty { "-dirty" } else { "" }))
}

fn main() {
    let git_hash = git_describe().unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=RADIOSLEEP_GIT_HASH={git_hash}");

    let built_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    println!("cargo:rustc-env=RADIOSLEEP_BUILD_TIMESTAMP={built_at}");

    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    println!("cargo:rustc-env=RADIOSLEEP_BUILD_PROFILE={profile}");

    println!("cargo:rerun-if-changed=../../.git/HEAD");
    println!("cargo:rerun-if-changed=../../.git/refs");
}
