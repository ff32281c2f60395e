//! Captures the git revision of the source tree for provenance records.

use std::fs;
use std::path::Path;
use std::process::Command;

fn main() {
    let revision = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .map(|out| String::from_utf8_lossy(&out.stdout).trim().to_string())
        .filter(|hash| !hash.is_empty());

    match revision {
        Some(hash) => println!("cargo:rustc-env=PRECIP_CLIM_GIT_HASH={hash}"),
        None => println!("cargo:warning=git revision unavailable; provenance will record 'unknown'"),
    }

    // Rebuild when HEAD moves, either by checkout or by a new commit on the branch
    let head = Path::new(".git/HEAD");
    if head.exists() {
        println!("cargo:rerun-if-changed=.git/HEAD");
        if let Ok(contents) = fs::read_to_string(head) {
            if let Some(reference) = contents.trim().strip_prefix("ref: ") {
                let ref_path = Path::new(".git").join(reference);
                if ref_path.exists() {
                    println!("cargo:rerun-if-changed={}", ref_path.display());
                }
            }
        }
        if Path::new(".git/packed-refs").exists() {
            println!("cargo:rerun-if-changed=.git/packed-refs");
        }
    } else {
        println!("cargo:rerun-if-changed=build.rs");
    }
}
