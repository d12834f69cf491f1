// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    // Re-run build script if git HEAD changes
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=VXLIT_VERSION");

    // Packagers may pin the version string explicitly
    let version = match std::env::var("VXLIT_VERSION") {
        Ok(v) => v,
        Err(_) => describe_version(),
    };

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// Version reported by `vxlit --version`.
///
/// "0.1.0-abcdef1" on a tag, "0.1.0-dirty-abcdef1" past a tag, and the bare
/// crate version when git is unavailable (e.g. building from a tarball).
fn describe_version() -> String {
    let pkg_version = std::env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "0.0.0".to_string());

    let Some(described) = git(&["describe", "--tags", "--always", "--match", "v*"]) else {
        return pkg_version;
    };
    let described = described.strip_prefix('v').unwrap_or(&described).to_string();

    let Some(hash) = git(&["rev-parse", "--short", "HEAD"]) else {
        return pkg_version;
    };

    // No tag reachable: describe falls back to the bare hash
    if described == hash {
        return format!("{}-{}", pkg_version, hash);
    }

    let parts: Vec<&str> = described.rsplitn(3, '-').collect();
    if parts.len() >= 3 {
        format!("{}-dirty-{}", parts[2], hash)
    } else {
        format!("{}-{}", described, hash)
    }
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;

    if output.status.success() {
        Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        None
    }
}
