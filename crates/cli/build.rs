// Note to developers extending/debugging this file: When this file throws
// errors or warnings, `cargo -vv build` does not show the output of the
// `println!`s of this file. Resolve all warnings first, trigger a re-build
// (e.g. `touch build.rs`), and run `cargo -vv build` again.

#![allow(clippy::disallowed_macros, reason = "we're not printing in color")]

use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::{Command, Output};

fn strip_newline(s: String) -> String {
    s.strip_suffix("\n").unwrap_or(&s).into()
}

fn run_cmd<I, S>(cmd: &str, args: I) -> Option<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(cmd).args(args).output().ok()
}

fn run_cmd_strip<I, S>(cmd: &str, args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    run_cmd(cmd, args)
        .map(|out| strip_newline(String::from_utf8_lossy(&out.stdout).into_owned()))
        .unwrap_or_default()
}

fn main() {
    // The version reported by '--version' names the commit it was built
    // from, if the sources are a git checkout.
    let in_worktree = run_cmd("git", ["rev-parse", "--is-inside-work-tree"])
        .is_some_and(|out| out.status.success());
    if !in_worktree {
        println!("cargo::rerun-if-changed=../../.git");
        print_version(concat!(env!("CARGO_PKG_VERSION"), " at ", "no-git"));
        return;
    }

    let git_root = run_cmd_strip("git", ["rev-parse", "--show-toplevel"]);
    generate_project_rerun_with_prefix(
        &git_root,
        &["Cargo.lock", "Cargo.toml", "crates/", "etc/", "src/"],
    );

    let git_dir = run_cmd_strip("git", ["rev-parse", "--git-dir"]);
    generate_project_rerun_with_prefix(&git_dir, &["HEAD"]);
    if let Some(head) = run_cmd("git", ["symbolic-ref", "HEAD"]).filter(|o| o.status.success()) {
        let head_ref = strip_newline(String::from_utf8_lossy(&head.stdout).into_owned());
        let common_dir = run_cmd_strip("git", ["rev-parse", "--git-common-dir"]);
        generate_project_rerun_with_prefix(&common_dir, &[&head_ref]);
    }

    let mut git_hash = run_cmd_strip("git", ["rev-parse", "--short", "HEAD"]);
    let is_dirty = run_cmd("git", ["diff-index", "--quiet", "HEAD"])
        .is_some_and(|out| !out.status.success());
    if is_dirty {
        git_hash.push_str("-dirty");
    }
    print_version(&format!("{} at {}", env!("CARGO_PKG_VERSION"), git_hash));
}

fn print_version(s: &str) {
    println!("cargo::rustc-env=DNSMANAGER_BUILD_VERSION={s}");
}

fn generate_project_rerun_with_prefix(prefix: &str, paths: &[&str]) {
    for path in paths {
        let mut p = PathBuf::from(prefix);
        p.push(path);
        if p.exists() {
            // https://doc.rust-lang.org/cargo/reference/build-scripts.html#change-detection
            println!("cargo::rerun-if-changed={prefix}/{path}");
        } else {
            println!(
                "cargo::warning=File {path} does not exist but was expected for the rerun check"
            );
        }
    }
}
