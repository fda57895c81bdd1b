use std::path::{Path, PathBuf};
use std::process::Command;

const MAX_LINES: usize = 750;

const CHECKED_EXTENSIONS: &[&str] = &["rs", "md", "yaml", "toml"];

const EXCLUDED_DIRS: &[&str] = &["target", ".git", "examples"];

const EXCLUDED_FILES: &[&str] = &["Cargo.lock", "spec.md", "SPEC_FULL.md"];

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=src");

    let sha = git_output(&["rev-parse", "--short", "HEAD"]).unwrap_or_else(|| "unknown".to_string());
    println!("cargo:rustc-env=ORCHESTRATOR_GIT_SHA={}", sha);

    let root = PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR must be set"));
    let mut files = Vec::new();
    walk_directory(&root, &root, &mut files);

    enforce_line_limits(&root, &files);
    enforce_no_dead_code_allows(&root, &files);
}

fn git_output(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    String::from_utf8(output.stdout)
        .ok()
        .map(|s| s.trim().to_string())
}

fn walk_directory(dir: &Path, root: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        if path.is_dir() {
            if !EXCLUDED_DIRS.contains(&name.as_str()) {
                walk_directory(&path, root, files);
            }
            continue;
        }

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
        let is_root_file = path.parent() == Some(root);
        if CHECKED_EXTENSIONS.contains(&ext)
            && !(is_root_file && EXCLUDED_FILES.contains(&name.as_str()))
        {
            files.push(path);
        }
    }
}

/// Keeps every source and doc file under the line budget (non-empty lines).
fn enforce_line_limits(root: &Path, files: &[PathBuf]) {
    let violations: Vec<(PathBuf, usize)> = files
        .iter()
        .filter_map(|file| {
            let content = std::fs::read_to_string(file).ok()?;
            let count = content.lines().filter(|l| !l.trim().is_empty()).count();
            (count > MAX_LINES).then(|| (file.strip_prefix(root).unwrap_or(file).to_path_buf(), count))
        })
        .collect();

    if violations.is_empty() {
        return;
    }

    eprintln!("\nFILE LINE LIMIT EXCEEDED (max {} lines)", MAX_LINES);
    for (path, lines) in &violations {
        eprintln!("  {} - {} lines", path.display(), lines);
    }
    panic!(
        "Build failed: {} file(s) exceed the {} line limit",
        violations.len(),
        MAX_LINES
    );
}

/// Dead code gets deleted, not silenced.
fn enforce_no_dead_code_allows(root: &Path, files: &[PathBuf]) {
    let mut violations = Vec::new();

    for file in files.iter().filter(|p| {
        p.extension().and_then(|e| e.to_str()) == Some("rs")
            && p.file_name().and_then(|n| n.to_str()) != Some("build.rs")
    }) {
        let Ok(content) = std::fs::read_to_string(file) else {
            continue;
        };
        for (line_num, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if (trimmed.starts_with("#[allow(") || trimmed.starts_with("#![allow("))
                && trimmed.contains("dead_code")
            {
                let rel = file.strip_prefix(root).unwrap_or(file);
                violations.push(format!("{}:{}", rel.display(), line_num + 1));
            }
        }
    }

    if !violations.is_empty() {
        eprintln!("\n#[allow(dead_code)] IS NOT ALLOWED");
        for v in &violations {
            eprintln!("  {}", v);
        }
        panic!(
            "Build failed: {} #[allow(dead_code)] occurrence(s) found. Remove the dead code.",
            violations.len()
        );
    }
}
