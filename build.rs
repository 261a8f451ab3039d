use std::path::{Path, PathBuf};
use std::process::Command;

const MAX_LINES: usize = 750;

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/main");
    println!("cargo:rerun-if-changed=.git/packed-refs");
    println!("cargo:rerun-if-changed=src");

    let sha = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .and_then(|output| {
            if output.status.success() {
                String::from_utf8(output.stdout)
                    .ok()
                    .map(|s| s.trim().to_string())
            } else {
                None
            }
        })
        .unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=COMPILE_SESSION_GIT_SHA={}", sha);

    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR must be set");
    let root = PathBuf::from(&manifest_dir);
    let mut files = Vec::new();
    collect_rust_files(&root.join("src"), &mut files);

    enforce_line_limits(&root, &files);
    enforce_no_dead_code_allows(&root, &files);
}

fn collect_rust_files(dir: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_rust_files(&path, files);
        } else if path.extension().and_then(|e| e.to_str()) == Some("rs") {
            files.push(path);
        }
    }
}

fn enforce_line_limits(root: &Path, files: &[PathBuf]) {
    let mut violations = Vec::new();
    for file in files {
        let Ok(content) = std::fs::read_to_string(file) else {
            continue;
        };
        let lines = content.lines().filter(|l| !l.trim().is_empty()).count();
        if lines > MAX_LINES {
            let rel_path = file.strip_prefix(root).unwrap_or(file);
            violations.push((rel_path.to_path_buf(), lines));
        }
    }

    if !violations.is_empty() {
        eprintln!("\nFILE LINE LIMIT EXCEEDED (max {} lines)", MAX_LINES);
        for (path, lines) in &violations {
            eprintln!("  {} - {} lines", path.display(), lines);
        }
        eprintln!("Please split these files into smaller modules.\n");
        panic!(
            "Build failed: {} file(s) exceed the {} line limit",
            violations.len(),
            MAX_LINES
        );
    }
}

fn enforce_no_dead_code_allows(root: &Path, files: &[PathBuf]) {
    let mut violations = Vec::new();
    for file in files {
        let Ok(content) = std::fs::read_to_string(file) else {
            continue;
        };
        for (line_num, line) in content.lines().enumerate() {
            let trimmed = line.trim();
            if (trimmed.starts_with("#[allow(") || trimmed.starts_with("#![allow("))
                && trimmed.contains("dead_code")
            {
                let rel_path = file.strip_prefix(root).unwrap_or(file);
                violations.push(format!("{}:{}", rel_path.display(), line_num + 1));
            }
        }
    }

    if !violations.is_empty() {
        eprintln!("\n#[allow(dead_code)] IS NOT ALLOWED");
        for violation in &violations {
            eprintln!("  {}", violation);
        }
        eprintln!("Delete unused code, or gate test-only code with #[cfg(test)].\n");
        panic!(
            "Build failed: {} #[allow(dead_code)] attribute(s) found",
            violations.len()
        );
    }
}
