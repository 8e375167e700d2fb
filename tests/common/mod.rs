//! Shared helpers: ripgrep-style JSON fixtures and fake tool scripts.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use serde_json::json;

/// One file's worth of matches: path and `(line, text)` pairs.
pub type FileMatches<'a> = (&'a str, &'a [(u64, &'a str)]);

/// Build ripgrep `--json` output for the given files, summary included.
pub fn rg_json(files: &[FileMatches<'_>]) -> String {
    let mut lines = Vec::new();
    let mut total = 0u64;

    for (path, matches) in files {
        lines.push(json!({"type": "begin", "data": {"path": {"text": path}}}).to_string());
        for (line, text) in *matches {
            lines.push(
                json!({
                    "type": "match",
                    "data": {
                        "path": {"text": path},
                        "lines": {"text": format!("{text}\n")},
                        "line_number": line,
                        "absolute_offset": 0,
                        "submatches": []
                    }
                })
                .to_string(),
            );
        }
        let count = matches.len() as u64;
        total += count;
        lines.push(
            json!({
                "type": "end",
                "data": {
                    "path": {"text": path},
                    "binary_offset": null,
                    "stats": {
                        "elapsed": {"secs": 0, "nanos": 1000, "human": "0.000001s"},
                        "matched_lines": count,
                        "matches": count
                    }
                }
            })
            .to_string(),
        );
    }

    lines.push(
        json!({
            "type": "summary",
            "data": {
                "elapsed_total": {"secs": 0, "nanos": 2000, "human": "0.000002s"},
                "stats": {
                    "matched_lines": total,
                    "searches_with_match": files.len()
                }
            }
        })
        .to_string(),
    );

    lines.join("\n") + "\n"
}

/// Write an executable shell script to `dir/name`.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A tool that prints `output` and exits 0.
#[cfg(unix)]
pub fn fake_rg(dir: &Path, output: &str) -> PathBuf {
    let fixture = dir.join("fixture.json");
    std::fs::write(&fixture, output).unwrap();
    write_script(dir, "fake-rg", &format!("cat '{}'", fixture.display()))
}

/// A tool that never finishes on its own.
#[cfg(unix)]
pub fn sleeping_rg(dir: &Path) -> PathBuf {
    write_script(dir, "sleeping-rg", "exec sleep 30")
}

/// A tool that sleeps when its arguments mention `slow`, otherwise prints
/// `output`.
#[cfg(unix)]
pub fn selective_rg(dir: &Path, output: &str) -> PathBuf {
    let fixture = dir.join("fixture.json");
    std::fs::write(&fixture, output).unwrap();
    write_script(
        dir,
        "selective-rg",
        &format!(
            "case \"$*\" in *slow*) exec sleep 30 ;; esac\ncat '{}'",
            fixture.display()
        ),
    )
}

/// A tool that records its arguments, one per line, in `dir/args.txt`.
#[cfg(unix)]
pub fn recording_rg(dir: &Path, output: &str) -> PathBuf {
    let fixture = dir.join("fixture.json");
    std::fs::write(&fixture, output).unwrap();
    write_script(
        dir,
        "recording-rg",
        &format!(
            "printf '%s\\n' \"$@\" > '{}'\ncat '{}'",
            dir.join("args.txt").display(),
            fixture.display()
        ),
    )
}

/// A tool that prints `keyed` when its arguments mention `keyword`,
/// otherwise `other`.
#[cfg(unix)]
pub fn keyed_rg(dir: &Path, keyword: &str, keyed: &str, other: &str) -> PathBuf {
    let keyed_fixture = dir.join("keyed.json");
    let other_fixture = dir.join("other.json");
    std::fs::write(&keyed_fixture, keyed).unwrap();
    std::fs::write(&other_fixture, other).unwrap();
    write_script(
        dir,
        "keyed-rg",
        &format!(
            "case \"$*\" in *{keyword}*) exec cat '{}' ;; esac\ncat '{}'",
            keyed_fixture.display(),
            other_fixture.display()
        ),
    )
}
