//! Resolution of artifact upload rules against a working directory.
//!
//! Rules use ant-style patterns: `*` and `?` match within one path segment,
//! `**` matches any number of segments. A rule may select files and
//! directories. When a selected directory contains other selections only
//! the directory is uploaded.

use gantry_core::plan::ArtifactPlan;
use gantry_core::{Error, Result};
use regex::Regex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One resolved upload: a file or a whole directory and the destination
/// folder it goes to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ArtifactUpload {
    pub source: PathBuf,
    pub dest: String,
    pub is_dir: bool,
}

/// Resolves `plan` under `working_dir`. Selecting nothing is reported as
/// [`Error::ArtifactNoMatch`].
pub fn match_plan(plan: &ArtifactPlan, working_dir: &Path) -> Result<Vec<ArtifactUpload>> {
    let pattern = plan.source_pattern();
    let rule = Rule::parse(pattern)?;
    let selected = rule.select(working_dir);

    if selected.is_empty() {
        return Err(Error::ArtifactNoMatch {
            pattern: pattern.to_string(),
            working_dir: working_dir.to_path_buf(),
        });
    }

    Ok(selected
        .into_iter()
        .map(|relative| {
            let source = working_dir.join(&relative);
            ArtifactUpload {
                is_dir: source.is_dir(),
                dest: destination(plan.dest(), &relative, &rule.base),
                source,
            }
        })
        .collect())
}

struct Rule {
    tokens: Vec<String>,
    /// Leading segments without wildcards, excluding the last segment.
    base: String,
    matcher: Option<Regex>,
}

impl Rule {
    fn parse(pattern: &str) -> Result<Self> {
        let normalized = pattern.replace('\\', "/");
        let mut tokens: Vec<String> = normalized
            .split('/')
            .filter(|t| !t.is_empty() && *t != ".")
            .map(str::to_string)
            .collect();
        if normalized.ends_with('/') {
            tokens.push("**".to_string());
        }

        let base = match tokens.split_last() {
            Some((_, leading)) => leading
                .iter()
                .take_while(|t| !has_wildcard(t))
                .cloned()
                .collect::<Vec<_>>()
                .join("/"),
            None => String::new(),
        };

        let matcher = if tokens.iter().any(|t| has_wildcard(t)) {
            let regex = Regex::new(&to_regex(&tokens))
                .map_err(|e| Error::Internal(format!("Invalid artifact pattern {}: {}", pattern, e)))?;
            Some(regex)
        } else {
            None
        };

        Ok(Self {
            tokens,
            base,
            matcher,
        })
    }

    /// Relative paths selected under `root`, in path order.
    fn select(&self, root: &Path) -> Vec<String> {
        if self.tokens.is_empty() {
            return vec![];
        }

        let Some(matcher) = &self.matcher else {
            let literal = self.tokens.join("/");
            return if root.join(&literal).exists() {
                vec![literal]
            } else {
                vec![]
            };
        };

        let start = root.join(&self.base);
        if !start.is_dir() {
            return vec![];
        }

        let mut files = BTreeSet::new();
        let mut dirs = BTreeSet::new();
        for entry in WalkDir::new(&start)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let Some(relative) = relative_path(root, entry.path()) else {
                continue;
            };
            if matcher.is_match(&format!("{}/", relative)) {
                if entry.file_type().is_dir() {
                    dirs.insert(relative);
                } else {
                    files.insert(relative);
                }
            }
        }

        collapse(&files, &dirs)
    }
}

/// Folds matched files into their matched parent directory, keeps matched
/// directories whose contents were not selected individually, then drops
/// anything that sits inside another selected directory.
fn collapse(files: &BTreeSet<String>, dirs: &BTreeSet<String>) -> Vec<String> {
    let mut selected = BTreeSet::new();

    for file in files {
        match parent(file) {
            Some(dir) if dirs.contains(dir) => selected.insert(dir.to_string()),
            _ => selected.insert(file.clone()),
        };
    }

    for dir in dirs {
        let prefix = format!("{}/", dir);
        let has_selected_contents = files
            .iter()
            .chain(dirs.iter())
            .any(|p| p.starts_with(&prefix));
        if !has_selected_contents {
            selected.insert(dir.clone());
        }
    }

    selected
        .iter()
        .filter(|path| {
            !selected
                .iter()
                .any(|other| dirs.contains(other) && path.starts_with(&format!("{}/", other)))
        })
        .cloned()
        .collect()
}

fn has_wildcard(token: &str) -> bool {
    token.contains('*') || token.contains('?')
}

/// Anchored regex over a relative path with a trailing `/`.
fn to_regex(tokens: &[String]) -> String {
    let mut regex = String::from("^");
    for token in tokens {
        if token == "**" {
            regex.push_str("(?:[^/]+/)*");
            continue;
        }
        for c in token.chars() {
            match c {
                '*' => regex.push_str("[^/]*"),
                '?' => regex.push_str("[^/]"),
                c => regex.push_str(&regex::escape(&c.to_string())),
            }
        }
        regex.push('/');
    }
    regex.push('$');
    regex
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

fn parent(path: &str) -> Option<&str> {
    path.rsplit_once('/').map(|(dir, _)| dir)
}

/// `dest` joined with the selection's parent, relative to the rule's base.
fn destination(dest: &str, relative: &str, base: &str) -> String {
    let parent = parent(relative).unwrap_or("");
    let sub = if base.is_empty() {
        parent
    } else {
        parent
            .strip_prefix(base)
            .map(|s| s.trim_start_matches('/'))
            .unwrap_or(parent)
    };

    match (dest.is_empty(), sub.is_empty()) {
        (_, true) => dest.to_string(),
        (true, false) => sub.to_string(),
        (false, false) => format!("{}/{}", dest.trim_end_matches('/'), sub),
    }
}
