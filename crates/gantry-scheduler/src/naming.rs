//! Instance naming for jobs that expand into several instances.

use regex::Regex;
use std::sync::LazyLock;

static EXPANDED_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<job>.+)-(?P<kind>runOnAll|runInstance)-(?P<index>\d+)$")
        .expect("expanded job name pattern is valid")
});

pub fn run_on_all_name(job_name: &str, index: usize) -> String {
    format!("{}-runOnAll-{}", job_name, index)
}

pub fn run_instance_name(job_name: &str, index: u32) -> String {
    format!("{}-runInstance-{}", job_name, index)
}

/// Name of the job configuration an instance was expanded from.
pub fn config_name(instance_name: &str) -> &str {
    EXPANDED_NAME
        .captures(instance_name)
        .and_then(|c| c.name("job"))
        .map_or(instance_name, |m| m.as_str())
}

/// 1-based index of a run-multiple-instance instance.
pub fn run_instance_index(instance_name: &str) -> Option<u32> {
    let captures = EXPANDED_NAME.captures(instance_name)?;
    if &captures["kind"] != "runInstance" {
        return None;
    }
    captures["index"].parse().ok()
}
