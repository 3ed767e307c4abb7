//! Agent matching for job resource requirements.

use gantry_core::agent::Agent;

/// Enabled agents carrying all `resources`, in pool order. When an
/// environment is given only its members qualify.
pub fn find_matching<'a>(
    agents: &'a [Agent],
    resources: &[String],
    environment: Option<&str>,
) -> Vec<&'a Agent> {
    agents
        .iter()
        .filter(|a| a.is_enabled())
        .filter(|a| a.has_all_resources(resources))
        .filter(|a| match environment {
            Some(env) => a.environments.iter().any(|e| e.eq_ignore_ascii_case(env)),
            None => true,
        })
        .collect()
}
