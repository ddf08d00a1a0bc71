use std::collections::BTreeSet;

use crate::config::Config;

/// Changed file paths for a diff range, e.g. `main...HEAD`.
pub fn git_diff(range: &str) -> Result<Vec<String>, String> {
	let output = std::process::Command::new("git")
		.args(["diff", "--name-only", range])
		.output()
		.map_err(|e| format!("failed to run git: {}", e))?;

	if !output.status.success() {
		let stderr = String::from_utf8_lossy(&output.stderr);
		return Err(format!("git diff {} failed: {}", range, stderr.trim()));
	}

	let stdout = String::from_utf8_lossy(&output.stdout);
	Ok(stdout.lines().filter(|l| !l.is_empty()).map(str::to_string).collect())
}

/// Services whose working directory appears in any of the changed paths.
///
/// The match is plain substring containment, not path-boundary aware:
/// `services/api` also matches paths under `services/api-gateway`.
pub fn changed_services(config: &Config, changed: &[String]) -> BTreeSet<String> {
	let mut names = BTreeSet::new();
	for path in changed {
		for (name, spec) in &config.services {
			if path.contains(&*spec.chdir.to_string_lossy()) {
				names.insert(name.clone());
			}
		}
	}
	names
}
