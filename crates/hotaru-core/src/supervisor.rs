use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use notify::event::{EventKind, ModifyKind};
use notify::Event;
use tokio::process::{Child, Command};
use tokio::sync::RwLock;

use crate::config::{Config, ServiceSpec};
use crate::output;
use crate::watch::{Batcher, DEFAULT_DEBOUNCE};

/// Drives every selected service through build → spawn → watch and, on a
/// change batch, kill → rebuild → respawn.
///
/// The configuration is immutable and shared read-only; mutable runtime
/// state (the live child handle, the registered watch directories) lives in
/// a separate registry behind a lock. Each watched service gets one task
/// that owns its restart sequence, so restart cycles for different services
/// run independently while a single service never overlaps with itself.
pub struct Supervisor {
	config: Config,
	debounce: Duration,
	runtime: Arc<RwLock<HashMap<String, ServiceRuntime>>>,
}

#[derive(Default)]
struct ServiceRuntime {
	child: Option<Child>,
	watch_dirs: Vec<PathBuf>,
}

impl Supervisor {
	pub fn new(config: Config) -> Arc<Self> {
		Self::with_debounce(config, DEFAULT_DEBOUNCE)
	}

	/// Like [`Supervisor::new`] with an explicit debounce window.
	pub fn with_debounce(config: Config, debounce: Duration) -> Arc<Self> {
		Arc::new(Self {
			config,
			debounce,
			runtime: Arc::new(RwLock::new(HashMap::new())),
		})
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Start the named services (all of them when the list is empty).
	/// Unless `detach` is set, block until SIGINT/SIGTERM and stop the same
	/// selection again. With `detach` the call returns as soon as the
	/// services are up; spawned processes outlive the caller, watchers die
	/// with it.
	pub async fn run(self: &Arc<Self>, names: &[String], detach: bool) -> Result<(), String> {
		let selected = self.config.resolve_names(names)?;

		for name in &selected {
			let Some(spec) = self.config.services.get(name) else { continue };
			let spec = spec.clone();
			self.start_service(name, &spec).await;
		}

		if detach {
			return Ok(());
		}

		wait_for_signal().await;
		self.stop_selected(&selected).await;
		Ok(())
	}

	/// Stop the named services (all of them when the list is empty) and run
	/// their cleanup commands.
	pub async fn stop(self: &Arc<Self>, names: &[String]) -> Result<(), String> {
		let selected = self.config.resolve_names(names)?;
		self.stop_selected(&selected).await;
		Ok(())
	}

	/// Run the packaging command of every selected service that has one.
	pub async fn pack(self: &Arc<Self>, names: &[String]) -> Result<(), String> {
		let selected = self.config.resolve_names(names)?;
		for name in &selected {
			let Some(spec) = self.config.services.get(name) else { continue };
			if let Some(cmd) = &spec.pack {
				println!("[pack] {}", name);
				run_reported("pack", name, cmd, &spec.chdir).await;
			}
		}
		Ok(())
	}

	/// Directories registered with the watcher for a service; empty for
	/// services that are not watched (or not started yet).
	pub async fn watched_dirs(&self, name: &str) -> Vec<PathBuf> {
		let runtime = self.runtime.read().await;
		runtime
			.get(name)
			.map(|state| state.watch_dirs.clone())
			.unwrap_or_default()
	}

	/// Names of services whose spawned process is still alive, sorted.
	pub async fn running(&self) -> Vec<String> {
		let mut runtime = self.runtime.write().await;
		let mut names: Vec<String> = Vec::new();
		for (name, state) in runtime.iter_mut() {
			if let Some(child) = state.child.as_mut() {
				if matches!(child.try_wait(), Ok(None)) {
					names.push(name.clone());
				}
			}
		}
		names.sort();
		names
	}

	async fn stop_selected(&self, names: &[String]) {
		for name in names {
			let Some(spec) = self.config.services.get(name) else { continue };
			self.kill_service(name, spec, true).await;
		}
	}

	async fn start_service(self: &Arc<Self>, name: &str, spec: &ServiceSpec) {
		self.runtime.write().await.entry(name.to_string()).or_default();

		if spec.build.is_some() {
			self.build(name, spec).await;
		}
		if spec.start.is_some() {
			self.spawn(name, spec).await;
		}
		if spec.watch {
			self.watch(name, spec).await;
		}
	}

	async fn build(&self, name: &str, spec: &ServiceSpec) {
		let Some(cmd) = &spec.build else { return };
		println!("[build] {}", name);
		run_reported("build", name, cmd, &spec.chdir).await;
	}

	async fn spawn(self: &Arc<Self>, name: &str, spec: &ServiceSpec) {
		let Some(cmd) = &spec.start else { return };
		println!("[start] {}", name);

		let mut command = Command::new("sh");
		command
			.args(["-c", cmd])
			.current_dir(&spec.chdir)
			.stdout(Stdio::inherit())
			.stderr(Stdio::piped())
			.process_group(0);

		match command.spawn() {
			Ok(mut child) => {
				if let Some(stderr) = child.stderr.take() {
					output::relay_stderr(name.to_string(), stderr);
				}
				let mut runtime = self.runtime.write().await;
				runtime.entry(name.to_string()).or_default().child = Some(child);
			}
			Err(e) => println!("[start] {}: {}", name, e),
		}
	}

	/// Kill the live process, if any. With no live handle this is a no-op,
	/// cleanup included. `run_clean` is false on change-triggered restarts
	/// and true on explicit stops.
	async fn kill_service(&self, name: &str, spec: &ServiceSpec, run_clean: bool) {
		let child = {
			let mut runtime = self.runtime.write().await;
			runtime.get_mut(name).and_then(|state| state.child.take())
		};
		let Some(mut child) = child else { return };

		println!("[kill] {}", name);
		if let Err(e) = kill_group(&child) {
			println!("[kill] {}: {}", name, e);
		}
		let _ = child.wait().await;

		if !run_clean {
			return;
		}
		let Some(clean) = &spec.clean else { return };

		println!("[clean] {}", name);
		let mut parts = clean.split_whitespace();
		let Some(program) = parts.next() else { return };
		let result = Command::new(program)
			.args(parts)
			.current_dir(&spec.chdir)
			.output()
			.await;
		report_output("clean", name, result);
	}

	async fn watch(self: &Arc<Self>, name: &str, spec: &ServiceSpec) {
		let mut batcher = match Batcher::new(self.debounce) {
			Ok(batcher) => batcher,
			Err(e) => {
				println!("[watch] {}: {}", name, e);
				return;
			}
		};

		let mut dirs: Vec<PathBuf> = Vec::new();
		collect_dirs(&spec.chdir, &mut dirs);

		let extra: Vec<&PathBuf> = spec
			.watch_dirs
			.iter()
			.chain(self.config.watch_dirs.iter())
			.collect();
		if extra.is_empty() {
			println!("[watch] {}", name);
		} else {
			let listed: Vec<String> = extra.iter().map(|p| p.display().to_string()).collect();
			println!("[watch] {} {}", name, listed.join(", "));
			for dir in extra {
				collect_dirs(dir, &mut dirs);
			}
		}

		for dir in &dirs {
			if let Err(e) = batcher.add(dir) {
				println!("[watch] {}: {}", name, e);
			}
		}
		tracing::debug!(service = name, dirs = dirs.len(), "watch registered");

		{
			let mut runtime = self.runtime.write().await;
			runtime.entry(name.to_string()).or_default().watch_dirs = dirs;
		}

		let sup = Arc::clone(self);
		let name = name.to_string();
		let spec = spec.clone();
		tokio::spawn(async move {
			while let Some(batch) = batcher.next().await {
				if !batch.iter().any(|event| relevant(event, spec.start.as_deref())) {
					continue;
				}
				println!("[change] {}", name);
				sup.kill_service(&name, &spec, false).await;
				sup.build(&name, &spec).await;
				sup.spawn(&name, &spec).await;
			}
		});
	}
}

async fn run_reported(stage: &str, name: &str, cmd: &str, dir: &Path) {
	let result = Command::new("sh")
		.args(["-c", cmd])
		.current_dir(dir)
		.output()
		.await;
	report_output(stage, name, result);
}

fn report_output(stage: &str, name: &str, result: std::io::Result<std::process::Output>) {
	match result {
		Ok(out) if out.status.success() => {}
		Ok(out) => {
			let stdout = String::from_utf8_lossy(&out.stdout);
			let stderr = String::from_utf8_lossy(&out.stderr);
			let combined = format!("{}\n{}", stdout.trim(), stderr.trim());
			println!("{}", combined.trim());
		}
		Err(e) => println!("[{}] {}: {}", stage, name, e),
	}
}

/// Hard kill of the child's process group. Spawns run with
/// `process_group(0)`, so the group id is the child's pid and grandchildren
/// of `sh -c` go down with it. No grace period.
fn kill_group(child: &Child) -> Result<(), String> {
	use nix::sys::signal::{killpg, Signal};
	use nix::unistd::Pid;

	let Some(pid) = child.id() else {
		return Ok(());
	};
	killpg(Pid::from_raw(pid as i32), Signal::SIGKILL).map_err(|e| format!("kill failed: {}", e))
}

fn collect_dirs(root: &Path, dirs: &mut Vec<PathBuf>) {
	let entries = match std::fs::read_dir(root) {
		Ok(entries) => entries,
		Err(e) => {
			println!("[watch] {}: {}", root.display(), e);
			return;
		}
	};
	dirs.push(root.to_path_buf());
	for entry in entries.flatten() {
		let path = entry.path();
		if path.is_dir() {
			collect_dirs(&path, dirs);
		}
	}
}

/// A batch triggers one restart cycle as soon as it contains one relevant
/// event; per-file detail is discarded downstream.
fn relevant(event: &Event, start: Option<&str>) -> bool {
	if !important_kind(&event.kind) {
		return false;
	}
	let artifact = start.map(Path::new).and_then(Path::file_name);
	event.paths.iter().any(|path| {
		// bulk deletions can surface events with no usable path
		if path.as_os_str().is_empty() {
			return false;
		}
		// a freshly rebuilt start artifact must not retrigger its own service
		match (artifact, path.file_name()) {
			(Some(artifact), Some(file)) if file == artifact => false,
			_ => true,
		}
	})
}

// create, write, rename, remove; metadata-only and access events are noise
fn important_kind(kind: &EventKind) -> bool {
	matches!(
		kind,
		EventKind::Create(_)
			| EventKind::Remove(_)
			| EventKind::Modify(ModifyKind::Data(_))
			| EventKind::Modify(ModifyKind::Name(_))
			| EventKind::Modify(ModifyKind::Any)
	)
}

async fn wait_for_signal() {
	use tokio::signal::unix::{signal, SignalKind};

	match signal(SignalKind::terminate()) {
		Ok(mut term) => {
			tokio::select! {
				_ = tokio::signal::ctrl_c() => {}
				_ = term.recv() => {}
			}
		}
		Err(_) => {
			let _ = tokio::signal::ctrl_c().await;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use notify::event::{
		AccessKind, CreateKind, DataChange, MetadataKind, RemoveKind, RenameMode,
	};

	fn event(kind: EventKind, path: &str) -> Event {
		Event::new(kind).add_path(PathBuf::from(path))
	}

	#[test]
	fn important_kinds() {
		assert!(important_kind(&EventKind::Create(CreateKind::File)));
		assert!(important_kind(&EventKind::Remove(RemoveKind::File)));
		assert!(important_kind(&EventKind::Modify(ModifyKind::Data(DataChange::Any))));
		assert!(important_kind(&EventKind::Modify(ModifyKind::Name(RenameMode::Any))));

		assert!(!important_kind(&EventKind::Modify(ModifyKind::Metadata(
			MetadataKind::Permissions
		))));
		assert!(!important_kind(&EventKind::Access(AccessKind::Any)));
	}

	#[test]
	fn relevant_ignores_empty_paths() {
		let no_path = Event::new(EventKind::Remove(RemoveKind::Any));
		assert!(!relevant(&no_path, None));

		let empty = event(EventKind::Remove(RemoveKind::Any), "");
		assert!(!relevant(&empty, None));
	}

	#[test]
	fn relevant_ignores_own_start_artifact() {
		let ev = event(EventKind::Create(CreateKind::File), "services/api/bin/api");
		assert!(!relevant(&ev, Some("bin/api")));
		assert!(relevant(&ev, Some("bin/worker")));
		assert!(relevant(&ev, None));
	}

	#[test]
	fn relevant_ignores_chmod() {
		let ev = event(
			EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
			"services/api/main.go",
		);
		assert!(!relevant(&ev, None));
	}

	#[test]
	fn one_good_path_is_enough() {
		let ev = Event::new(EventKind::Create(CreateKind::File))
			.add_path(PathBuf::from("bin/api"))
			.add_path(PathBuf::from("src/main.go"));
		assert!(relevant(&ev, Some("bin/api")));
	}
}
