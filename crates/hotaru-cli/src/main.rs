use std::path::{Path, PathBuf};

use hotaru_core::{changes, config, Config, Supervisor};
use owo_colors::OwoColorize;

#[tokio::main]
async fn main() {
	tracing_subscriber::fmt().init();

	let args: Vec<String> = std::env::args().skip(1).collect();

	if args.is_empty() {
		print_usage();
		return;
	}

	match args[0].as_str() {
		"help" | "--help" | "-h" => print_usage(),
		"version" | "--version" | "-V" => println!("hotaru {}", env!("CARGO_PKG_VERSION")),
		"run" => cmd_run(&args[1..]).await,
		"stop" => cmd_stop(&args[1..]).await,
		"pack" => cmd_pack(&args[1..]).await,
		"changed" => cmd_changed(&args[1..]),
		name => {
			eprintln!("unknown command: {}", name);
			eprintln!("run 'hotaru help' for usage");
			std::process::exit(1);
		}
	}
}

fn print_usage() {
	eprintln!(
		"{} {} — service supervisor for monorepos",
		"hotaru".bold(),
		env!("CARGO_PKG_VERSION")
	);
	eprintln!();
	eprintln!("usage: {} [command] [services...] [options]", "hotaru".bold());
	eprintln!();

	eprintln!("{}", "services".cyan().bold());
	eprintln!("  {} [names...] [-d]     Build, start and watch (all services when none given)", "run".bold());
	eprintln!("  {} [names...]         Kill and run cleanup commands", "stop".bold());
	eprintln!("  {} [names...]         Run packaging commands", "pack".bold());
	eprintln!();

	eprintln!("{}", "changes".cyan().bold());
	eprintln!("  {} <range>         List services touched by a git diff range", "changed".bold());
	eprintln!("  pack {} <range>  Pack only the services the diff touched", "--changed".bold());
	eprintln!();

	eprintln!("{}", "options".cyan().bold());
	eprintln!("  {} <path>        Config file (default: hotaru.toml)", "--config".bold());
	eprintln!("  {}, {}         Return immediately, leave services running", "-d".bold(), "--detach".bold());
}

struct ParsedArgs {
	config: PathBuf,
	detach: bool,
	changed_range: Option<String>,
	services: Vec<String>,
}

fn parse_args(args: &[String]) -> ParsedArgs {
	let mut parsed = ParsedArgs {
		config: PathBuf::from("hotaru.toml"),
		detach: false,
		changed_range: None,
		services: Vec::new(),
	};

	let mut iter = args.iter();
	while let Some(arg) = iter.next() {
		match arg.as_str() {
			"-d" | "--detach" => parsed.detach = true,
			"--config" => match iter.next() {
				Some(path) => parsed.config = PathBuf::from(path),
				None => usage_error("--config requires a path"),
			},
			"--changed" => match iter.next() {
				Some(range) => parsed.changed_range = Some(range.clone()),
				None => usage_error("--changed requires a diff range"),
			},
			flag if flag.starts_with('-') => usage_error(&format!("unknown flag: {}", flag)),
			name => parsed.services.push(name.to_string()),
		}
	}
	parsed
}

fn usage_error(message: &str) -> ! {
	eprintln!("{}", message);
	eprintln!("run 'hotaru help' for usage");
	std::process::exit(1);
}

fn load_config_or_exit(path: &Path) -> Config {
	match config::load_config(path) {
		Ok(config) => config,
		Err(e) => {
			eprintln!("{}", e);
			std::process::exit(1);
		}
	}
}

fn exit_on_error(result: Result<(), String>) {
	if let Err(e) = result {
		eprintln!("{}", e);
		std::process::exit(1);
	}
}

async fn cmd_run(args: &[String]) {
	let parsed = parse_args(args);
	let config = load_config_or_exit(&parsed.config);
	let sup = Supervisor::new(config);
	exit_on_error(sup.run(&parsed.services, parsed.detach).await);
}

async fn cmd_stop(args: &[String]) {
	let parsed = parse_args(args);
	let config = load_config_or_exit(&parsed.config);
	let sup = Supervisor::new(config);
	exit_on_error(sup.stop(&parsed.services).await);
}

async fn cmd_pack(args: &[String]) {
	let parsed = parse_args(args);
	let config = load_config_or_exit(&parsed.config);

	let mut services = parsed.services.clone();
	if let Some(range) = &parsed.changed_range {
		let changed = match changes::git_diff(range) {
			Ok(diff) => changes::changed_services(&config, &diff),
			Err(e) => {
				eprintln!("{}", e);
				std::process::exit(1);
			}
		};
		services.extend(changed);
		services.sort();
		services.dedup();
		if services.is_empty() {
			eprintln!("no services changed in {}", range);
			return;
		}
	}

	let sup = Supervisor::new(config);
	exit_on_error(sup.pack(&services).await);
}

fn cmd_changed(args: &[String]) {
	let parsed = parse_args(args);
	let Some(range) = parsed.services.first() else {
		usage_error("changed requires a diff range");
	};
	let config = load_config_or_exit(&parsed.config);

	match changes::git_diff(range) {
		Ok(diff) => {
			for name in changes::changed_services(&config, &diff) {
				println!("{}", name);
			}
		}
		Err(e) => {
			eprintln!("{}", e);
			std::process::exit(1);
		}
	}
}
