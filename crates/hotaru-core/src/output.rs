use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::ChildStderr;

/// Forward a child's stderr line by line, each line prefixed with a
/// timestamp and the service name so interleaved output from several
/// services stays attributable. Stdout is inherited and needs no relay.
pub fn relay_stderr(name: String, stderr: ChildStderr) {
	tokio::spawn(async move {
		let mut lines = BufReader::new(stderr).lines();
		while let Ok(Some(line)) = lines.next_line().await {
			eprintln!("{} {} {}", timestamp(), name, line);
		}
	});
}

pub fn timestamp() -> String {
	let now = std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.unwrap()
		.as_secs();
	let (year, month, day, hour, minute, second) = secs_to_datetime(now);
	format!(
		"{:04}/{:02}/{:02} {:02}:{:02}:{:02}",
		year, month, day, hour, minute, second
	)
}

fn secs_to_datetime(secs: u64) -> (u32, u32, u32, u32, u32, u32) {
	let days = (secs / 86400) as i64;
	let time_of_day = secs % 86400;
	let hour = (time_of_day / 3600) as u32;
	let minute = ((time_of_day % 3600) / 60) as u32;
	let second = (time_of_day % 60) as u32;

	let z = days + 719468;
	let era = if z >= 0 { z } else { z - 146096 } / 146097;
	let doe = (z - era * 146097) as u32;
	let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
	let y = yoe as i64 + era * 400;
	let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
	let mp = (5 * doy + 2) / 153;
	let d = doy - (153 * mp + 2) / 5 + 1;
	let m = if mp < 10 { mp + 3 } else { mp - 9 };
	let y = if m <= 2 { y + 1 } else { y };

	(y as u32, m, d, hour, minute, second)
}
