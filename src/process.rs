//! Default process-discovery helper: given a control port and an optional
//! pid-file path, returns a process id or nothing. This is the concrete
//! implementation the original source ships, kept so the crate is runnable
//! standalone behind a trait callers can substitute in tests.

use std::fs;
use std::path::Path;

/// Runs external commands and captures stdout as lines. Exists so tests can
/// substitute canned output instead of shelling out to `pidof`/`netstat`/`ps`.
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args`, returning its stdout split into lines.
    /// `Err` covers "command not found" and any non-zero exit.
    fn run(&self, program: &str, args: &[&str]) -> Result<Vec<String>, std::io::Error>;
}

/// Shells out via [`std::process::Command`].
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<Vec<String>, std::io::Error> {
        let output = std::process::Command::new(program).args(args).output()?;
        if !output.status.success() {
            return Err(std::io::Error::other(format!(
                "{program} exited with {}",
                output.status
            )));
        }
        let text = String::from_utf8_lossy(&output.stdout);
        Ok(text.lines().map(str::to_string).collect())
    }
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

/// Attempts to determine the process id for a running router process, in
/// the order: `PidFile`, `pidof tor`, `netstat -npl | grep 127.0.0.1:<port>`,
/// `ps -o pid -C tor`. Each strategy is rejected if its output doesn't match
/// the expected single-match shape; the next strategy is then tried.
pub fn find_pid(
    runner: &dyn CommandRunner,
    control_port: u16,
    pid_file_path: Option<&Path>,
) -> Option<String> {
    if let Some(path) = pid_file_path {
        if let Ok(contents) = fs::read_to_string(path) {
            if let Some(first_line) = contents.lines().next() {
                let candidate = first_line.trim();
                if all_digits(candidate) {
                    return Some(candidate.to_string());
                }
            }
        }
    }

    if let Ok(lines) = runner.run("pidof", &["tor"]) {
        if lines.len() == 1 {
            let tokens: Vec<&str> = lines[0].split_whitespace().collect();
            if tokens.len() == 1 && all_digits(tokens[0]) {
                return Some(tokens[0].to_string());
            }
        }
    }

    let netstat_pattern = format!("127.0.0.1:{control_port}");
    if let Ok(lines) = runner.run("netstat", &["-npl"]) {
        let matches: Vec<&String> = lines.iter().filter(|l| l.contains(&netstat_pattern)).collect();
        if matches.len() == 1 {
            if let Some(field) = matches[0].split_whitespace().nth(6) {
                if let Some((pid, _name)) = field.split_once('/') {
                    if all_digits(pid) {
                        return Some(pid.to_string());
                    }
                }
            }
        }
    }

    if let Ok(lines) = runner.run("ps", &["-o", "pid", "-C", "tor"]) {
        if lines.len() == 2 {
            let candidate = lines[1].trim();
            if all_digits(candidate) {
                return Some(candidate.to_string());
            }
        }
    }

    None
}
