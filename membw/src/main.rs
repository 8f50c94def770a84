use std::process::ExitCode;

use membw::RunConfig;
use tracing::warn;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

fn print_usage() {
    eprintln!("Usage: membw [OPTIONS]");
    eprintln!();
    eprintln!("  -v <level>   Print progress when level > 0, debug logs when level > 1");
    eprintln!("               (default: 0)");
    eprintln!("  -h, --help   Show this help");
    eprintln!();
    eprintln!("Results are appended to output/write_results.csv and output/read_results.csv.");
}

#[derive(Debug, PartialEq)]
enum Command {
    Run(Args),
    Help,
}

#[derive(Debug, Default, PartialEq)]
struct Args {
    verbosity: i32,
    ignored: Vec<String>,
}

/// Parses everything after the program name. Unknown arguments, and a trailing `-v`
/// with no level, are collected rather than rejected.
fn parse_args(args: &[String]) -> Command {
    let mut parsed = Args::default();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-v" if i + 1 < args.len() => {
                i += 1;
                parsed.verbosity = parse_level(&args[i]);
            }
            "--help" | "-h" => return Command::Help,
            other => parsed.ignored.push(other.to_string()),
        }
        i += 1;
    }

    Command::Run(parsed)
}

/// Leading-integer parse: optional whitespace and sign, then digits up to the first
/// non-digit. No digits gives 0; out-of-range values saturate.
fn parse_level(s: &str) -> i32 {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let mut level: i32 = 0;
    for d in digits.bytes().take_while(u8::is_ascii_digit) {
        let d = i32::from(d - b'0');
        level = if negative {
            level.saturating_mul(10).saturating_sub(d)
        } else {
            level.saturating_mul(10).saturating_add(d)
        };
    }
    level
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let Args { verbosity, ignored } = match parse_args(&args) {
        Command::Run(args) => args,
        Command::Help => {
            print_usage();
            return ExitCode::SUCCESS;
        }
    };

    let default_filter = if verbosity > 1 { "membw=debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_filter(
                    EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| EnvFilter::new(default_filter)),
                ),
        )
        .init();

    for arg in &ignored {
        warn!(arg = %arg, "ignoring unknown argument");
    }

    let config = RunConfig {
        threads: rayon::current_num_threads(),
        verbosity,
        ..RunConfig::default()
    };

    match membw::run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            println!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn run_args(list: &[&str]) -> Args {
        match parse_args(&args(list)) {
            Command::Run(parsed) => parsed,
            Command::Help => panic!("unexpected help for {:?}", list),
        }
    }

    #[test]
    fn test_no_arguments_is_quiet() {
        assert_eq!(run_args(&[]), Args::default());
    }

    #[test]
    fn test_verbosity_level() {
        assert_eq!(run_args(&["-v", "1"]).verbosity, 1);
        assert_eq!(run_args(&["-v", "2"]).verbosity, 2);
        assert_eq!(run_args(&["-v", "1", "-v", "3"]).verbosity, 3);
    }

    #[test]
    fn test_non_integer_level_is_zero() {
        let parsed = run_args(&["-v", "abc"]);
        assert_eq!(parsed.verbosity, 0);
        assert!(parsed.ignored.is_empty());
    }

    #[test]
    fn test_level_uses_leading_digits() {
        assert_eq!(parse_level("2x"), 2);
        assert_eq!(parse_level("  7"), 7);
        assert_eq!(parse_level("-3"), -3);
        assert_eq!(parse_level("+4"), 4);
        assert_eq!(parse_level(""), 0);
        assert_eq!(parse_level("x2"), 0);
        assert_eq!(parse_level("99999999999"), i32::MAX);
        assert_eq!(run_args(&["-v", "2x"]).verbosity, 2);
    }

    #[test]
    fn test_trailing_flag_without_level_is_ignored() {
        let parsed = run_args(&["-v"]);
        assert_eq!(parsed.verbosity, 0);
        assert_eq!(parsed.ignored, vec!["-v".to_string()]);
    }

    #[test]
    fn test_help_flags() {
        assert_eq!(parse_args(&args(&["-h"])), Command::Help);
        assert_eq!(parse_args(&args(&["--help"])), Command::Help);
        assert_eq!(parse_args(&args(&["-v", "1", "--help"])), Command::Help);
    }

    #[test]
    fn test_unknown_arguments_are_collected() {
        let parsed = run_args(&["--threads", "8", "-v", "1", "extra"]);
        assert_eq!(parsed.verbosity, 1);
        assert_eq!(parsed.ignored, args(&["--threads", "8", "extra"]));
    }
}
