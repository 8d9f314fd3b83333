//! Command-line argument parsing for the novelty daemon

use chrono::NaiveDateTime;

/// Parse command line arguments
#[derive(Debug, Default)]
pub struct Args {
    pub once: bool,
    pub validate: bool,
    pub help: bool,
    /// Evaluate quiet hours at this local instant and exit
    pub check: Option<NaiveDateTime>,
    /// Delay the reminder by this many seconds and exit
    pub delay: Option<u64>,
    /// Override the daily target hour
    pub hour: Option<u32>,
    pub errors: Vec<String>,
}

const CHECK_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"];

pub fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    parse_args_from(&args)
}

/// Parse an argv-style slice (first element is the program name)
pub fn parse_args_from(args: &[String]) -> Args {
    let mut result = Args::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--once" => result.once = true,
            "--validate" => result.validate = true,
            "--help" | "-h" => result.help = true,
            flag @ ("--check" | "--delay" | "--hour") => {
                let Some(value) = args.get(i + 1) else {
                    result.errors.push(format!("{} requires a value", flag));
                    break;
                };
                i += 1;
                match flag {
                    "--check" => match parse_instant(value) {
                        Some(at) => result.check = Some(at),
                        None => result
                            .errors
                            .push(format!("--check expects YYYY-MM-DDTHH:MM, got '{}'", value)),
                    },
                    "--delay" => match value.parse() {
                        Ok(secs) => result.delay = Some(secs),
                        Err(_) => result
                            .errors
                            .push(format!("--delay expects seconds, got '{}'", value)),
                    },
                    _ => match value.parse() {
                        Ok(hour) => result.hour = Some(hour),
                        Err(_) => result
                            .errors
                            .push(format!("--hour expects 0-23, got '{}'", value)),
                    },
                }
            }
            other => result.errors.push(format!("unknown argument '{}'", other)),
        }
        i += 1;
    }

    result
}

fn parse_instant(raw: &str) -> Option<NaiveDateTime> {
    CHECK_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

pub fn print_help() {
    println!("Novelty - daily reminder scheduler with quiet hours\n");
    println!("USAGE:");
    println!("    novelty [OPTIONS]\n");
    println!("OPTIONS:");
    println!("    --once                  Run a single foreground pass, exit once it fired");
    println!("    --validate              Validate configuration and exit");
    println!("    --check <YYYY-MM-DDTHH:MM>");
    println!("                            Show whether quiet hours allow a notification then");
    println!("    --delay <SECS>          Delay today's reminder, exit once it fired");
    println!("    --hour <H>              Override the daily target hour (0-23)");
    println!("    --help, -h              Show this help message\n");
    println!("ENVIRONMENT:");
    println!("    NOVELTY_STORE_PATH, NOVELTY_DAILY_HOUR, NOVELTY_TIMEZONE, NOVELTY_AUTHORIZATION, ...");
    println!("    See .env.example for the full list with defaults");
}
