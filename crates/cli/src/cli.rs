use std::path::PathBuf;

use clap::Parser;

/// Run a batch of jobs through the engine against simulated firmware.
///
/// Every completion event is printed as one JSON line, followed by the
/// final scheduler metrics.
#[derive(Parser, Debug)]
#[command(name = "psys-sim", about = "Drive the psys engine with simulated firmware")]
pub struct CliArgs {
    /// Path to the engine and hardware config
    #[arg(long, env = "PSYS_CONFIG", default_value = "config/psys.toml")]
    pub config: PathBuf,

    /// JSON file holding the list of jobs to submit
    #[arg(long)]
    pub jobs: PathBuf,

    /// Token of a job the simulated firmware never completes (repeatable)
    #[arg(long)]
    pub hang: Vec<u64>,

    /// Make a job fail with a firmware error code, as TOKEN=CODE (repeatable)
    #[arg(long = "fail", value_parser = parse_failure)]
    pub failures: Vec<(u64, i32)>,

    /// Simulated execution latency per job in milliseconds
    #[arg(long, default_value = "20")]
    pub latency_ms: u64,
}

fn parse_failure(s: &str) -> Result<(u64, i32), String> {
    let (token, code) = s
        .split_once('=')
        .ok_or_else(|| format!("expected TOKEN=CODE, got '{s}'"))?;
    let token = token
        .trim()
        .parse()
        .map_err(|e| format!("bad token '{token}': {e}"))?;
    let code = code
        .trim()
        .parse()
        .map_err(|e| format!("bad error code '{code}': {e}"))?;
    Ok((token, code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_repeated_flags() {
        let args = CliArgs::try_parse_from([
            "psys-sim", "--jobs", "jobs.json", "--hang", "3", "--hang", "4", "--fail", "7=-71",
        ])
        .unwrap();
        assert_eq!(args.jobs, PathBuf::from("jobs.json"));
        assert_eq!(args.hang, vec![3, 4]);
        assert_eq!(args.failures, vec![(7, -71)]);
        assert_eq!(args.latency_ms, 20);
    }

    #[test]
    fn rejects_malformed_failure() {
        assert!(parse_failure("7").is_err());
        assert!(parse_failure("x=1").is_err());
        assert_eq!(parse_failure(" 2 = 5 "), Ok((2, 5)));
    }
}
