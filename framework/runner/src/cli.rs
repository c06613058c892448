use std::path::PathBuf;

use clap::Parser;

use crate::verdict::Thresholds;

#[derive(Parser, Debug, Clone, Default)]
#[command(about, long_about = None)]
pub struct CrosswindCli {
    /// The number of seconds to run every scenario for, overriding the configured durations
    #[clap(long)]
    pub duration: Option<u64>,

    /// A TOML run file with `[scenarios.<name>]` tables. Options in the file override the options
    /// set in code and can add scenarios that use any registered iteration function.
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Do not show a progress bar on the CLI.
    ///
    /// This is recommended for CI/CD environments where the progress bar isn't being looked at by anyone and is just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,

    /// Append the run summary as a line of JSON to this file
    #[clap(long)]
    pub summary_file: Option<PathBuf>,

    /// Print the run summary as JSON to stdout once the run has finished
    #[clap(long, default_value = "false")]
    pub summary_json: bool,

    /// Identifier for this run, recorded in the summary. A random id is generated if not given.
    #[clap(long)]
    pub run_id: Option<String>,

    /// The number of seconds in-flight iterations may take to finish once a scenario stops,
    /// overriding the configured graceful stop periods
    #[clap(long)]
    pub grace_period: Option<u64>,

    /// Fail the run if the fraction of passing checks of any scenario is below this value
    #[clap(long, value_parser = parse_rate)]
    pub min_check_pass_rate: Option<f64>,

    /// Fail the run if the fraction of execution errors of any scenario is above this value
    #[clap(long, value_parser = parse_rate)]
    pub max_error_rate: Option<f64>,

    /// Fail the run if the fraction of timed out iterations of any scenario is above this value
    #[clap(long, value_parser = parse_rate)]
    pub max_timeout_rate: Option<f64>,

    /// Fail the run if the fraction of dropped ticks of any scenario is above this value
    #[clap(long, value_parser = parse_rate)]
    pub max_drop_rate: Option<f64>,
}

impl CrosswindCli {
    /// The default thresholds with any overrides given on the command line.
    pub fn thresholds(&self) -> Thresholds {
        let defaults = Thresholds::default();
        Thresholds {
            min_check_pass_rate: self.min_check_pass_rate.or(defaults.min_check_pass_rate),
            max_error_rate: self.max_error_rate.or(defaults.max_error_rate),
            max_timeout_rate: self.max_timeout_rate.or(defaults.max_timeout_rate),
            max_drop_rate: self.max_drop_rate.or(defaults.max_drop_rate),
        }
    }
}

fn parse_rate(s: &str) -> anyhow::Result<f64> {
    let rate = s.parse::<f64>()?;
    if !(0.0..=1.0).contains(&rate) {
        anyhow::bail!("Expected a fraction between 0 and 1, got {rate}");
    }

    Ok(rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_overrides() {
        let cli = CrosswindCli::try_parse_from([
            "users_api",
            "--duration",
            "5",
            "--no-progress",
            "--max-drop-rate",
            "0.5",
            "--run-id",
            "abc",
        ])
        .unwrap();

        assert_eq!(Some(5), cli.duration);
        assert!(cli.no_progress);
        assert_eq!(Some("abc".to_string()), cli.run_id);
        assert_eq!(
            Thresholds {
                max_drop_rate: Some(0.5),
                ..Thresholds::default()
            },
            cli.thresholds()
        );
    }

    #[test]
    fn reject_rate_outside_unit_range() {
        assert!(CrosswindCli::try_parse_from(["users_api", "--max-error-rate", "5"]).is_err());
    }

    #[test]
    fn defaults_without_arguments() {
        let cli = CrosswindCli::try_parse_from(["users_api"]).unwrap();
        assert_eq!(None, cli.config);
        assert!(!cli.summary_json);
        assert_eq!(Thresholds::default(), cli.thresholds());
    }
}
