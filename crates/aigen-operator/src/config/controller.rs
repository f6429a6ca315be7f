use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::domain::dispatcher::DispatcherSettings;

#[derive(Parser, Debug, Clone)]
pub struct ControllerArgs {
    #[arg(
        long,
        env = "KUBECONFIG",
        value_hint = clap::ValueHint::FilePath,
        help = "Path to kubeconfig file (defaults to cluster config or ~/.kube/config)"
    )]
    pub kubeconfig: Option<PathBuf>,

    #[arg(
        long,
        env = "OPERATOR_NAMESPACE",
        help = "Only watch AIGen objects in this namespace (defaults to all namespaces)"
    )]
    pub namespace: Option<String>,

    #[arg(
        long,
        env = "RECONCILE_INTERVAL",
        default_value = "60",
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Seconds between periodic resyncs of every AIGen"
    )]
    pub reconcile_interval: u64,

    #[arg(
        long,
        env = "DEBOUNCE_MS",
        default_value = "500",
        help = "Milliseconds a queued AIGen waits so bursts of events collapse into one pass"
    )]
    pub debounce_ms: u64,

    #[arg(
        long,
        env = "MAX_BACKOFF",
        default_value = "60",
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Upper bound in seconds for the retry delay after a failed pass"
    )]
    pub max_backoff: u64,

    #[arg(
        long,
        env = "SHUTDOWN_TIMEOUT",
        default_value = "30",
        help = "Seconds to wait for in-flight reconciliations on shutdown"
    )]
    pub shutdown_timeout: u64,
}

impl ControllerArgs {
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout)
    }
}

impl From<&ControllerArgs> for DispatcherSettings {
    fn from(args: &ControllerArgs) -> Self {
        let max_backoff = Duration::from_secs(args.max_backoff);
        Self {
            debounce: Duration::from_millis(args.debounce_ms),
            base_backoff: Duration::from_secs(1).min(max_backoff),
            max_backoff,
        }
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;
    use crate::config::cli::Cli;
    use crate::config::cli::Commands;

    fn parse(args: &[&str]) -> ControllerArgs {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Commands::Run(args) => *args,
            Commands::Crd => panic!("expected run"),
        }
    }

    #[test]
    fn bare_run_uses_documented_defaults() {
        let args = parse(&["aigen-operator", "run"]);

        assert_eq!(args.reconcile_interval(), Duration::from_secs(60));
        assert_eq!(args.shutdown_timeout(), Duration::from_secs(30));
        assert_eq!(DispatcherSettings::from(&args), DispatcherSettings::default());
    }

    #[test]
    fn explicit_flags_override_defaults() {
        let args = parse(&[
            "aigen-operator",
            "run",
            "--namespace",
            "ml",
            "--reconcile-interval",
            "15",
            "--debounce-ms",
            "100",
            "--max-backoff",
            "30",
        ]);

        assert_eq!(args.namespace.as_deref(), Some("ml"));
        assert_eq!(args.reconcile_interval(), Duration::from_secs(15));
        assert_eq!(
            DispatcherSettings::from(&args),
            DispatcherSettings {
                debounce: Duration::from_millis(100),
                base_backoff: Duration::from_secs(1),
                max_backoff: Duration::from_secs(30),
            }
        );
    }

    #[test]
    fn zero_interval_is_rejected() {
        assert!(
            Cli::try_parse_from(["aigen-operator", "run", "--reconcile-interval", "0"]).is_err()
        );
    }
}
