use clap::Parser as ClapParser;
use session_telemetry::{Attribute, Config, Error, HostSignal, Provider};
use std::path::PathBuf;
use tracing::info;

/// Records a handful of events in one session and delivers them
#[derive(Debug, clap::Parser)]
struct Opts {
    /// The app key, e.g. A-DEV-0000000000
    pub app_key: String,

    /// Names of the events to record, in order
    pub events: Vec<String>,

    /// Load the configuration from a YAML file instead (the app key argument
    /// is then ignored)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Self-hosted ingestion URL
    #[arg(long)]
    pub custom_host: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let opts = Opts::parse();

    let cfg = match opts.config.as_ref() {
        Some(path) => Config::from_yaml_file(path)?,
        None => {
            let mut cfg = Config::new(opts.app_key);
            cfg.custom_host = opts.custom_host;
            cfg
        }
    };

    let provider = Provider::with_reqwest(cfg)?;

    provider.start_session(vec![Attribute::new("source", "demo")]);
    for (idx, name) in opts.events.iter().enumerate() {
        provider.record_event(name, &[Attribute::new("index", idx as u64)]);
    }
    info!(pending = provider.pending_events(), "Recorded events");

    provider
        .handle_host_signal(HostSignal::ApplicationShutdown)
        .await;
    info!(pending = provider.pending_events(), "Done");

    Ok(())
}
