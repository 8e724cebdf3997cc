use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the TOML settings file; defaults apply when absent.
    #[arg(long, default_value = "config.toml")]
    pub config: String,

    /// How often to log a dashboard summary, in milliseconds.
    #[arg(long, default_value_t = 10_000)]
    pub report_interval_ms: u64,
}
