use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Args {
    /// Path to session TOML
    #[arg(long, default_value = "metronome.toml")]
    pub config: String,

    /// Number of beats to simulate
    #[arg(long, default_value_t = 16)]
    pub beats: u64,

    /// RNG seed for deterministic replay
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Write onset events as CSV to this path (stdout if omitted)
    #[arg(long)]
    pub out: Option<String>,

    /// Override the configured intro tone count
    #[arg(long)]
    pub intro_tones: Option<u32>,

    /// Sample rate for the tick column of the event log
    #[arg(long, default_value_t = 48_000.0)]
    pub sample_rate: f64,
}
