use clap::Parser;

#[derive(clap::Parser, Debug)]
#[command(
    author,
    version,
    about = "Sitehound - Single-Target Web Recon Engine",
    long_about = None,
    after_help = "EXAMPLES:
  One-shot scan, report on stdout:
    sitehound scan https://example.com

  Pretty-printed report:
    sitehound scan example.com --pretty

  Run the analysis API:
    sitehound serve --host 0.0.0.0 --port 8080

Limits, timeouts and pacing are taken from the environment
(MAX_HTTP_REQUESTS_PER_SCAN, GLOBAL_RATE_LIMIT, JITTER_RANGE, ...)."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable detailed debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Enable verbose output
    #[arg(long, global = true)]
    pub verbose: bool,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Scan a single URL and print the run report as JSON
    Scan {
        /// Target URL (scheme defaults to https)
        url: String,

        /// Pretty-print the report
        #[arg(long)]
        pretty: bool,
    },

    /// Serve the HTTP analysis API (POST /analyze, GET /health)
    Serve {
        /// Bind address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Bind port
        #[arg(long, default_value_t = 8000)]
        port: u16,
    },
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}
