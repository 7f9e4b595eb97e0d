use std::error::Error;

use clap::Parser;

use rdnsbrute::api::{ScanConfig, ScanEngine, ScanReport};
use rdnsbrute::dispatcher::ScanState;
use rdnsbrute::input::{self, Opts, OutputFormat};
use rdnsbrute::logger;

#[tokio::main]
async fn main() {
    let opts = Opts::parse();
    logger::init_logger(opts.verbose);

    match run_scan(opts).await {
        Ok(report) => {
            let code = match report.state {
                ScanState::Completed => 0,
                _ => 1,
            };
            std::process::exit(code);
        }
        Err(e) => {
            eprintln!("scan failed to start: {}", e);
            std::process::exit(1);
        }
    }
}

/// 装载输入并运行一次扫描
async fn run_scan(opts: Opts) -> Result<ScanReport, Box<dyn Error>> {
    let wordlist = match &opts.file {
        Some(path) => input::load_wordlist(path)?,
        None => Vec::new(),
    };
    let resolvers = input::load_resolvers(&opts.resolvers)?;

    let report_format = opts.format.parse::<OutputFormat>().unwrap_or_else(|e| {
        eprintln!("{}, falling back to csv", e);
        OutputFormat::Csv
    });

    let config = ScanConfig {
        hostname: opts.domain,
        threads: opts.threads,
        wordlist,
        resolvers,
        report_file: opts.output,
        report_format,
        check_authoritative: !opts.no_recon,
        silent: opts.slient,
        interactive: true,
    };

    ScanEngine::new(config).run().await
}
