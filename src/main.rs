//! cpuclock: print the host CPU's current, base and max clock.
//!
//! Set `RUST_LOG=debug` to see which probes were tried and why they failed.

use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use cpuclock::{FrequencyReading, Monitor, MonitorConfig, ReadingOrigin};

#[derive(Parser, Debug)]
#[command(version, about = "Report the CPU's current, base and max clock")]
struct CliArgs {
    /// Keep printing the current clock
    #[arg(short, long)]
    watch: bool,

    /// Refresh interval for --watch (defaults to the config file value)
    #[arg(short, long)]
    interval_ms: Option<u64>,

    /// Stop --watch after this many readings (0 = run until interrupted)
    #[arg(short = 'n', long, default_value_t = 0)]
    count: u64,

    /// Show where each value came from
    #[arg(short, long)]
    sources: bool,

    /// Write the effective configuration to the config file and exit
    #[arg(long)]
    write_config: bool,
}

fn main() -> Result<()> {
    let cli = CliArgs::parse();

    let mut logger = pretty_env_logger::formatted_timed_builder();
    logger.parse_default_env();
    logger.init();

    let config = MonitorConfig::load();
    if cli.write_config {
        let path = config.save()?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    let interval = Duration::from_millis(cli.interval_ms.unwrap_or(config.update_interval_ms).max(200));
    let monitor = Monitor::with_config(config);

    print_summary(&monitor, cli.sources);
    print_reading(&monitor.read_current(), cli.sources);

    if !cli.watch {
        return Ok(());
    }

    let mut printed = 1;
    while cli.count == 0 || printed < cli.count {
        std::thread::sleep(interval);
        print_reading(&monitor.read_current(), cli.sources);
        printed += 1;
    }

    Ok(())
}

fn print_summary(monitor: &Monitor, sources: bool) {
    let base = monitor.base();
    let max = monitor.max();

    if sources {
        let describe = |s: Option<cpuclock::FrequencySource>| {
            s.map(|s| s.to_string()).unwrap_or_else(|| "unresolved".to_string())
        };
        println!("Probe:   {}", monitor.probe_name());
        println!("Base:    {:.2} GHz  [{}]", base, describe(monitor.base_source()));
        println!("Max:     {:.2} GHz  [{}]", max, describe(monitor.max_source()));
    } else {
        println!("Base:    {:.2} GHz", base);
        println!("Max:     {:.2} GHz", max);
    }
}

fn print_reading(reading: &FrequencyReading, sources: bool) {
    let time = reading.measured_at.format("%H:%M:%S");
    if sources {
        let origin = match reading.origin {
            ReadingOrigin::Probe => "probe",
            ReadingOrigin::Cache => "cached",
            ReadingOrigin::Estimate => "estimate",
        };
        println!("Current: {:.2} GHz  [{}] {}", reading.ghz, origin, time);
    } else {
        println!("Current: {:.2} GHz  {}", reading.ghz, time);
    }
}
