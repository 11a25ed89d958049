//! Dry-run a TI-TXT image against the simulated target and report what the programmer did.
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, LevelFilter};

use msp430_jtag::port::sim::{NoDelay, SimConfig, SimTarget};
use msp430_jtag::{
    EntrySequence, JtagConfig, MemoryImage, ProgramConfig, Programmer, ReleaseTarget, Status,
};

/// Parse a string as a hex or decimal u16
fn parse_u16(s: &str) -> Result<u16, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u16>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse `ADDR=MASK`
fn parse_stuck(s: &str) -> Result<(u16, u16), String> {
    let (addr, mask) = s
        .split_once('=')
        .ok_or_else(|| format!("expected ADDR=MASK, got {}", s))?;
    Ok((parse_u16(addr)?, parse_u16(mask)?))
}

#[derive(Parser)]
#[command(name = "msp430-sim")]
#[command(version, about = "Program a TI-TXT image into a simulated MSP430", long_about = None)]
struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// TI-TXT image
    image: PathBuf,

    /// Device ID the target reports
    #[arg(long, default_value = "0xF149", value_parser = parse_u16)]
    device: u16,

    /// Target has dedicated JTAG pins (no TEST pin entry sequence)
    #[arg(long)]
    rst_only: bool,

    /// Start the program at this address instead of resetting the target
    #[arg(long, value_parser = parse_u16)]
    run_at: Option<u16>,

    /// Allow Info Segment A to be erased and programmed
    #[arg(long)]
    unlock_info_a: bool,

    /// Simulate a blown JTAG fuse
    #[arg(long)]
    fuse_blown: bool,

    /// Entry attempts that fail before the pins make contact
    #[arg(long, default_value_t = 0)]
    failed_entries: u32,

    /// Polls before the CPU synchronizes
    #[arg(long, default_value_t = 2)]
    sync_delay: u32,

    /// Simulate a CPU that never synchronizes
    #[arg(long)]
    no_sync: bool,

    /// Flash bits that will not program, as ADDR=MASK (repeatable)
    #[arg(long, value_parser = parse_stuck)]
    stuck: Vec<(u16, u16)>,
}

fn log_level(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG still overrides the level picked by -v
    env_logger::Builder::new()
        .filter_level(log_level(cli.verbose))
        .parse_default_env()
        .init();

    let image = match File::open(&cli.image).and_then(|f| MemoryImage::from_reader(BufReader::new(f)))
    {
        Ok(image) => image,
        Err(e) => {
            error!("{}: {}", cli.image.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let mut sim = SimTarget::new(SimConfig {
        device_id: cli.device,
        fuse_blown: cli.fuse_blown,
        failed_entries: cli.failed_entries,
        sync_delay: (!cli.no_sync).then_some(cli.sync_delay),
        ..SimConfig::default()
    });
    for (addr, mask) in &cli.stuck {
        sim.stick_bits(*addr, *mask);
    }

    let entry = if cli.rst_only {
        EntrySequence::RstOnly
    } else {
        EntrySequence::TestPin
    };
    let release = cli.run_at.map_or(ReleaseTarget::Reset, ReleaseTarget::Pc);
    let config = ProgramConfig::default()
        .with_jtag(JtagConfig::default().with_entry(entry))
        .with_unlock_info_a(cli.unlock_info_a)
        .with_release(release);

    let result = Programmer::new(config).program(&mut sim, NoDelay, &image);
    println!(
        "entries: {}, erases: {}, PSA runs: {}, words programmed: {}, violations: {}",
        sim.entries(),
        sim.erases().len(),
        sim.psa_runs().len(),
        sim.programmed().len(),
        sim.violations()
    );

    let status = Status::from(&result);
    match result {
        Ok(report) => println!("{}", report),
        Err(e) => println!("{:?}: {}", status, e),
    }
    if status.into() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
