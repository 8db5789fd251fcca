// Drives an emulated TDA182I2 whose register file persists between runs as a
// CBOR image, so a bring-up sequence can be stepped through one command at a time.
use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::{fs::File, path::PathBuf, sync::Arc};
use tda182i2::config::{Board, Config};
use tda182i2::emulator::{Emulator, Image};
use tda182i2::registers::{self, Field, PowerState, REGISTER_COUNT};
use tda182i2::standard::StandardMode;
use tda182i2::{Dependencies, Tda182i2};

#[derive(Parser, Debug)]
/// Try it out: `tda182i2 up && tda182i2 tune 474000000 && tda182i2 status`
struct Args {
    /// Register image, created on first use
    #[arg(short, long, default_value = "tda182i2.cbor")]
    image: PathBuf,
    /// Tuner description (TOML); defaults to a master board on unit 0
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Board bring-up plus whatever the config asks for
    Up,
    Reset,
    /// Tune to a channel in Hz with the standard's settings
    Tune {
        hz: u64,
        /// Standard number (0 DVB-T 6 MHz .. 17 ScanXpress), else the config's
        #[arg(short, long)]
        standard: Option<u8>,
    },
    /// Program the synthesizer only, no standard settings
    Lo { hz: u64 },
    /// Settings of the configured broadcast standard
    Standard,
    /// Set the IF frequency in Hz
    If { hz: u32 },
    /// Read or set the power state (0 normal .. 4 deepest standby)
    Power { state: Option<u8> },
    Rfcal,
    Agc1,
    Level,
    Status,
    Get { field: String },
    Set { field: String, value: u8 },
    Dump,
}

fn field(name: &str) -> Result<Field> {
    Field::by_name(name).ok_or_else(|| anyhow!("no field named {name}"))
}

fn run(radio: &Tda182i2, unit: u32, config: &Config, command: Command) -> Result<()> {
    match command {
        Command::Up => config.apply(radio)?,
        Command::Reset => radio.reset(unit)?,
        Command::Tune { hz, standard } => {
            if let Some(mode) = standard {
                let mode = StandardMode::try_from(mode).map_err(|_| anyhow!("bad standard {mode}"))?;
                radio.set_standard_mode(unit, mode)?;
            }
            radio.set_rf(unit, hz)?;
        }
        Command::Lo { hz } => radio.set_rf_frequency(unit, hz)?,
        Command::Standard => {
            let mode = radio.standard_mode(unit)?;
            println!("{mode:?}: IF {} Hz, offset {} Hz", radio.standard_if(unit)?, radio.cf_offset(unit)?);
            println!("{:#?}", mode.settings());
        }
        Command::If { hz } => radio.set_if_frequency(unit, hz)?,
        Command::Power { state: None } => println!("{:?}", radio.power_state(unit)?),
        Command::Power { state: Some(state) } => {
            let state = PowerState::try_from(state).map_err(|_| anyhow!("bad power state {state}"))?;
            Board::from(config.board).set_power_state(radio, unit, state)?;
        }
        Command::Rfcal => radio.launch_rf_calibration(unit)?,
        Command::Agc1 => println!("{} gain changes", radio.adapt_agc1(unit)?),
        Command::Level => println!("{} dBuV", radio.power_level(unit)?),
        Command::Status => {
            radio.check_hw_version(unit)?;
            println!("identity   {}", radio.identity(unit)?);
            println!("revision   {}.{}", radio.major_revision(unit)?, radio.minor_revision(unit)?);
            println!("master     {}", radio.master(unit)?);
            println!("power      {:?}", radio.power_state(unit)?);
            println!("standard   {:?}", radio.standard_mode(unit)?);
            println!("lo         {} Hz", radio.rf_frequency(unit)?);
            println!("if         {} Hz", radio.if_frequency(unit)?);
            println!("locked     {}", radio.lock_status(unit)?);
            println!("irq        {:?}", radio.irq_status(unit)?);
        }
        Command::Get { field: name } => println!("{:#04x}", radio.read_field(unit, field(&name)?)?),
        Command::Set { field: name, value } => radio.write_field(unit, field(&name)?, value)?,
        Command::Dump => {
            let mut regs = [0u8; REGISTER_COUNT];
            radio.read(unit, 0, &mut regs)?;
            for f in registers::FIELDS {
                println!("{:#04x} {:18} {:#04x}", f.addr, f.name, f.extract(regs[usize::from(f.addr)]));
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    // RUST_LOG, when set, overrides --verbose.
    env_logger::Builder::new()
        .filter_level(if args.verbose { LevelFilter::Debug } else { LevelFilter::Info })
        .parse_default_env()
        .init();

    let config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => Config::default(),
    };

    let emu = match File::open(&args.image) {
        Ok(f) => Emulator::with_image(Image::load(f).with_context(|| format!("loading {}", args.image.display()))?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::info!("{} not found, starting from power on", args.image.display());
            let emu = Emulator::new();
            emu.power_on();
            emu
        }
        Err(e) => bail!(e),
    };
    let emu = Arc::new(emu);
    let radio = Tda182i2::new();
    config.init(&radio, Dependencies::new(emu.clone(), emu.clone()))?;

    let result = run(&radio, config.unit, &config, args.command);
    radio.deinit(config.unit)?;

    let f = File::create(&args.image).with_context(|| format!("writing {}", args.image.display()))?;
    emu.image().save(f)?;
    result
}
