use clap::{Arg, ArgAction, ArgMatches, Command, error::ErrorKind, value_parser};
use log::{debug, warn};
use std::{
    convert::Infallible,
    error::Error,
    fmt::Display,
    io::{BufRead, Write},
    path::PathBuf,
};
use testtone::{
    acquisition::{DEFAULT_DEVICE, DEFAULT_INPUT_TERMINAL, DEFAULT_OUTPUT_TERMINAL},
    console::Console,
    loopback::Loopback,
    nidaqmx::NiDaqmx,
    run::{Options, run},
};

fn cli() -> Command {
    Command::new("testtone")
        .about("Play a CSV of voltages on an analog output and record the analog input")
        .arg(
            Arg::new("input")
                .value_parser(value_parser!(PathBuf))
                .help("CSV file with one or two columns of samples"),
        )
        .arg(
            Arg::new("rate")
                .short('r')
                .long("rate")
                .help("Sample rate in samples per second"),
        )
        .arg(
            Arg::new("channels")
                .short('c')
                .long("channels")
                .help("Number of columns in the input file (1 or 2)"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_parser(value_parser!(PathBuf))
                .help("CSV file for the recorded samples"),
        )
        .arg(
            Arg::new("device")
                .short('d')
                .long("device")
                .default_value(DEFAULT_DEVICE)
                .help("DAQ device name"),
        )
        .arg(
            Arg::new("ao")
                .long("ao")
                .default_value(DEFAULT_OUTPUT_TERMINAL)
                .help("Analog output terminal"),
        )
        .arg(
            Arg::new("ai")
                .long("ai")
                .default_value(DEFAULT_INPUT_TERMINAL)
                .help("Analog input terminal"),
        )
        .arg(
            Arg::new("precision")
                .long("precision")
                .value_parser(value_parser!(usize))
                .help("Write samples with this many decimals instead of full precision"),
        )
        .arg(
            Arg::new("simulate")
                .long("simulate")
                .action(ArgAction::SetTrue)
                .help("Use a simulated device with its output wired to its input"),
        )
        .arg(
            Arg::new("no-pause")
                .long("no-pause")
                .action(ArgAction::SetTrue)
                .help("Exit without waiting for Enter"),
        )
}

fn options(matches: &ArgMatches) -> Options {
    Options {
        input: matches.get_one::<PathBuf>("input").cloned(),
        sample_rate: matches.get_one::<String>("rate").cloned(),
        channels: matches.get_one::<String>("channels").cloned(),
        output: matches.get_one::<PathBuf>("output").cloned(),
        device: matches.get_one::<String>("device").cloned().unwrap_or_default(),
        output_terminal: matches.get_one::<String>("ao").cloned().unwrap_or_default(),
        input_terminal: matches.get_one::<String>("ai").cloned().unwrap_or_default(),
        precision: matches.get_one::<usize>("precision").copied(),
    }
}

fn tell<R: BufRead, W: Write>(console: &mut Console<R, W>, message: impl Display) {
    if let Err(err) = console.say(message) {
        warn!("cannot write to the console: {}", err);
    }
}

fn pause<R: BufRead, W: Write>(console: &mut Console<R, W>) {
    if let Err(err) = console.pause() {
        warn!("cannot wait for Enter: {}", err);
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let mut console = Console::stdio();
    let matches = match cli().try_get_matches() {
        Ok(matches) => matches,
        Err(err)
            if matches!(
                err.kind(),
                ErrorKind::DisplayHelp
                    | ErrorKind::DisplayVersion
                    | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
            ) =>
        {
            if let Err(err) = err.print() {
                warn!("cannot print help: {}", err);
            }
            return Ok(());
        }
        Err(err) => {
            tell(&mut console, err);
            pause(&mut console);
            return Ok(());
        }
    };
    let options = options(&matches);

    let report = if matches.get_flag("simulate") {
        run(&options, &mut console, || Ok::<_, Infallible>(Loopback::new()))
    } else {
        run(&options, &mut console, NiDaqmx::load)
    };

    match report {
        Ok(report) => debug!(
            "{} rows, device error: {:?}, output: {:?}",
            report.rows, report.device_error, report.output
        ),
        Err(err) => tell(&mut console, err),
    }

    if !matches.get_flag("no-pause") {
        pause(&mut console);
    }

    Ok(())
}
