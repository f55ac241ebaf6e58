//! uartboot command line interface.

use std::process;
use std::time::Duration;

use clap::{
    crate_authors, crate_description, crate_name, crate_version, value_t, App, AppSettings::*, Arg,
    ArgMatches,
};
use console::style;
use log::{debug, error, trace, LevelFilter};
use simplelog::*;

use uartboot::{self as ub, Error};

fn main() {
    println!("[UB] UART-Bootloader Upload-Tool v{}", crate_version!());

    ctrlc::set_handler(move || {
        println!("🛑 received Ctrl+C!");
        process::exit(130);
    })
    .expect("Failed to install my Ctrl-C handler!");

    let matches = App::new(crate_name!())
        .version(format!("v{}", crate_version!()).as_str())
        .author(crate_authors!())
        .about(crate_description!())
        .long_about(
            "\n\
            Uploads an Intel HEX file to a device running the UART \
            bootloader. The hex file is decoded into a flat image of the \
            flash, which is then pushed page by page:\n\
               \t* 0xA0 start of frame, answered with 0x55\n\
               \t* page address, 4 bytes lowest order first, answered with 0x55\n\
               \t* page data, answered with 0x55\n\
               \t* CRC-32 of the data, 4 bytes lowest order first, answered \
                   with 0x77\n\
               \t* 0x55 from the device once the page is written\n\
            \n\
            Finally 0xA2 reboots the device into the new firmware. Any \
            unexpected answer aborts the upload.\
        ",
        )
        .max_term_width(80)
        .setting(ColoredHelp)
        .setting(NextLineHelp)
        .arg(
            Arg::with_name("DEVICE_TTY")
                .help("the serial device of the bootloader")
                .long_help(
                    "the serial device of the bootloader; when not set, \
                     the device can be selected out of the serial ports \
                     present on the system.",
                )
                .short("-t")
                .long("--tty")
                .takes_value(true)
                .require_equals(true),
        )
        .arg(
            Arg::with_name("BAUD_RATE")
                .help("serial port baud rate")
                .short("-b")
                .long("--baud-rate")
                .takes_value(true)
                .default_value("57600")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("TIMEOUT")
                .help("seconds to wait for each answer of the bootloader")
                .long("--timeout")
                .takes_value(true)
                .default_value("3")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("BL_SIZE")
                .help("bootloader size")
                .long_help(
                    "bootloader size; the flash below this address is never \
                     overwritten.",
                )
                .long("--bl-size")
                .takes_value(true)
                .default_value("0x400")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("FL_SIZE")
                .help("flash size, only existing flash is written")
                .long("--fl-size")
                .takes_value(true)
                .default_value("0x4000")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("PAGE_SIZE")
                .help("flash page size")
                .long("--page-size")
                .takes_value(true)
                .default_value("64")
                .require_equals(true),
        )
        .arg(
            Arg::with_name("BL_INIT")
                .help("sequence to reboot into the bootloader (hex string)")
                .long_help(
                    "sequence to reboot into the bootloader (hex string); \
                     when not set, the bootloader is expected to be \
                     running already.",
                )
                .long("--bl-init")
                .takes_value(true)
                .require_equals(true),
        )
        .arg(
            Arg::with_name("STRICT")
                .help("exit when the hex file has data outside of the writable flash")
                .short("-s")
                .long("--strict"),
        )
        .arg(
            Arg::with_name("HEX_FILE")
                .help("path to the hex file to be uploaded")
                .default_value("main.hex")
                .index(1),
        )
        .arg(Arg::with_name("v").short("v").multiple(true).help(
            "Sets the logging level of verbosity, repeat several times for \
                higher verbosity",
        ))
        .get_matches();

    // Vary the output based on how many times the user used the "verbose" flag
    // (i.e. 'uartboot -v -v -v' or 'uartboot -vvv' vs 'uartboot -v'
    let log_level = match matches.occurrences_of("v") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    TermLogger::init(
        log_level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .unwrap();

    trace!("{:#?}", matches);

    let settings = match settings_from(&matches) {
        Ok(settings) => settings,
        Err(e) => exit_with(e),
    };
    debug!("{:#?}", settings);

    match ub::flash(&settings) {
        Ok(report) => {
            debug!("{:?}", report);
            println!(
                "[UB] 🎉 Finished, {} pages written.",
                style(report.pages_written).green()
            );
        }
        Err(e) => exit_with(e),
    }
}

/// Turn the command line arguments into `Settings`.
fn settings_from(matches: &ArgMatches) -> Result<ub::Settings, Error> {
    // It's safe to call unwrap on all command line arguments with default
    // values, because the value with either be what the user input at runtime
    // or the default value

    let baud_rate = value_t!(matches.value_of("BAUD_RATE"), u32)
        .map_err(|e| Error::Config(format!("baud-rate: {}", e)))?;
    let timeout = value_t!(matches.value_of("TIMEOUT"), u64)
        .map_err(|e| Error::Config(format!("timeout: {}", e)))?;

    let mut builder = ub::SettingsBuilder::new()
        .baud_rate(baud_rate)
        .timeout(Duration::from_secs(timeout))
        .bootloader_size(ub::parse_number(matches.value_of("BL_SIZE").unwrap())?)
        .flash_size(ub::parse_number(matches.value_of("FL_SIZE").unwrap())?)
        .page_size(ub::parse_number(matches.value_of("PAGE_SIZE").unwrap())?)
        .strict(matches.is_present("STRICT"))
        .hex_file(matches.value_of("HEX_FILE").unwrap());

    // Arguments with NO default values

    if let Some(path) = matches.value_of("DEVICE_TTY") {
        builder = builder.path(path);
    }

    if let Some(sequence) = matches.value_of("BL_INIT") {
        builder = builder.init_sequence(ub::parse_init_sequence(sequence)?);
    }

    Ok(builder.finalize())
}

fn exit_with(e: Error) -> ! {
    error!("{:?}", e);
    println!("{} {}", style("[UB] 💥").red(), style(&e).red());
    debug!("exit code: {}", e.exit_code());
    process::exit(e.exit_code());
}
