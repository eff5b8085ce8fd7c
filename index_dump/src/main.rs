use anyhow::{bail, Context, Result};
use clap::{App, Arg};
use segment_index::log::index_config::IndexConfigProperties;
use segment_index::log::index_file::offset_from_file_name;
use segment_index::{AbstractIndex, OffsetIndex, OffsetIndexOptions, ENTRY_WIDTH};
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::Level;
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

fn main() {
    match main_processor() {
        Ok(()) => info!("Exiting successfully."),
        Err(err) => {
            error!("Exiting with error: {:?}", err);
            std::process::exit(1);
        },
    }
}

fn main_processor() -> Result<()> {
    let matches = App::new("index_dump")
        .version("0.0")
        .author("Seb Ospina <kraige@gmail.com>")
        .about("Prints the entries of a segment offset index")
        .arg(Arg::new("INPUT").help("The .index file to dump").index(1))
        .arg(
            Arg::new("base_offset")
                .long("base-offset")
                .takes_value(true)
                .help("Base offset of the segment, defaults to the one in the file name"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .takes_value(true)
                .help("A .properties file to locate the index when no INPUT is given"),
        )
        .arg(
            Arg::new("verbosity_level")
                .short('v')
                .takes_value(true)
                .default_value("warn")
                .help("Sets the level of verbosity"),
        )
        .get_matches();
    let verbosity = matches.value_of("verbosity_level").unwrap_or("warn");
    let subscriber = FmtSubscriber::builder()
        .with_max_level(verbosity.parse::<Level>()?)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let options = resolve_options(
        matches.value_of("INPUT"),
        matches.value_of("base_offset"),
        matches.value_of("config"),
    )?;
    let stdout = io::stdout();
    dump(options, &mut stdout.lock())
}

/// Works out which file to dump, an explicit INPUT or the one derived from the configured
/// `log.dir`. Either way the file is later mapped read only at its current length.
fn resolve_options(
    input: Option<&str>,
    base_offset: Option<&str>,
    config: Option<&str>,
) -> Result<OffsetIndexOptions> {
    let base_offset = match base_offset {
        Some(val) => {
            Some(val.parse::<i64>().with_context(|| format!("Invalid base offset {}", val))?)
        },
        None => None,
    };
    if let Some(input) = input {
        let path = PathBuf::from(input);
        let base_offset = match base_offset.or_else(|| offset_from_file_name(&path)) {
            Some(val) => val,
            None => bail!("Unable to tell the base offset of {}, use --base-offset", input),
        };
        let bytes = usize::try_from(fs_err::metadata(&path)?.len())?;
        if bytes < ENTRY_WIDTH {
            bail!("{} is too small to hold any entry", input);
        }
        if bytes % ENTRY_WIDTH != 0 {
            bail!("{} is {} bytes, not a multiple of {}", input, bytes, ENTRY_WIDTH);
        }
        return Ok(OffsetIndexOptions::new(path, bytes, base_offset));
    }
    let base_offset = match base_offset {
        Some(val) => val,
        None => bail!("Either an INPUT file or --base-offset must be provided"),
    };
    let mut config_properties = match config {
        Some(config_file) => IndexConfigProperties::read_config_file(config_file)?,
        None => IndexConfigProperties::default(),
    };
    let options = config_properties.build()?.offset_index_options(base_offset);
    if !options.path.exists() {
        bail!("Index file {} does not exist", options.path.display());
    }
    Ok(options)
}

fn dump<W: Write>(options: OffsetIndexOptions, out: &mut W) -> Result<()> {
    info!("Dumping {}", options.path.display());
    let index = OffsetIndex::open_read_only(options)?;
    index.initialize_position()?;
    writeln!(
        out,
        "Dumping {} base_offset: {} entries: {}/{}",
        index.path().display(),
        index.base_offset(),
        index.entries(),
        index.max_entries()
    )?;
    for entry in index.scanner() {
        let entry = entry?;
        writeln!(
            out,
            "offset: {} position: {} size: {}",
            entry.offset, entry.position, entry.size
        )?;
    }
    Ok(())
}
