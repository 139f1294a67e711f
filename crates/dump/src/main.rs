use std::fs::File;
use std::io::BufReader;
use std::process::ExitCode;

use log::{debug, error, LevelFilter};

use joss_stream::ObjectStream;

mod options;
mod printer;

use options::OptionTable;
use printer::DumpConfig;

fn option_table() -> OptionTable {
    let mut table = OptionTable::new();
    table.add("help", 0, "Show this list.");
    table.add("debug", 0, "Write debug info generated during parsing to stderr.");
    table.add(
        "filter",
        1,
        "Exclude classes matching the given regex from class output.",
    );
    table.add("nocontent", 0, "Don't output descriptions of the content in the stream.");
    table.add("noinstances", 0, "Don't output descriptions of every instance.");
    table.add("showarrays", 0, "Show array class declarations (e.g. int[]).");
    table.add(
        "noconnect",
        0,
        "Don't attempt to connect member classes to their enclosing classes.",
    );
    table.add(
        "fixnames",
        0,
        "In class names, replace illegal identifier characters with legal ones.",
    );
    table.add("noclasses", 0, "Don't output class declarations.");
    table.add("blockdata", 1, "Write raw blockdata out to the specified file.");
    table.add(
        "blockdatamanifest",
        1,
        "Write blockdata manifest out to the specified file.",
    );
    table
}

fn main() -> ExitCode {
    let table = option_table();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let opts = match table.parse(&args) {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("argument error: {e}");
            eprint!("{}", table.describe());
            return ExitCode::from(1);
        }
    };
    if opts.has("help") {
        print!("{}", table.describe());
        return ExitCode::from(1);
    }
    if opts.files().is_empty() {
        eprintln!("usage: [options] file1 [file2 .. fileN]");
        eprint!("{}", table.describe());
        return ExitCode::from(1);
    }

    pretty_env_logger::formatted_builder()
        .filter_level(if opts.has("debug") {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        })
        .init();

    let config = match DumpConfig::from_options(&opts) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("argument error: bad -filter pattern: {e}");
            return ExitCode::from(1);
        }
    };

    let mut failed = false;
    for path in opts.files() {
        debug!("parsing {path}");
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                error!("error while attempting to open '{path}': {e}");
                failed = true;
                continue;
            }
        };
        let stream = match ObjectStream::parse_with(BufReader::new(file), !opts.has("noconnect")) {
            Ok(stream) => stream,
            Err(e) => {
                error!("error while attempting to decode file '{path}': {e}");
                failed = true;
                continue;
            }
        };
        if let Err(e) = printer::dump(&stream, &config) {
            error!("error while writing output for '{path}': {e}");
            failed = true;
        }
    }
    if failed {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}
