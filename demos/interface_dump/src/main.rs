use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};

use swiftsection::demangle::DefaultDemangler;
use swiftsection::index::{
    InterfaceIndexer, Printer, PrinterConfiguration, SectionMetadataReader, Storage,
    SwiftInterfaceIndexConfiguration, TracingEventSink,
};
use swiftsection::macho::MachImage;

fn execute(matches: &ArgMatches) -> Result<()> {
    let path = matches.get_one::<PathBuf>("path").expect("required");
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    // `InterfaceIndexer` holds its `MetadataReader` as `Box<dyn MetadataReader>`
    // (implicitly `'static`), so the backing bytes need to outlive the whole
    // run; leaking them is fine for a single-shot CLI process.
    let data: &'static [u8] = Box::leak(bytes.into_boxed_slice());
    let image = MachImage::parse(data).context("failed to parse Mach-O image")?;

    let metadata = SectionMetadataReader::from_image(&image);
    let storage = Storage::build(&image, &DefaultDemangler);

    let config = SwiftInterfaceIndexConfiguration::new().show_c_imported_types(matches.get_flag("c-imported"));
    let mut indexer = InterfaceIndexer::new(storage, Box::new(metadata), config, Box::new(TracingEventSink));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .context("failed to start the async runtime")?;
    runtime
        .block_on(indexer.prepare())
        .context("indexing failed")?;

    let mut printer_config = PrinterConfiguration::minimal();
    if matches.get_flag("offsets") {
        printer_config = printer_config.emit_offset_comments(true);
    }

    let printer = Printer::new(indexer.storage(), printer_config);
    for chunk in printer.print_index(&indexer) {
        print!("{}", chunk.text);
    }

    Ok(())
}

fn main() {
    tracing_subscriber::fmt::init();

    let matches = Command::new("interface_dump")
        .about("Reconstructs and prints the declarative Swift interface of a Mach-O image.")
        .arg(
            Arg::new("path")
                .number_of_values(1)
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("The path to the Mach-O image."),
        )
        .arg(
            Arg::new("offsets")
                .long("offsets")
                .action(ArgAction::SetTrue)
                .help("Annotate each member with its symbol's offset."),
        )
        .arg(
            Arg::new("c-imported")
                .long("show-c-imported-types")
                .action(ArgAction::SetTrue)
                .help("Include types imported from C."),
        )
        .get_matches();

    match execute(&matches) {
        Ok(()) => (),
        Err(err) => eprintln!("{err:?}"),
    }
}
