use crate::CLAP_STYLING;
use clap::{arg, command};
use url::Url;

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("nexus")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("nexus")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Suppress banner and non-essential output")
                .required(false)
                .global(true),
        )
        .arg(
            arg!(-v --"verbose" "Log engine decisions (overridden by RUST_LOG)")
                .required(false)
                .global(true),
        )
        .subcommand_required(false)
        .subcommand(
            command!("init")
                .about("Initializes the nexus database on your filesystem")
                .arg(
                    arg!([PATH])
                        .required(false)
                        .help("Location to store the nexus database")
                        .default_value("~/.config/nexus/"),
                )
                .arg(
                    arg!(-f --"force")
                        .help("Overwrite any existing database at the specified location.")
                        .required(false),
                ),
        )
        .subcommand(
            command!("crawl")
                .about(
                    "Open a workspace page and record every page and link observed from it. \
                Contributes findings to the graph.",
                )
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(true)
                        .help("The workspace page to start from")
                        .value_parser(clap::value_parser!(Url)),
                )
                .arg(
                    arg!(-a --"auto-browse")
                        .required(false)
                        .help("Walk the workspace breadth-first from the sidebar")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(-d --"max-depth" <DEPTH>)
                        .required(false)
                        .help("Deepest link level auto-browse follows")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("3"),
                )
                .arg(
                    arg!(--"duration" <SECONDS>)
                        .required(false)
                        .help("Stop recording after this many seconds (default: until Ctrl-C or auto-browse ends)")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(
                    arg!(-m --"domain-marker" <MARKER>)
                        .required(false)
                        .help("Substring identifying in-scope links")
                        .default_value("notion.so"),
                )
                .arg(db_arg()),
        )
        .subcommand(
            command!("graph")
                .about("Report the recorded graph")
                .arg(db_arg())
                .arg(
                    arg!(-f --"format" <FORMAT>)
                        .required(false)
                        .help("Report format: text, json, csv, markdown")
                        .value_parser(["text", "json", "csv", "markdown"])
                        .default_value("text"),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Save report to file (default: display to screen)")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                ),
        )
        .subcommand(
            command!("status")
                .about("Show scan flags, auto-browse progress and graph size")
                .arg(db_arg()),
        )
        .subcommand(
            command!("clear")
                .about("Forget the recorded graph and reset the scan flags")
                .arg(db_arg()),
        )
}

fn db_arg() -> clap::Arg {
    arg!(--"db" <PATH>)
        .required(false)
        .help("Database file")
        .default_value("~/.config/nexus/nexus.db")
}
