use anyhow::{Context, Result, bail};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use dialoguer::Confirm;
use indoc::indoc;
use log::{LevelFilter, debug, warn};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use ptom::{
    CancellationToken, FormatOptions, IndentMode, PFileParser, ParseOutcome, ParserSettings, StatusCode,
    default_output_path, parse_with_settings,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::exit;

struct PtomDump {
    parser_settings: ParserSettings,
    cancellation: CancellationToken,
    inputs: Vec<PathBuf>,
    output: Option<PathBuf>,
    to_stdout: bool,
    confirm_overwrite: bool,
    num_threads: usize,
    verbosity_level: Option<LevelFilter>,
}

impl PtomDump {
    pub fn from_cli_matches(matches: &ArgMatches) -> Result<Self> {
        let inputs: Vec<PathBuf> = matches
            .get_many::<PathBuf>("INPUT")
            .context("at least one input is required")?
            .cloned()
            .collect();

        let output = matches.get_one::<PathBuf>("output-target").cloned();
        if output.is_some() && inputs.len() > 1 {
            bail!("`--output` can only be used with a single input");
        }

        let indent_mode = match matches
            .get_one::<String>("indent-mode")
            .map(String::as_str)
            .unwrap_or("all-functions")
        {
            "nested-functions" => IndentMode::OnlyNestedFunctions,
            "classic" => IndentMode::Classic,
            _ => IndentMode::AllFunctions,
        };

        let format_options = FormatOptions::new()
            .indent_width(*matches.get_one::<usize>("indent-width").unwrap_or(&4))
            .indent_mode(indent_mode)
            .separate_blocks(!matches.get_flag("no-separate-blocks"));

        let num_threads = matches.get_one::<usize>("num-threads").copied().unwrap_or(0);
        let num_threads = match (cfg!(feature = "multithreading"), num_threads) {
            (true, number) => number,
            (false, 0 | 1) => 1,
            (false, _) => {
                eprintln!(
                    "turned on threads, but library was compiled without `multithreading` feature! converting sequentially"
                );
                1
            }
        };

        let verbosity_level = match matches.get_count("verbose") {
            0 => None,
            1 => Some(LevelFilter::Info),
            2 => Some(LevelFilter::Debug),
            3 => Some(LevelFilter::Trace),
            _ => {
                eprintln!("using more than  -vvv does not affect verbosity level");
                Some(LevelFilter::Trace)
            }
        };

        let cancellation = CancellationToken::new();

        Ok(PtomDump {
            parser_settings: ParserSettings::new()
                .format_options(format_options)
                .raw_output(matches.get_flag("raw"))
                .enforce_minor_version(!matches.get_flag("no-minor-version-check"))
                .cancellation(cancellation.clone()),
            cancellation,
            inputs,
            output,
            to_stdout: matches.get_flag("stdout"),
            confirm_overwrite: !matches.get_flag("no-confirm-overwrite"),
            num_threads,
            verbosity_level,
        })
    }

    /// Main entry point for `PtomDump`. Returns the process exit code.
    pub fn run(&self) -> i32 {
        self.try_to_initialize_logging();
        self.install_interrupt_handler();

        if self.to_stdout {
            return self.dump_to_stdout();
        }

        let jobs: Vec<(PathBuf, PathBuf)> = self
            .inputs
            .iter()
            .map(|input| {
                let output = self
                    .output
                    .clone()
                    .unwrap_or_else(|| default_output_path(input));
                (input.clone(), output)
            })
            .collect();

        // Prompts happen up front and in order, never from worker threads.
        let mut outcomes: Vec<Option<ParseOutcome>> = jobs
            .iter()
            .map(|(_, output)| self.confirm_output(output).err())
            .collect();

        let pending: Vec<(usize, &(PathBuf, PathBuf))> = jobs
            .iter()
            .enumerate()
            .filter(|(i, _)| outcomes[*i].is_none())
            .collect();

        for (i, outcome) in self.convert_all(&pending) {
            outcomes[i] = Some(outcome);
        }

        let mut exit_code = StatusCode::Success.as_i32();
        for ((input, _), outcome) in jobs.iter().zip(outcomes.into_iter().flatten()) {
            if outcome.is_success() {
                println!("{}: {}", input.display(), outcome.message);
            } else {
                eprintln!("{}: {}", input.display(), outcome.message);
                if exit_code == StatusCode::Success.as_i32() {
                    exit_code = outcome.code.as_i32();
                }
            }
        }

        exit_code
    }

    #[cfg(feature = "multithreading")]
    fn convert_all(&self, jobs: &[(usize, &(PathBuf, PathBuf))]) -> Vec<(usize, ParseOutcome)> {
        use rayon::prelude::*;

        let convert = || -> Vec<(usize, ParseOutcome)> {
            jobs.par_iter()
                .map(|(i, (input, output))| (*i, self.convert(input, output)))
                .collect()
        };

        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads)
            .build()
        {
            Ok(pool) => pool.install(convert),
            Err(e) => {
                warn!("Failed to build thread pool ({}), converting sequentially", e);
                jobs.iter()
                    .map(|(i, (input, output))| (*i, self.convert(input, output)))
                    .collect()
            }
        }
    }

    #[cfg(not(feature = "multithreading"))]
    fn convert_all(&self, jobs: &[(usize, &(PathBuf, PathBuf))]) -> Vec<(usize, ParseOutcome)> {
        jobs.iter()
            .map(|(i, (input, output))| (*i, self.convert(input, output)))
            .collect()
    }

    fn convert(&self, input: &Path, output: &Path) -> ParseOutcome {
        parse_with_settings(input, output, self.parser_settings.clone())
    }

    fn dump_to_stdout(&self) -> i32 {
        let mut exit_code = StatusCode::Success.as_i32();
        let stdout = io::stdout();

        for input in &self.inputs {
            let decoded = PFileParser::from_path(input).and_then(|parser| {
                parser
                    .with_configuration(self.parser_settings.clone())
                    .decode_formatted()
            });

            match decoded {
                Ok(source) => {
                    let mut out = stdout.lock();
                    if let Err(e) = out.write_all(source.as_bytes()).and_then(|_| out.flush()) {
                        eprintln!("{}", e);
                        return StatusCode::WriteFailure.as_i32();
                    }
                }
                Err(e) => {
                    eprintln!("{}: {}", input.display(), e);
                    if exit_code == StatusCode::Success.as_i32() {
                        exit_code = e.status_code().as_i32();
                    }
                }
            }
        }

        exit_code
    }

    /// If `confirm_overwrite` is set, asks before replacing an existing file.
    fn confirm_output(&self, path: &Path) -> std::result::Result<(), ParseOutcome> {
        if path.is_dir() {
            return Err(ParseOutcome {
                code: StatusCode::WriteFailure,
                message: format!(
                    "There is a directory at {}, refusing to overwrite",
                    path.display()
                ),
            });
        }

        if !path.exists() || !self.confirm_overwrite {
            return Ok(());
        }

        match Confirm::new()
            .with_prompt(format!(
                "Are you sure you want to override output file at {}",
                path.display()
            ))
            .default(false)
            .interact()
        {
            Ok(true) => Ok(()),
            Ok(false) => Err(ParseOutcome {
                code: StatusCode::Cancelled,
                message: "Cancelled".to_owned(),
            }),
            Err(e) => Err(ParseOutcome {
                code: StatusCode::WriteFailure,
                message: format!(
                    "Failed to write confirmation prompt to term caused by\n{}",
                    e
                ),
            }),
        }
    }

    /// Ctrl+C trips the shared token; running conversions stop at the next stage boundary.
    fn install_interrupt_handler(&self) {
        let cancellation = self.cancellation.clone();
        match ctrlc::set_handler(move || {
            eprintln!("Interrupted, cancelling");
            cancellation.cancel();
        }) {
            Ok(()) => debug!("Installed interrupt handler"),
            Err(e) => warn!("Failed to install interrupt handler: {}", e),
        }
    }

    fn try_to_initialize_logging(&self) {
        if let Some(level) = self.verbosity_level {
            if let Err(e) = TermLogger::init(
                level,
                Config::default(),
                TerminalMode::Stderr,
                ColorChoice::Auto,
            ) {
                eprintln!("Failed to initialize logging: {}", e);
            }
        }
    }
}

fn command() -> Command {
    Command::new("ptom_dump")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Utility to decode MATLAB/Octave p-code (.p) files back to source (.m)")
        .arg(
            Arg::new("INPUT")
                .required(true)
                .num_args(1..)
                .value_parser(value_parser!(PathBuf))
                .help("One or more .p files."),
        )
        .arg(
            Arg::new("output-target")
                .long("output")
                .short('f')
                .value_parser(value_parser!(PathBuf))
                .help("Writes output to the file specified instead of `<INPUT>.m` (single input only).")
                .long_help(indoc!(r#"
                    Writes output to the file specified instead of next to the input with a `.m` extension.
                    Will ask for confirmation before overwriting files, to allow overwriting, pass `--no-confirm-overwrite`.
                    Will create parent directories if needed.
                "#)),
        )
        .arg(
            Arg::new("stdout")
                .long("stdout")
                .action(ArgAction::SetTrue)
                .conflicts_with("output-target")
                .help("Print decoded source to stdout instead of writing files."),
        )
        .arg(
            Arg::new("no-confirm-overwrite")
                .long("no-confirm-overwrite")
                .action(ArgAction::SetTrue)
                .help("When set, will not ask for confirmation before overwriting files, useful for automation"),
        )
        .arg(
            Arg::new("raw")
                .long("raw")
                .action(ArgAction::SetTrue)
                .help("Skip formatting and emit the decoded token text as is."),
        )
        .arg(
            Arg::new("indent-width")
                .long("indent-width")
                .value_parser(value_parser!(usize))
                .default_value("4")
                .help("Number of spaces per indentation level."),
        )
        .arg(
            Arg::new("indent-mode")
                .long("indent-mode")
                .value_parser(["all-functions", "nested-functions", "classic"])
                .default_value("all-functions")
                .help("Which function bodies are indented")
                .long_help(indoc!(r#"
                    Which function bodies are indented:
                        "all-functions"    - every function body.
                        "nested-functions" - only functions nested in another function.
                        "classic"          - no function bodies.
                "#)),
        )
        .arg(
            Arg::new("no-separate-blocks")
                .long("no-separate-blocks")
                .action(ArgAction::SetTrue)
                .help("Do not put blank lines between top-level functions."),
        )
        .arg(
            Arg::new("no-minor-version-check")
                .long("no-minor-version-check")
                .action(ArgAction::SetTrue)
                .help("Attempt to decode containers whose minor version tag is not `v00.00`."),
        )
        .arg(
            Arg::new("num-threads")
                .short('t')
                .long("threads")
                .value_parser(value_parser!(usize))
                .default_value("0")
                .help("Sets the number of worker threads when converting several files, defaults to number of CPU cores."),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .action(ArgAction::Count)
                .help("-v - info, -vv - debug, -vvv - trace. Logs are written to stderr."),
        )
}

fn main() {
    let matches = command().get_matches();

    let app = match PtomDump::from_cli_matches(&matches) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("{:#}", e);
            exit(StatusCode::Other.as_i32())
        }
    };

    exit(app.run());
}
