use clap::{Parser, Subcommand};
use rulecraft_lib::pipeline::rulecraft;
use rulecraft_lib::{EngineConfig, Result, SheetDefinition};
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rulecraft")]
#[command(about = "Compile, inject and measure nested CSS rule sheets")]
struct Args {
    /// Engine config file (TOML).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the compiled CSS of a sheet definition.
    Compile {
        sheet: PathBuf,
        #[arg(short, long)]
        minify: bool,
    },
    /// Report how many elements of a page each rule matches.
    Coverage { sheet: PathBuf, html: PathBuf },
    /// Inject the sheet into a page and print the resulting HTML.
    Inject {
        sheet: PathBuf,
        html: PathBuf,
        /// Inject as a <link> with a data URI instead of a <style> element.
        #[arg(short, long)]
        link: bool,
    },
}

fn run(args: Args) -> Result<String> {
    let config = match &args.config {
        Some(path) => EngineConfig::load_from_file(path)?,
        None => EngineConfig::load_or_default("rulecraft.toml"),
    };

    match args.command {
        Command::Compile { sheet, minify } => {
            let definition = SheetDefinition::load_from_file(&sheet)?;
            rulecraft::compile(&config, &definition, minify)
        }
        Command::Coverage { sheet, html } => {
            let definition = SheetDefinition::load_from_file(&sheet)?;
            let html_content = fs::read_to_string(&html)?;
            rulecraft::coverage(&config, &definition, &html_content)
        }
        Command::Inject { sheet, html, link } => {
            let definition = SheetDefinition::load_from_file(&sheet)?;
            let html_content = fs::read_to_string(&html)?;
            rulecraft::inject(&config, &definition, &html_content, link.then_some(true))
        }
    }
}

fn main() {
    env_logger::init();

    // parse the args given in terminal
    let args: Args = Args::parse();

    match run(args) {
        Ok(output) => print!("{}", output),
        Err(e) => {
            log::debug!("command failed: {:?}", e);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
