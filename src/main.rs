//! Weft CLI
//!
//! Renders a named template from a template directory, or template
//! source piped on stdin. Context variables come from a TOML file.

use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;
use std::process;

use clap::Parser;

use weft::{Context, DirStore, Engine, TemplateStore};

#[derive(Parser)]
#[command(name = "weft")]
#[command(about = "Render text templates with control tags and includes")]
struct Cli {
    /// Template name to render (reads template source from stdin if not provided)
    template: Option<String>,

    /// Directory templates are loaded from
    #[arg(short = 'd', long, default_value = "templates")]
    templates: PathBuf,

    /// TOML file with context variables
    #[arg(short, long)]
    context: Option<PathBuf>,

    /// Nested include limit
    #[arg(long, default_value_t = weft::DEFAULT_MAX_INCLUDE_DEPTH)]
    max_include_depth: usize,
}

fn main() {
    let cli = Cli::parse();

    let context = match &cli.context {
        Some(path) => {
            let text = match fs::read_to_string(path) {
                Ok(text) => text,
                Err(e) => {
                    eprintln!("Error reading context file '{}': {}", path.display(), e);
                    process::exit(1);
                }
            };
            match Context::from_toml_str(&text) {
                Ok(ctx) => ctx,
                Err(e) => {
                    eprintln!("Error in context file '{}': {}", path.display(), e);
                    process::exit(1);
                }
            }
        }
        None => Context::new(),
    };

    let store = DirStore::new(&cli.templates);

    let (name, source) = match &cli.template {
        Some(name) => match store.load(name) {
            Ok(source) => (name.clone(), source),
            Err(e) => {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
        },
        None => {
            if io::stdin().is_terminal() {
                eprintln!("No template given and stdin is a terminal; see --help");
                process::exit(2);
            }
            let mut source = String::new();
            if let Err(e) = io::stdin().read_to_string(&mut source) {
                eprintln!("Error reading stdin: {}", e);
                process::exit(1);
            }
            ("<stdin>".to_string(), source)
        }
    };

    // Parse up front so source faults come out as annotated reports
    if let Err(e) = weft::parse(&source) {
        eprint!("{}", e.format(&source, &name));
        process::exit(1);
    }

    let engine = Engine::new(store).with_max_include_depth(cli.max_include_depth);
    match engine.render_str(&source, &context) {
        Ok(output) => print!("{}", output),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}
