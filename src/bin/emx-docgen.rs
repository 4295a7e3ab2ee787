//! emx-docgen CLI
//!
//! Serve the document generator over HTTP, or run it on local files.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use emx_docgen::config::{DEFAULT_PORT, DEFAULT_UPLOAD_LIMIT};
use emx_docgen::scanner::{DEFAULT_END, DEFAULT_START};
use emx_docgen::{
    Decoder, Delimiters, DocgenError, Generator, RenderOptions, Renderer, ServerConfig,
};
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "emx-docgen")]
#[command(author = "nzinfo <li.monan@gmail.com>")]
#[command(version)]
#[command(about = "DOCX template rendering tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP service
    Serve {
        /// Address to listen on
        #[arg(long, env = "DOCGEN_BIND", default_value = "0.0.0.0")]
        bind: IpAddr,

        /// Port to listen on
        #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Maximum template upload size in bytes
        #[arg(long, env = "DOCGEN_UPLOAD_LIMIT", default_value_t = DEFAULT_UPLOAD_LIMIT)]
        upload_limit: usize,

        #[command(flatten)]
        delimiters: DelimiterArgs,
    },

    /// Render a template with a JSON data file
    Render {
        /// Template document
        #[arg(short = 't', long)]
        template: PathBuf,

        /// JSON object with the data
        #[arg(short = 'd', long)]
        data: PathBuf,

        /// Output document
        #[arg(short = 'o', long, default_value = "generated.docx")]
        output: PathBuf,

        #[command(flatten)]
        delimiters: DelimiterArgs,
    },

    /// List contents of a template
    #[command(name = "t")]
    List {
        /// Template document
        #[arg(short = 'i', long)]
        input: PathBuf,

        /// Also list the tokens of each template part
        #[arg(short, long)]
        verbose: bool,

        #[command(flatten)]
        delimiters: DelimiterArgs,
    },
}

#[derive(clap::Args, Debug)]
struct DelimiterArgs {
    /// Token start marker
    #[arg(long, env = "DOCGEN_DELIMITER_START", default_value = DEFAULT_START)]
    delimiter_start: String,

    /// Token end marker
    #[arg(long, env = "DOCGEN_DELIMITER_END", default_value = DEFAULT_END)]
    delimiter_end: String,
}

impl DelimiterArgs {
    fn render_options(&self) -> Result<RenderOptions> {
        let delimiters = Delimiters::new(self.delimiter_start.as_str(), self.delimiter_end.as_str())
            .context("Delimiters must not be empty")?;
        Ok(RenderOptions {
            delimiters,
            ..RenderOptions::default()
        })
    }
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { bind, port, upload_limit, delimiters } => {
            serve(bind, port, upload_limit, &delimiters)?;
        }
        Commands::Render { template, data, output, delimiters } => {
            render(&template, &data, &output, &delimiters)?;
        }
        Commands::List { input, verbose, delimiters } => {
            list_template(&input, verbose, &delimiters)?;
        }
    }

    Ok(())
}

fn serve(bind: IpAddr, port: u16, upload_limit: usize, delimiters: &DelimiterArgs) -> Result<()> {
    let generator = Generator::new().with_render_options(delimiters.render_options()?);
    let config = ServerConfig::new()
        .with_bind(bind)
        .with_port(port)
        .with_upload_limit(upload_limit)
        .with_generator(generator);

    let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
    runtime.block_on(emx_docgen::server::serve(config))
}

fn render(template: &Path, data: &Path, output: &Path, delimiters: &DelimiterArgs) -> Result<()> {
    let template_bytes = fs::read(template)
        .with_context(|| format!("Failed to read template: {}", template.display()))?;
    let payload = fs::read_to_string(data)
        .with_context(|| format!("Failed to read data: {}", data.display()))?;

    let generator = Generator::new().with_render_options(delimiters.render_options()?);
    let document = match generator.generate_from_json(&template_bytes, &payload) {
        Ok(document) => document,
        Err(e) => {
            print_render_errors(&e);
            return Err(e).with_context(|| format!("Failed to render: {}", template.display()));
        }
    };

    fs::write(output, &document)
        .with_context(|| format!("Failed to write: {}", output.display()))?;
    println!("Created: {} ({} bytes)", output.display(), document.len());

    Ok(())
}

fn print_render_errors(err: &DocgenError) {
    for entry in err.render_errors() {
        eprintln!("  {entry}");
    }
}

fn list_template(input: &Path, verbose: bool, delimiters: &DelimiterArgs) -> Result<()> {
    let archive = Decoder::new()
        .decode_file(input)
        .with_context(|| format!("Failed to open template: {}", input.display()))?;

    for entry in archive.entries() {
        if verbose {
            let kind = if entry.is_dir { "dir" } else { "file" };
            println!("{}  {}  {}", entry.name, kind, entry.data.len());
        } else {
            println!("{}", entry.name);
        }
    }

    if verbose {
        let renderer = Renderer::new(delimiters.render_options()?);
        for part in renderer.inspect(&archive)? {
            println!();
            println!("{}: {} tokens", part.entry, part.tokens.len());
            for token in &part.tokens {
                println!("  {}  {}", token.start, token.raw);
            }
            for error in &part.errors {
                println!("  error: {}", error.cause);
            }
        }
    }

    Ok(())
}
