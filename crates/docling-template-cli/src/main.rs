//! docling-template: fill DOCX/ODT templates from JSON data

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use docling_template::{pages_from_str, Template, TemplateOptions};
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration file layout
///
/// ```toml
/// [fill]
/// ignore_missing_value = true
/// insert_hard_page_breaks = false
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
struct Config {
    /// Generation defaults; command-line flags override them
    fill: TemplateOptions,
}

impl Config {
    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file {}: {e}", path.display()))
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "docling-template",
    about = "Fill DOCX and ODT templates with data",
    long_about = "Fill DOCX and ODT templates with data.\n\
                  \n\
                  Placeholders are MERGEFIELD/DOCVARIABLE fields (DOCX) or user fields\n\
                  and placeholders (ODT). One page is generated per data object.",
    version
)]
struct Args {
    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Show detailed processing information
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a document from a template and a JSON data file
    Fill {
        /// Template document (.docx or .odt)
        #[arg(value_name = "TEMPLATE")]
        template: PathBuf,

        /// JSON data: one page object or an array of page objects
        #[arg(value_name = "DATA")]
        data: PathBuf,

        /// Output file (defaults to the template name with a -filled suffix)
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,

        /// TOML configuration file with a [fill] table
        #[arg(short, long, value_name = "CONFIG")]
        config: Option<PathBuf>,

        /// Remove placeholders without a value instead of failing
        #[arg(long)]
        ignore_missing_value: bool,

        /// Produce an empty document when the data has no pages
        #[arg(long)]
        ignore_missing_pages: bool,

        /// Accept templates of an unsupported version or document kind
        #[arg(long)]
        ignore_version: bool,

        /// Embed linked images that can be read from disk
        #[arg(long)]
        embed_images: bool,

        /// Do not insert page breaks between pages
        #[arg(long)]
        no_page_breaks: bool,

        /// Emit legacy VML pictures (DOCX)
        #[arg(long)]
        legacy_pictures: bool,

        /// Overwrite an existing output file
        #[arg(short, long)]
        force: bool,
    },

    /// List the placeholder keys of a template
    Fields {
        /// Template document (.docx or .odt)
        #[arg(value_name = "TEMPLATE")]
        template: PathBuf,
    },

    /// Print the default configuration as TOML
    Config,
}

fn init_logging(quiet: bool, verbose: bool) {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Stderr)
        .init();
}

fn default_output(template: &Path) -> PathBuf {
    let stem = template
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    let extension = template
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("docx");
    template.with_file_name(format!("{stem}-filled.{extension}"))
}

fn load_template(path: &Path) -> Result<Template> {
    Template::from_file(path).with_context(|| format!("Failed to load template: {}", path.display()))
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.quiet, args.verbose);

    match args.command {
        Commands::Fill {
            template,
            data,
            output,
            config,
            ignore_missing_value,
            ignore_missing_pages,
            ignore_version,
            embed_images,
            no_page_breaks,
            legacy_pictures,
            force,
        } => {
            let config = match config {
                Some(path) => Config::load_from_file(&path)?,
                None => Config::default(),
            };
            // CLI flags only ever switch behaviour on over the config
            let mut options = config.fill;
            options.ignore_missing_value |= ignore_missing_value;
            options.ignore_missing_data_pages |= ignore_missing_pages;
            options.ignore_version_mismatch |= ignore_version;
            options.embed_external_images |= embed_images;
            if no_page_breaks {
                options.insert_hard_page_breaks = false;
            }
            if legacy_pictures {
                options.prefer_modern_picture_element = false;
            }

            let output = output.unwrap_or_else(|| default_output(&template));
            if output.exists() && !force {
                bail!(
                    "Output file already exists: {} (use --force to overwrite)",
                    output.display()
                );
            }

            let json = fs::read_to_string(&data)
                .with_context(|| format!("Failed to read data file: {}", data.display()))?;
            let pages = pages_from_str(&json, data.parent())
                .with_context(|| format!("Invalid data file: {}", data.display()))?;

            let template = load_template(&template)?.with_options(options);
            info!(
                "filling {} template with {} page(s)",
                template.format(),
                pages.len()
            );
            template
                .generate_to_file(&pages, &output)
                .context("Generation failed")?;
            if !args.quiet {
                println!("{}", output.display());
            }
        }
        Commands::Fields { template } => {
            for key in load_template(&template)?.placeholder_keys()? {
                println!("{key}");
            }
        }
        Commands::Config => {
            let text = toml::to_string_pretty(&Config::default())
                .context("Failed to serialize configuration")?;
            print!("{text}");
        }
    }
    Ok(())
}
