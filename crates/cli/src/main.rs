use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fhir::StructuralValidator;
use v2fhir_core::{ConfigOverrides, Converter, MappingConfig, OutboundMessageType};

#[derive(Parser)]
#[command(name = "v2fhir")]
#[command(about = "HL7 v2 <-> FHIR R4 converter")]
struct Cli {
    /// Rule table to use instead of the built-in one (overrides V2FHIR_RULES)
    #[arg(long, global = true)]
    rules: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert an HL7 v2 message to a FHIR Bundle
    ToFhir {
        /// Message file (stdin when omitted)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Print compact instead of pretty JSON
        #[arg(long)]
        compact: bool,
        /// Run the structural validator on every resource
        #[arg(long)]
        validate: bool,
    },
    /// Convert a FHIR resource or Bundle to an HL7 v2 message
    ToHl7 {
        /// Outbound message type: adt-a01 or oru-r01
        #[arg(long)]
        message_type: OutboundMessageType,
        /// JSON file (stdin when omitted)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Terminate segments with LF instead of CR
        #[arg(long)]
        lf: bool,
        /// Run the structural validator on every resource
        #[arg(long)]
        validate: bool,
    },
    /// Load and validate a rule table, then summarise it
    CheckRules,
}

/// Entry point for the `v2fhir` binary.
///
/// Converted output goes to stdout. Logs, including every mapping warning, go to stderr.
///
/// # Environment Variables
/// - `V2FHIR_SENDING_APP`, `V2FHIR_SENDING_FACILITY`: MSH-3 and MSH-4 (default: "V2FHIR")
/// - `V2FHIR_RECEIVING_APP`, `V2FHIR_RECEIVING_FACILITY`: MSH-5 and MSH-6 (default: "V2FHIR")
/// - `V2FHIR_PROCESSING_ID`: MSH-11 (default: "P")
/// - `V2FHIR_HL7_VERSION`: MSH-12 (default: "2.5")
/// - `V2FHIR_RULES`: rule table file (default: built-in table)
/// - `RUST_LOG`: log filter, added to the default `v2fhir=info`
fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("v2fhir=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let rules_path = cli
        .rules
        .or_else(|| std::env::var_os("V2FHIR_RULES").map(PathBuf::from));
    let rules = load_rules(rules_path.as_deref())?;

    match cli.command {
        Some(Commands::ToFhir {
            input,
            compact,
            validate,
        }) => {
            let converter = converter(rules, validate)?;
            let raw = read_input(input.as_deref())?;
            let result = converter.convert_to_fhir(&raw)?;
            println!("{}", result.bundle.to_json(!compact)?);
        }
        Some(Commands::ToHl7 {
            message_type,
            input,
            lf,
            validate,
        }) => {
            let converter = converter(rules, validate)?;
            let json = read_input(input.as_deref())?;
            let result = converter.convert_to_hl7(&json, message_type)?;
            let message = if lf {
                result.message.replace('\r', "\n")
            } else {
                result.message
            };
            print!("{message}");
        }
        Some(Commands::CheckRules) => {
            for (name, mapping) in rules.mappings() {
                println!(
                    "{name}: {} <-> {}, {} forward and {} reverse rules",
                    mapping.forward.segment,
                    mapping.forward.resource,
                    mapping.forward.rules.len(),
                    mapping.reverse.rules.len()
                );
            }
        }
        None => {
            println!("Use 'v2fhir --help' for commands");
        }
    }

    Ok(())
}

fn load_rules(path: Option<&Path>) -> anyhow::Result<MappingConfig> {
    match path {
        Some(path) => {
            tracing::info!("++ Loading mapping rules from {}", path.display());
            MappingConfig::from_yaml_file(path)
                .with_context(|| format!("failed to load rules from {}", path.display()))
        }
        None => Ok(MappingConfig::builtin()?),
    }
}

fn converter(rules: MappingConfig, validate: bool) -> anyhow::Result<Converter> {
    let env = |name: &str| std::env::var(name).ok();
    let config = ConfigOverrides {
        sending_application: env("V2FHIR_SENDING_APP"),
        sending_facility: env("V2FHIR_SENDING_FACILITY"),
        receiving_application: env("V2FHIR_RECEIVING_APP"),
        receiving_facility: env("V2FHIR_RECEIVING_FACILITY"),
        processing_id: env("V2FHIR_PROCESSING_ID"),
        version: env("V2FHIR_HL7_VERSION"),
    }
    .resolve()
    .context("invalid V2FHIR_* configuration")?;

    let converter = Converter::new(Arc::new(rules), Arc::new(config));
    Ok(if validate {
        converter.with_validator(Arc::new(StructuralValidator))
    } else {
        converter
    })
}

fn read_input(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read stdin")?;
            Ok(buffer)
        }
    }
}
