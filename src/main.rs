use std::io::{self, BufRead};
use std::process;

use clap::{Parser, Subcommand};
use colored::*;
use serde::Serialize;

use boxrt::logging;
use boxrt::mangle::{self, is_valid_target_identifier};
use boxrt::{is_reserved_form, RuntimeConfig};

/// boxrt - boxed value runtime and identifier mangler
#[derive(Parser)]
#[command(name = "boxrt")]
#[command(version)]
#[command(about = "Inspect the boxrt naming contract and runtime configuration", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mangle source identifiers into target identifiers
    Mangle {
        /// Identifiers to mangle
        names: Vec<String>,

        /// Emit a JSON report instead of plain lines
        #[arg(long)]
        json: bool,

        /// Also read one identifier per line from stdin
        #[arg(long)]
        stdin: bool,
    },

    /// Report whether each text looks like a mangled reserved name
    Check {
        /// Texts to test
        #[arg(required = true)]
        texts: Vec<String>,
    },

    /// List target keywords and runtime built-ins
    Keywords,

    /// Show the runtime configuration read from the environment
    Config,
}

#[derive(Debug, Serialize)]
struct MangleReport {
    name: String,
    mangled: String,
    reserved_form: bool,
    valid: bool,
}

impl MangleReport {
    fn new(name: &str) -> Self {
        let mangled = mangle::mangle(name);
        MangleReport {
            name: name.to_string(),
            reserved_form: is_reserved_form(&mangled),
            valid: is_valid_target_identifier(&mangled),
            mangled,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let config = RuntimeConfig::from_env();
    for warning in &config.warnings {
        eprintln!("{}: {}", "warning".yellow().bold(), warning);
    }
    if let Err(e) = logging::configure(&config) {
        eprintln!("{}: {}", "warning".yellow().bold(), e);
    }

    let result = match cli.command {
        Commands::Mangle { names, json, stdin } => cmd_mangle(names, json, stdin),
        Commands::Check { texts } => cmd_check(&texts),
        Commands::Keywords => {
            cmd_keywords();
            Ok(0)
        }
        Commands::Config => cmd_config(&config),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(2);
        }
    }
}

fn cmd_mangle(mut names: Vec<String>, json: bool, stdin: bool) -> Result<i32, String> {
    if stdin {
        for line in io::stdin().lock().lines() {
            let line = line.map_err(|e| format!("Failed to read stdin: {}", e))?;
            // Blank lines are the unused binding, like an empty argument.
            names.push(line.trim_end_matches('\r').to_string());
        }
    }

    let reports: Vec<MangleReport> = names.iter().map(|n| MangleReport::new(n)).collect();

    if json {
        let out = serde_json::to_string_pretty(&reports)
            .map_err(|e| format!("Failed to encode report: {}", e))?;
        println!("{}", out);
        return Ok(0);
    }

    for report in &reports {
        if report.reserved_form {
            println!(
                "{} -> {} {}",
                report.name,
                report.mangled.yellow(),
                "(reserved)".dimmed()
            );
        } else {
            println!("{} -> {}", report.name, report.mangled.green());
        }
    }
    Ok(0)
}

fn cmd_check(texts: &[String]) -> Result<i32, String> {
    let mut any_reserved = false;
    for text in texts {
        if is_reserved_form(text) {
            any_reserved = true;
            println!("{}: {}", text, "reserved form".yellow().bold());
        } else {
            println!("{}: {}", text, "ok".green());
        }
    }
    Ok(if any_reserved { 1 } else { 0 })
}

fn cmd_keywords() {
    println!("{}", "Target keywords:".cyan().bold());
    for kw in mangle::keywords() {
        println!("  {}", kw);
    }
    println!("{}", "Runtime built-ins:".cyan().bold());
    for name in mangle::builtins() {
        println!("  {}", name);
    }
}

fn cmd_config(config: &RuntimeConfig) -> Result<i32, String> {
    let out = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to encode config: {}", e))?;
    println!("{}", out);
    Ok(0)
}
