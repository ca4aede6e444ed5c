use classgen::gen::{self, Settings};
use classgen::jvm::class_file::{ClassFile, Code, Version};
use classgen::jvm::{self, Name};
use classgen::tree::CompilationUnit;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::fs;
use std::path::PathBuf;
use std::process;

#[derive(Debug)]
enum CliError {
    Io(PathBuf, std::io::Error),
    Json(PathBuf, serde_json::Error),
    BadTarget(String),
    BadDebugOption(String),
    Gen(gen::Error),
    Jvm(jvm::Error),
}

impl Display for CliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            CliError::Io(path, err) => write!(f, "{}: {}", path.display(), err),
            CliError::Json(path, err) => write!(f, "{}: invalid syntax tree: {}", path.display(), err),
            CliError::BadTarget(target) => write!(f, "unknown target release '{}'", target),
            CliError::BadDebugOption(option) => write!(f, "unknown debug info option '{}'", option),
            CliError::Gen(err) => err.fmt(f),
            CliError::Jvm(err) => err.fmt(f),
        }
    }
}

fn cli() -> Command {
    Command::new("classgen")
        .version(clap::crate_version!())
        .about("Lower typed syntax trees (as JSON) into JVM class files")
        .subcommand_required(true)
        .subcommand(
            Command::new("compile")
                .about("Generate class files for a compilation unit")
                .arg(
                    Arg::new("INPUT")
                        .help("Typed syntax tree of the compilation unit, as JSON")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("output")
                        .short('d')
                        .value_name("DIR")
                        .default_value(".")
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory under which class files are written (by package)"),
                )
                .arg(
                    Arg::new("target")
                        .long("target")
                        .value_name("RELEASE")
                        .default_value("8")
                        .help("Java release of the generated class files (eg. `1.4`, `8`, `17`)"),
                )
                .arg(
                    Arg::new("debug")
                        .short('g')
                        .value_name("KINDS")
                        .default_value("source,lines")
                        .help("Debug info: comma separated `lines`, `vars`, `source`, or `none`"),
                )
                .arg(
                    Arg::new("finalizer-inline-limit")
                        .long("finalizer-inline-limit")
                        .value_name("N")
                        .value_parser(value_parser!(usize))
                        .help("Largest `finally` block to duplicate, for targets with `jsr`"),
                )
                .arg(
                    Arg::new("dry-run")
                        .long("dry-run")
                        .action(ArgAction::SetTrue)
                        .help("Generate the classes without writing them"),
                ),
        )
        .subcommand(
            Command::new("dump")
                .about("Summarize a class file")
                .arg(
                    Arg::new("CLASS")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
}

fn settings(matches: &ArgMatches) -> Result<Settings, CliError> {
    let target = matches
        .get_one::<String>("target")
        .map_or("8", String::as_str);
    let version = Version::from_release(target).ok_or_else(|| CliError::BadTarget(target.to_owned()))?;
    let mut settings = Settings::new(version);

    let debug = matches
        .get_one::<String>("debug")
        .map_or("", String::as_str);
    settings.line_numbers = false;
    settings.local_variables = false;
    settings.source_file = false;
    for kind in debug.split(',').filter(|kind| !kind.is_empty()) {
        match kind {
            "lines" => settings.line_numbers = true,
            "vars" => settings.local_variables = true,
            "source" => settings.source_file = true,
            "none" => (),
            other => return Err(CliError::BadDebugOption(other.to_owned())),
        }
    }
    if let Some(limit) = matches.get_one::<usize>("finalizer-inline-limit") {
        settings.finalizer_inline_limit = *limit;
    }
    Ok(settings)
}

/// Returns whether every class was generated
fn compile(matches: &ArgMatches) -> Result<bool, CliError> {
    let settings = settings(matches)?;
    let input = matches
        .get_one::<PathBuf>("INPUT")
        .cloned()
        .unwrap_or_default();
    let output_dir = matches
        .get_one::<PathBuf>("output")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("."));

    log::info!("Reading '{}'", input.display());
    let json = fs::read_to_string(&input).map_err(|err| CliError::Io(input.clone(), err))?;
    let unit = CompilationUnit::from_json(&json).map_err(|err| CliError::Json(input.clone(), err))?;

    let output = gen::compile(&unit, &settings).map_err(CliError::Gen)?;
    if !matches.get_flag("dry-run") {
        for (name, class) in &output.classes {
            let path = output_dir.join(format!("{}.class", name.as_str()));
            log::info!("Writing '{}'", path.display());
            class
                .save_to_path(&path, true)
                .map_err(|err| CliError::Io(path.clone(), err))?;
        }
    }
    for diagnostic in &output.diagnostics {
        eprintln!("error: {}", diagnostic);
    }
    Ok(output.diagnostics.is_empty())
}

fn dump(matches: &ArgMatches) -> Result<(), CliError> {
    let path = matches
        .get_one::<PathBuf>("CLASS")
        .cloned()
        .unwrap_or_default();
    let bytes = fs::read(&path).map_err(|err| CliError::Io(path.clone(), err))?;
    let class = ClassFile::from_bytes(&bytes).map_err(CliError::Jvm)?;

    println!(
        "class {} (version {}.{}, {} constants)",
        class.class_name(class.this_class).unwrap_or("?"),
        class.version.major_version,
        class.version.minor_version,
        class.constants.len(),
    );
    if let Some(super_class) = class.super_class {
        println!("  extends {}", class.class_name(super_class).unwrap_or("?"));
    }
    for (offset, _, constant) in &class.constants {
        println!("  #{} = {:?}", offset.0, constant);
    }
    for field in &class.fields {
        println!(
            "  field {} {}",
            class.utf8(field.name_index).unwrap_or("?"),
            class.utf8(field.descriptor_index).unwrap_or("?")
        );
    }
    for method in &class.methods {
        let code = class
            .attribute(&method.attributes, "Code")
            .and_then(|attr| attr.decode_info::<Code>().ok());
        let summary = match code {
            Some(code) => format!(
                "{} bytes, max stack {}, max locals {}, {} handlers, {} frames",
                code.code_array.0.len(),
                code.max_stack,
                code.max_locals,
                code.exception_table.len(),
                frame_count(&class, &code)
            ),
            None => String::from("no code"),
        };
        println!(
            "  method {}{}: {}",
            class.utf8(method.name_index).unwrap_or("?"),
            class.utf8(method.descriptor_index).unwrap_or("?"),
            summary
        );
    }
    for attribute in &class.attributes {
        println!("  attribute {}", class.utf8(attribute.name_index).unwrap_or("?"));
    }
    Ok(())
}

/// Number of entries in the `StackMapTable`, read from its leading count
fn frame_count(class: &ClassFile, code: &Code) -> u16 {
    match class.attribute(&code.attributes, "StackMapTable") {
        Some(attr) if attr.info.len() >= 2 => u16::from_be_bytes([attr.info[0], attr.info[1]]),
        _ => 0,
    }
}

fn main() {
    env_logger::init();

    let matches = cli().get_matches();
    let result = match matches.subcommand() {
        Some(("compile", sub)) => compile(sub),
        Some(("dump", sub)) => dump(sub).map(|()| true),
        _ => Ok(true),
    };
    match result {
        Ok(true) => (),
        Ok(false) => process::exit(1),
        Err(err) => {
            eprintln!("error: {}", err);
            process::exit(2);
        }
    }
}
