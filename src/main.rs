use std::{env, fs, path::Path};

use tracing::Level;

use acclisp::compiler::translate;
use acclisp::frontend::Lexer;
use acclisp::frontend::token_dumper::TokenDumper;
use acclisp::isa::disasm::{disassemble_words, print_code};
use acclisp::isa::{Arch, Word, codec};
use acclisp::machine::{MachineConfig, simulate};

fn main() {
    let args: Vec<String> = env::args().collect();

    let verbose = args.contains(&"--verbose".to_string()) || args.contains(&"-v".to_string());
    init_logging(verbose);

    match args.get(1).map(String::as_str) {
        Some("translate") => run_translate(&args[2..]),
        Some("run") => run_machine(&args[2..]),
        Some("--help") | Some("-h") | None => print_usage(),
        Some(other) => {
            eprintln!("Unknown command '{}'", other);
            print_usage();
            std::process::exit(1);
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_usage() {
    println!("ACCLISP - Lisp translator and accumulator machine simulator");
    println!();
    println!("Usage:");
    println!("  acclisp translate <source> [-o <artifact>] [--arch 32|64] [--tokens] [--listing]");
    println!("  acclisp run <artifact> [-i <input>] [--limit N] [--memory N] [--arch 32|64] [--verbose]");
    println!();
    println!("Artifacts ending in .bin are compact images, anything else is JSON.");
}

/// Value following `flag`, e.g. `-o out.json`.
fn option<'a>(args: &'a [String], flags: &[&str]) -> Option<&'a str> {
    args.iter()
        .position(|a| flags.contains(&a.as_str()))
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

/// First argument that is neither a flag nor a flag's value.
fn positional(args: &[String]) -> Option<&str> {
    const VALUED: [&str; 8] = ["-o", "--output", "-i", "--input", "--arch", "--limit", "--memory", "-a"];
    let mut skip = false;
    for arg in args {
        if skip {
            skip = false;
        } else if VALUED.contains(&arg.as_str()) {
            skip = true;
        } else if !arg.starts_with('-') {
            return Some(arg.as_str());
        }
    }
    None
}

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("{}", msg);
    std::process::exit(1);
}

fn parse_arch(args: &[String]) -> Arch {
    match option(args, &["--arch", "-a"]) {
        None => Arch::Bits32,
        Some(text) => text
            .parse::<Arch>()
            .unwrap_or_else(|e| fail(format!("Error: {}", e))),
    }
}

fn parse_number<T: std::str::FromStr>(args: &[String], flag: &str, default: T) -> T {
    match option(args, &[flag]) {
        None => default,
        Some(text) => text
            .parse()
            .unwrap_or_else(|_| fail(format!("Error: {} expects a number, got '{}'", flag, text))),
    }
}

fn is_image(path: &str) -> bool {
    Path::new(path).extension().and_then(|e| e.to_str()) == Some("bin")
}

fn run_translate(args: &[String]) {
    let Some(source_path) = positional(args) else {
        print_usage();
        std::process::exit(1);
    };
    let target = option(args, &["-o", "--output"]).unwrap_or("output");
    let arch = parse_arch(args);

    let source = fs::read_to_string(source_path)
        .unwrap_or_else(|e| fail(format!("Failed to read '{}': {}", source_path, e)));

    if args.contains(&"--tokens".to_string()) {
        dump_tokens(
            &source,
            args.contains(&"--no-color".to_string()),
            args.contains(&"--pretty".to_string()),
        );
    }

    let translation = translate(&source, arch)
        .unwrap_or_else(|e| fail(format!("{}: [{}] {}", source_path, e.category(), e)));

    if args.contains(&"--listing".to_string()) {
        print_code(&translation.code);
    }

    let words = translation.code.to_words();
    let written = if is_image(target) {
        codec::encode_image(&words).map(|bytes| fs::write(target, bytes))
    } else {
        codec::encode(&words).map(|text| fs::write(target, text))
    };
    match written {
        Ok(Ok(())) => {}
        Ok(Err(e)) => fail(format!("Failed to write '{}': {}", target, e)),
        Err(e) => fail(e),
    }

    println!(
        "LoC: {} code instr: {}",
        translation.source_lines,
        translation.code.len()
    );
}

fn dump_tokens(source: &str, no_color: bool, pretty: bool) {
    match Lexer::new(source).tokenize() {
        Ok(tokens) => {
            let mut dumper = TokenDumper::new();
            if no_color {
                dumper = dumper.no_color();
            }
            if pretty {
                dumper = dumper.pretty();
            }
            dumper.dump(&tokens);
        }
        Err(e) => fail(format!("Lexer error: {}", e)),
    }
}

fn load_artifact(path: &str, arch: Arch) -> Vec<Word> {
    let decoded = if is_image(path) {
        let bytes = fs::read(path).unwrap_or_else(|e| fail(format!("Failed to read '{}': {}", path, e)));
        codec::decode_image(&bytes, arch)
    } else {
        let text = fs::read_to_string(path)
            .unwrap_or_else(|e| fail(format!("Failed to read '{}': {}", path, e)));
        codec::decode(&text, arch)
    };
    decoded.unwrap_or_else(|e| fail(e))
}

fn run_machine(args: &[String]) {
    let Some(artifact) = positional(args) else {
        print_usage();
        std::process::exit(1);
    };

    let defaults = MachineConfig::default();
    let config = MachineConfig {
        memory_size: parse_number(args, "--memory", defaults.memory_size),
        limit: parse_number(args, "--limit", defaults.limit),
        arch: parse_arch(args),
    };

    let input = match option(args, &["-i", "--input"]) {
        Some(path) => fs::read_to_string(path)
            .unwrap_or_else(|e| fail(format!("Failed to read '{}': {}", path, e))),
        None => String::new(),
    };

    let words = load_artifact(artifact, config.arch);
    if args.contains(&"--listing".to_string()) {
        print!("{}", disassemble_words(&words));
    }

    match simulate(words, &input, &config) {
        Ok(report) => println!("{}", report.output),
        Err(e) => fail(e),
    }
}
