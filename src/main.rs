use std::io::{BufRead, Write};
use std::{env, io, process};

use emu::controller::{DEFAULT_NUM_LINES, IrqController};
use emu::io_device::MmioDevice;
use tracing_subscriber::EnvFilter;

/// One line of the management protocol. This is the plain-typed stand-in
/// for the out-of-band control plane of the machine hosting the device:
/// `set`/`clear`/`enable`/`disable` drive the management interface,
/// `read`/`write` drive the memory-mapped path, `status` dumps the
/// register bank without side effects.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Set(usize),
    Clear(usize),
    Enable(usize),
    Disable(usize),
    Read { offset: usize, size: usize },
    Write { offset: usize, value: u64, size: usize },
    Status,
    Quit,
}

fn parse_num(token: &str) -> Result<u64, String> {
    let parsed = token
        .strip_prefix("0x")
        .map_or_else(|| token.parse(), |hex| u64::from_str_radix(hex, 16));

    parsed.map_err(|_| format!("not a number: {token}"))
}

fn parse_index(token: &str) -> Result<usize, String> {
    parse_num(token).map(|value| value as usize)
}

fn parse_size(token: Option<&str>) -> Result<usize, String> {
    let size = match token {
        Some(token) => parse_index(token)?,
        None => 1,
    };

    if matches!(size, 1 | 2 | 4 | 8) {
        Ok(size)
    } else {
        Err(format!("access size must be 1, 2, 4 or 8, got {size}"))
    }
}

fn index_arg(tokens: &mut std::str::SplitWhitespace<'_>, keyword: &str) -> Result<usize, String> {
    tokens
        .next()
        .ok_or_else(|| format!("{keyword} needs a line index or offset"))
        .and_then(parse_index)
}

impl Command {
    fn parse(line: &str) -> Result<Self, String> {
        let mut tokens = line.split_whitespace();
        let keyword = tokens.next().ok_or_else(|| "empty command".to_string())?;

        let command = match keyword {
            "set" => Self::Set(index_arg(&mut tokens, keyword)?),
            "clear" => Self::Clear(index_arg(&mut tokens, keyword)?),
            "enable" => Self::Enable(index_arg(&mut tokens, keyword)?),
            "disable" => Self::Disable(index_arg(&mut tokens, keyword)?),
            "read" => {
                let offset = index_arg(&mut tokens, keyword)?;
                Self::Read {
                    offset,
                    size: parse_size(tokens.next())?,
                }
            }
            "write" => {
                let offset = index_arg(&mut tokens, keyword)?;
                let value = tokens
                    .next()
                    .ok_or_else(|| "write needs a value".to_string())
                    .and_then(parse_num)?;
                Self::Write {
                    offset,
                    value,
                    size: parse_size(tokens.next())?,
                }
            }
            "status" => Self::Status,
            "quit" | "exit" => Self::Quit,
            _ => return Err(format!("unknown command: {keyword}")),
        };

        if let Some(extra) = tokens.next() {
            return Err(format!("unexpected argument: {extra}"));
        }

        Ok(command)
    }
}

fn print_status(controller: &IrqController) {
    let regs = controller.registers();
    println!("status_reg = 0x{:08X}", regs.read_status());
    for line in 0..regs.num_lines() {
        let reg = regs.read_line(line);
        if reg != 0 {
            println!("line {line:3} = 0x{reg:02X}");
        }
    }
}

fn run(controller: &mut IrqController, command: Command) -> bool {
    let report = |result: Result<(), emu::error::IrqError>| {
        if let Err(error) = result {
            println!("error: {error}");
        }
    };

    match command {
        Command::Set(line) => report(controller.set_line(line)),
        Command::Clear(line) => report(controller.clear_line(line)),
        Command::Enable(line) => report(controller.enable_line(line)),
        Command::Disable(line) => report(controller.disable_line(line)),
        Command::Read { offset, size } => {
            let value = controller.read(offset, size);
            println!("0x{value:0width$X}", width = size * 2);
        }
        Command::Write { offset, value, size } => controller.write(offset, value, size),
        Command::Status => print_status(controller),
        Command::Quit => return false,
    }

    true
}

fn main() {
    println!("irqhub v0.1.0");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let num_lines = match env::args().nth(1) {
        Some(arg) => match arg.parse() {
            Ok(n) => n,
            Err(_) => {
                println!("invalid line count: {arg}");
                process::exit(1)
            }
        },
        None => DEFAULT_NUM_LINES,
    };

    let output = Box::new(|level: bool| println!("irq output -> {}", u8::from(level)));
    let mut controller = match IrqController::new(num_lines, output) {
        Ok(controller) => controller,
        Err(error) => {
            println!("{error}");
            process::exit(2)
        }
    };

    tracing::info!("controller ready, {num_lines} lines");

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        if line.trim().is_empty() {
            continue;
        }

        match Command::parse(&line) {
            Ok(command) => {
                if !run(&mut controller, command) {
                    break;
                }
            }
            Err(error) => println!("error: {error}"),
        }
    }
}
