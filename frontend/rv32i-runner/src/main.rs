//! Loads a `.hex` program (one 32-bit word per line), runs it on the RV32I
//! interpreter, and dumps the final machine state.

use clap::Parser;
use env_logger::Env;
use rv32i_emu::bus::InMemoryBus;
use rv32i_emu::Rv32Cpu;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

#[derive(Debug, Parser)]
struct Args {
    /// Path to the program: one 8-digit hex word per line, blank or
    /// unparsable lines skipped.
    program: PathBuf,

    /// Maximum number of instructions to execute before giving up.
    #[arg(long, default_value_t = 100_000)]
    max_steps: u64,

    /// Base address of the data-memory window printed after the run.
    #[arg(long, default_value_t = 0x0001_0000)]
    dump_base: u32,

    /// Number of words in the data-memory window.
    #[arg(long, default_value_t = 4)]
    dump_words: u32,
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let program = match load_hex_program(&args.program) {
        Ok(program) => program,
        Err(err) => {
            eprintln!("failed to read {}: {err}", args.program.display());
            process::exit(1);
        }
    };
    log::info!("loaded {} words from {}", program.len(), args.program.display());

    let mut bus = InMemoryBus::new(program);
    let mut cpu = Rv32Cpu::new();
    cpu.run(&mut bus, args.max_steps);

    if cpu.is_running() {
        log::warn!("stopped after {} steps without halting", cpu.step_count());
    }

    println!("Finished after {} steps. Final register state:", cpu.step_count());
    for i in 0..32 {
        println!("x{i:02} = 0x{:08X}", cpu.registers().read(i));
    }

    println!();
    println!("Data memory at 0x{:08X}:", args.dump_base);
    for (address, value) in bus.data_region(args.dump_base, args.dump_words) {
        println!("[0x{address:08X}] = 0x{value:08X}");
    }
}

fn load_hex_program(path: &Path) -> std::io::Result<Vec<u32>> {
    let text = fs::read_to_string(path)?;
    Ok(text
        .lines()
        .filter_map(|line| {
            let word = line.trim();
            let word = word.strip_prefix("0x").unwrap_or(word);
            u32::from_str_radix(word, 16).ok()
        })
        .collect())
}
