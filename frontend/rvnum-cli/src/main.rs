//! Arithmetic front-end over the numeric core: `rvnum-cli <op> <hexA> <hexB>`
//! with op one of add, sub, mul, div.
//!
//! Exit codes: 0 on success, 1 on a usage or operand error, 2 on an
//! unknown op.

use clap::Parser;
use env_logger::Env;
use rvnum_core::alu::{alu_add, alu_sub, AluFlags};
use rvnum_core::mdu::{div_traced, mul_low_traced};
use rvnum_core::Bits;
use std::process;

#[derive(Debug, Parser)]
struct Args {
    /// Operation to perform: add, sub, mul, or div.
    op: String,

    /// Left operand as 32-bit hex (0x prefix optional).
    a: String,

    /// Right operand as 32-bit hex.
    b: String,
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            // Usage problems exit 1; clap's default of 2 is reserved for
            // the unknown-op case. Help and version still exit 0.
            let code = i32::from(err.use_stderr());
            let _ = err.print();
            process::exit(code);
        }
    };

    process::exit(run(&args));
}

fn run(args: &Args) -> i32 {
    let (a, b) = match (Bits::from_hex_width(&args.a, 32), Bits::from_hex_width(&args.b, 32)) {
        (Ok(a), Ok(b)) => (a, b),
        (Err(err), _) | (_, Err(err)) => {
            eprintln!("bad operand: {err}");
            return 1;
        }
    };

    println!("A: {}", a.to_hex_string(8));
    println!("B: {}", b.to_hex_string(8));

    match args.op.as_str() {
        "add" => {
            let (r, flags) = alu_add(&a, &b);
            println!("R: {}", r.to_hex_string(8));
            print_alu_flags(flags);
            println!("BIN: {}", r.pretty_bin());
        }
        "sub" => {
            let (r, flags) = alu_sub(&a, &b);
            println!("R: {}", r.to_hex_string(8));
            print_alu_flags(flags);
        }
        "mul" => {
            let (low, flags, steps) = mul_low_traced(&a, &b);
            println!("R (low): {}", low.to_hex_string(8));
            println!("MUL overflow: {}", u8::from(flags.overflow));
            println!("TRACE (first 5 steps):");
            for (i, step) in steps.iter().take(5).enumerate() {
                println!(
                    "  step {i}: acc={} multiplier={}",
                    step.accumulator.to_hex_string(16),
                    step.multiplier.to_hex_string(8)
                );
            }
        }
        "div" => {
            let (q, r, flags, steps) = div_traced(&a, &b);
            println!("Q: {}", q.to_hex_string(8));
            println!("R: {}", r.to_hex_string(8));
            println!(
                "DIV flags: div_by_zero={} overflow={}",
                u8::from(flags.div_by_zero),
                u8::from(flags.overflow)
            );
            println!("TRACE (first 8 steps):");
            for (i, step) in steps.iter().take(8).enumerate() {
                println!(
                    "  step {i}: rem={} quo={} {}",
                    step.remainder.to_hex_string(8),
                    step.quotient.to_hex_string(8),
                    if step.subtracted { "sub" } else { "restore" }
                );
            }
        }
        other => {
            eprintln!("unknown op: {other}");
            return 2;
        }
    }

    0
}

fn print_alu_flags(flags: AluFlags) {
    println!(
        "FLAGS: N={} Z={} C={} V={}",
        u8::from(flags.negative),
        u8::from(flags.zero),
        u8::from(flags.carry),
        u8::from(flags.overflow)
    );
}
