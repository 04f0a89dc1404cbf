use std::env;

use color_eyre::eyre::{eyre, Result};
use log::LevelFilter;
use simple_logger::SimpleLogger;

use ls8::memory::Ls8Mem;
use ls8::processor::Processor;

fn main() -> Result<()> {
    color_eyre::install()?; // rust error handling
    SimpleLogger::new()
        .with_level(LevelFilter::Warn)
        .env()
        .init()
        .unwrap(); // logging, RUST_LOG=debug enables the trace

    let path = env::args()
        .nth(1)
        .ok_or_else(|| eyre!("usage: ls8 <program.ls8>"))?;

    let mut mem = Ls8Mem::from_file(&path)?;
    let mut cpu = Processor::new();

    cpu.run(&mut mem)?;

    Ok(())
}
