//! Line-based console for poking at a running system by hand

use std::path::PathBuf;

use log::warn;
use text_io::try_read;

use crate::error::{SimulatorResult, TraceError};
use crate::memory::{to_address, to_data};
use crate::report::PerformanceReport;
use crate::system::{Completion, MulticoreSystem, Operation};

const HELP: &str = concat!(
    "commands: r <core> <addr> | w <core> <addr> <data> | tick [n] | ",
    "stats | verify | reset | quit"
);

#[derive(Debug, PartialEq)]
pub enum Reply {
    Output(String),
    Quit,
}

pub struct Console {
    pub system: MulticoreSystem,
    completions: Vec<Completion>,
}

fn parse_error(message: String) -> TraceError {
    TraceError::ParseError(PathBuf::from("<stdin>"), message)
}

fn parse_core(field: &str) -> SimulatorResult<usize> {
    // Range is checked by the system
    Ok(field
        .parse::<usize>()
        .map_err(|_| parse_error(format!("Invalid core '{}'", field)))?)
}

fn parse_hex(field: &str) -> SimulatorResult<u32> {
    Ok(crate::trace::parse_hex(field).map_err(parse_error)?)
}

impl Console {
    pub fn new(system: MulticoreSystem) -> Self {
        Self { system, completions: Vec::new() }
    }

    fn access(&mut self, operation: Operation) -> SimulatorResult<Reply> {
        let completion = self.system.access(operation)?;
        self.completions.push(completion);
        Ok(Reply::Output(format!(
            "core {} {:?} {:#04x} = {:#04x} ({}, {} cycles)",
            operation.core,
            operation.access_type,
            operation.address,
            completion.data,
            if completion.hit { "hit" } else { "miss" },
            completion.latency()
        )))
    }

    /// Runs one command line
    pub fn execute(&mut self, line: &str) -> SimulatorResult<Reply> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts[..] {
            [] => Ok(Reply::Output(String::new())),
            ["r", core, address] => {
                let core = parse_core(core)?;
                let address = to_address(parse_hex(address)?)?;
                self.access(Operation::read(core, address))
            }
            ["w", core, address, data] => {
                let core = parse_core(core)?;
                let address = to_address(parse_hex(address)?)?;
                let data = to_data(parse_hex(data)?)?;
                self.access(Operation::write(core, address, data))
            }
            ["tick"] => {
                self.system.tick();
                Ok(Reply::Output(format!("cycle {}", self.system.cycle())))
            }
            ["tick", count] => {
                let count = count.parse::<u64>().map_err(|_| {
                    parse_error(format!("Invalid tick count '{}'", count))
                })?;
                self.system.run(count);
                Ok(Reply::Output(format!("cycle {}", self.system.cycle())))
            }
            ["stats"] => {
                let report = PerformanceReport::make(
                    self.system.stats(),
                    &self.completions,
                );
                Ok(Reply::Output(report.to_string()))
            }
            ["verify"] => {
                self.system.verify_inclusion()?;
                Ok(Reply::Output("inclusion holds".to_string()))
            }
            ["reset"] => {
                self.system.reset();
                self.completions.clear();
                Ok(Reply::Output("reset".to_string()))
            }
            ["quit"] | ["q"] => Ok(Reply::Quit),
            _ => Ok(Reply::Output(HELP.to_string())),
        }
    }

    /// Reads commands from stdin until `quit` or end of input
    pub fn run(&mut self) {
        println!("{}", HELP);
        loop {
            let line: String = match try_read!("{}\n") {
                Ok(line) => line,
                Err(_) => break,
            };
            match self.execute(&line) {
                Ok(Reply::Output(output)) if output.is_empty() => {}
                Ok(Reply::Output(output)) => println!("{}", output),
                Ok(Reply::Quit) => break,
                Err(e) => warn!("{}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{MemoryError, SimulatorError};
    use crate::system::HierarchyPolicy;

    fn console() -> Console {
        match MulticoreSystem::make(HierarchyPolicy::default()) {
            Ok(system) => Console::new(system),
            Err(e) => panic!("{}", e),
        }
    }

    fn output(reply: SimulatorResult<Reply>) -> String {
        match reply {
            Ok(Reply::Output(output)) => output,
            Ok(Reply::Quit) => panic!("unexpected quit"),
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    #[test]
    fn test_write_then_read() {
        let mut console = console();
        let write = output(console.execute("w 1 0x42 0x7e"));
        assert!(write.contains("miss"), "{}", write);
        let read = output(console.execute("r 1 0x42"));
        assert!(read.contains("= 0x7e (hit"), "{}", read);
    }

    #[test]
    fn test_tick_and_stats() {
        let mut console = console();
        assert_eq!(output(console.execute("tick 5")), "cycle 5");
        assert_eq!(output(console.execute("tick")), "cycle 6");
        output(console.execute("r 0 0x00"));
        assert!(output(console.execute("stats")).contains("# operations = 1"));
        assert_eq!(output(console.execute("verify")), "inclusion holds");
    }

    #[test]
    fn test_bad_input() {
        let mut console = console();
        assert!(matches!(
            console.execute("r 9 0x00"),
            Err(SimulatorError::MemoryError(MemoryError::InvalidCore(9)))
        ));
        assert!(matches!(
            console.execute("r 0 0x100"),
            Err(SimulatorError::MemoryError(MemoryError::AccessError { .. }))
        ));
        assert!(console.execute("w 0 0x10 zz").is_err());
        assert_eq!(output(console.execute("bogus")), HELP);
        assert_eq!(console.execute("quit").ok(), Some(Reply::Quit));
    }
}
