//! Multi-core trace files
//!
//! One operation per line: `<core> r <addr>` or `<core> w <addr> <data>`,
//! with hexadecimal `0x` operands. Blank lines and `#` comments are skipped.

use std::path::Path;

use crate::error::{SimulatorResult, TraceError};
use crate::memory::{to_address, to_data, NUM_CORES};
use crate::system::Operation;

/// Reads and parses a trace file
pub fn fetch_operations(trace_path: &Path) -> SimulatorResult<Vec<Operation>> {
    let content = std::fs::read_to_string(trace_path)
        .map_err(|e| TraceError::FileReadError(trace_path.into(), e))?;
    parse_operations(trace_path, &content)
}

/// Parses trace text; `trace_path` is only used in error messages
pub fn parse_operations(
    trace_path: &Path,
    content: &str,
) -> SimulatorResult<Vec<Operation>> {
    let mut operations = Vec::new();

    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parse_error = |message: String| {
            TraceError::ParseError(
                trace_path.into(),
                format!("{} at line {}", message, line_num + 1),
            )
        };

        let parts: Vec<&str> = line.split_whitespace().collect();
        let core = parts[0]
            .parse::<usize>()
            .ok()
            .filter(|core| *core < NUM_CORES)
            .ok_or_else(|| parse_error(format!("Invalid core '{}'", parts[0])))?;

        let operation = match parts[1..] {
            ["r", address] => {
                let address = parse_hex(address).map_err(&parse_error)?;
                Operation::read(core, to_address(address)?)
            }
            ["w", address, data] => {
                let address = parse_hex(address).map_err(&parse_error)?;
                let data = parse_hex(data).map_err(&parse_error)?;
                Operation::write(core, to_address(address)?, to_data(data)?)
            }
            _ => {
                return Err(parse_error(
                    "Invalid format: expected '<core> r <addr>' or '<core> w <addr> <data>'"
                        .to_string(),
                )
                .into())
            }
        };
        operations.push(operation);
    }

    Ok(operations)
}

/// Parses a `0x`-prefixed hexadecimal operand
pub fn parse_hex(field: &str) -> Result<u32, String> {
    let digits = field
        .strip_prefix("0x")
        .ok_or_else(|| format!("Expected hexadecimal starting with '0x', got '{}'", field))?;
    u32::from_str_radix(digits, 16)
        .map_err(|_| format!("Invalid hexadecimal value '{}'", field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{MemoryError, SimulatorError};

    fn parse(content: &str) -> SimulatorResult<Vec<Operation>> {
        parse_operations(Path::new("test.trace"), content)
    }

    #[test]
    fn test_parse_operations() -> SimulatorResult<()> {
        let operations = parse(
            "# warm up\n\
             0 w 0x10 0xaa\n\
             \n\
             3 r 0xff\n\
             1 r 0x0\n",
        )?;
        assert_eq!(
            operations,
            vec![
                Operation::write(0, 0x10, 0xaa),
                Operation::read(3, 0xff),
                Operation::read(1, 0x00),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_reject_wide_address() {
        assert!(matches!(
            parse("0 r 0x100"),
            Err(SimulatorError::MemoryError(MemoryError::AccessError { address: 0x100, .. }))
        ));
        assert!(parse("0 w 0x10 0x1ff").is_err());
    }

    #[test]
    fn test_reject_malformed_lines() {
        for line in ["4 r 0x10", "x r 0x10", "0 r 10", "0 x 0x10", "0 w 0x10", "0"] {
            assert!(
                matches!(parse(line), Err(SimulatorError::TraceError(TraceError::ParseError(..)))),
                "accepted '{}'",
                line
            );
        }
    }

    #[test]
    fn test_error_names_line() {
        let message = match parse("0 r 0x01\n0 r 0x02\n0 q 0x03\n") {
            Err(e) => e.to_string(),
            Ok(_) => panic!("bad operation accepted"),
        };
        assert!(message.contains("line 3"), "{}", message);
    }

    #[test]
    fn test_missing_file() {
        let path = std::env::temp_dir().join("no-such-cache-trace.trace");
        assert!(matches!(
            fetch_operations(&path),
            Err(SimulatorError::TraceError(TraceError::FileReadError(..)))
        ));
    }
}
