//! JSON I/O handling for CLI
//!
//! - Input: one JSON request line on stdin
//! - Output: one JSON object per line on stdout
//! - Logs go to stderr, never stdout

use std::io::{self, BufRead, Write};

use serde::Serialize;

use super::errors::{CliError, CliResult};

/// Read one raw request line from `reader`
pub fn read_request_from(reader: impl BufRead) -> CliResult<String> {
    let mut reader = reader;
    let mut line = String::new();
    reader.read_line(&mut line)?;

    if line.trim().is_empty() {
        return Err(CliError::io_error("Empty input"));
    }
    Ok(line)
}

/// Read one raw request line from stdin
pub fn read_request() -> CliResult<String> {
    read_request_from(io::stdin().lock())
}

/// Write a value as one JSON line to `writer`
pub fn write_json_to<T: Serialize>(mut writer: impl Write, value: &T) -> CliResult<()> {
    serde_json::to_writer(&mut writer, value)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

/// Write a value as one JSON line to stdout
pub fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    write_json_to(io::stdout().lock(), value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_read_request_line() {
        let input = b"{\"collection\":\"users\"}\n{\"ignored\":true}\n";
        let line = read_request_from(&input[..]).unwrap();
        assert_eq!(line.trim(), "{\"collection\":\"users\"}");
    }

    #[test]
    fn test_read_empty_input() {
        let err = read_request_from(&b"  \n"[..]).unwrap_err();
        assert_eq!(err.code_str(), "QG_CLI_IO_ERROR");
    }

    #[test]
    fn test_write_json_line() {
        let mut out = Vec::new();
        write_json_to(&mut out, &json!({"success": true})).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "{\"success\":true}\n");
    }
}
