//! Terminal color constants for CLI output.

pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const CYAN: &str = "\x1b[36m";
pub const RED: &str = "\x1b[31m";

/// Color for a cell return code.
pub fn for_code(code: qcell_core::ReturnCode) -> &'static str {
    match code {
        qcell_core::ReturnCode::Ok => GREEN,
        qcell_core::ReturnCode::Unknown => YELLOW,
        qcell_core::ReturnCode::Quit => RED,
    }
}
