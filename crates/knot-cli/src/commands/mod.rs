pub mod cache;
pub mod install;
pub mod link;
pub mod version;

use knot_core::Error;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

/// `error` member of `--json` output.
#[derive(Debug, Serialize)]
pub struct ErrorInfo {
    code: &'static str,
    message: String,
}

impl From<&Error> for ErrorInfo {
    fn from(e: &Error) -> Self {
        Self {
            code: e.code(),
            message: e.to_string(),
        }
    }
}

pub fn print_json<T: Serialize>(result: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(result).into_diagnostic()?;
    println!("{out}");
    Ok(())
}
