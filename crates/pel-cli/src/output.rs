use serde::Serialize;
use std::fs;
use std::io;
use std::path::Path;

/// Write `value` as pretty JSON to `path`, or to stdout if `path` is `None`.
pub fn write_json<T: Serialize>(value: &T, path: Option<&Path>) -> io::Result<()> {
    let rendered = serde_json::to_string_pretty(value)?;
    match path {
        Some(p) => fs::write(p, rendered),
        None => {
            println!("{rendered}");
            Ok(())
        }
    }
}
