use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::ir::{Module, parse_module};

/// Reads and parses a textual module. The module is named after the file
/// unless the text names it.
pub fn read_module(path: &Path) -> Result<Module> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read module from {}", path.display()))?;
    let mut module =
        parse_module(&text).with_context(|| format!("Failed to parse {}", path.display()))?;
    if module.name.is_empty() {
        module.name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
    }
    Ok(module)
}

/// Writes `module` in textual form to `path`, or to stdout when `path` is `None`.
pub fn write_module(module: &Module, path: Option<&Path>) -> Result<()> {
    let text = module.to_string();
    match path {
        Some(path) => fs::write(path, text)
            .with_context(|| format!("Failed to write module to {}", path.display())),
        None => {
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(text.as_bytes())
                .and_then(|()| stdout.flush())
                .context("Failed to write module to stdout")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_a_file() {
        let dir = std::env::temp_dir().join(format!("afl_pass_util_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("unit.ll");
        fs::write(&path, "define void @f() {\nentry:\n  ret void\n}\n").unwrap();

        let module = read_module(&path).unwrap();
        assert_eq!(module.name, "unit");

        let out = dir.join("unit.out.ll");
        write_module(&module, Some(&out)).unwrap();
        assert_eq!(read_module(&out).unwrap().functions, module.functions);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = read_module(Path::new("/nonexistent/module.ll")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/module.ll"));
    }
}
