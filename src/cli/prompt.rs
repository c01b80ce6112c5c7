//! Interactive prompts for values missing from the command line.
//!
//! clap handles structured flags; this module covers the "run `starcal measure`
//! and answer a few questions" flow. Prompts are only shown on a terminal:
//! with redirected stdin a missing value is a configuration error.

use std::fs;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};

use crate::error::AppError;

/// Directory recursion depth when looking for FITS files.
const DEFAULT_SEARCH_DEPTH: usize = 3;

const FITS_EXTENSIONS: [&str; 3] = ["fits", "fit", "fts"];

/// Fail unless stdin is a terminal; `what` names the missing value.
fn require_terminal(what: &str, flag: &str) -> Result<(), AppError> {
    if io::stdin().is_terminal() {
        Ok(())
    } else {
        Err(AppError::config(format!("Missing {what}; pass {flag}.")))
    }
}

fn read_answer(input: &mut impl BufRead, question: &str) -> Result<String, AppError> {
    print!("{question}");
    io::stdout()
        .flush()
        .map_err(|e| AppError::io(format!("Failed to write prompt: {e}")))?;

    let mut line = String::new();
    let bytes = input
        .read_line(&mut line)
        .map_err(|e| AppError::io(format!("Failed to read input: {e}")))?;
    if bytes == 0 {
        return Err(AppError::config("No input received."));
    }
    let line = line.trim().to_string();
    if line.eq_ignore_ascii_case("q") {
        return Err(AppError::config("Canceled."));
    }
    Ok(line)
}

/// Prompt for a FITS image, offering the files found under the current directory.
pub fn prompt_for_image() -> Result<PathBuf, AppError> {
    require_terminal("image path", "--image <FITS>")?;
    let files = discover_fits_files();
    if !files.is_empty() {
        println!("Found {} FITS file(s):", files.len());
        for (idx, path) in files.iter().enumerate() {
            println!("{:>3}) {}", idx + 1, pretty_path(path));
        }
    }
    select_image(&mut io::stdin().lock(), &files)
}

fn select_image(input: &mut impl BufRead, files: &[PathBuf]) -> Result<PathBuf, AppError> {
    let question = if files.is_empty() {
        "Image path (q to quit): ".to_string()
    } else {
        format!("Select an image by number (1-{}) or type a path (q to quit): ", files.len())
    };

    loop {
        let answer = read_answer(input, &question)?;
        if let Ok(choice) = answer.parse::<usize>() {
            if (1..=files.len()).contains(&choice) {
                return Ok(files[choice - 1].clone());
            }
            println!("Invalid choice: {choice}.");
            continue;
        }
        match validate_image_path(Path::new(&answer)) {
            Ok(path) => return Ok(path),
            Err(err) => println!("{err}"),
        }
    }
}

/// Prompt for a real number until one parses and passes `accept`.
pub fn prompt_for_f64(label: &str, flag: &str, accept: fn(f64) -> bool) -> Result<f64, AppError> {
    require_terminal(label, flag)?;
    ask_f64(&mut io::stdin().lock(), label, accept)
}

fn ask_f64(input: &mut impl BufRead, label: &str, accept: fn(f64) -> bool) -> Result<f64, AppError> {
    loop {
        let answer = read_answer(input, &format!("{label}: "))?;
        match answer.parse::<f64>() {
            Ok(v) if v.is_finite() && accept(v) => return Ok(v),
            _ => println!("Not a valid value for {label}: '{answer}'."),
        }
    }
}

/// Check that `path` is an existing FITS file.
pub fn validate_image_path(path: &Path) -> Result<PathBuf, AppError> {
    if !path.exists() {
        return Err(AppError::io(format!("Image not found: {}", path.display())));
    }
    if path.is_dir() {
        return Err(AppError::config(format!(
            "Expected a file, got a directory: {}",
            path.display()
        )));
    }
    if !has_fits_extension(path) {
        log::warn!("'{}' does not have a FITS extension; trying anyway", path.display());
    }
    Ok(path.to_path_buf())
}

/// `*.fits`/`*.fit`/`*.fts` under the current directory, sorted, skipping `_bkg` artifacts.
pub fn discover_fits_files() -> Vec<PathBuf> {
    let mut out = Vec::new();
    find_fits_files(Path::new("."), 0, DEFAULT_SEARCH_DEPTH, &mut out);
    out.sort_by_key(|p| pretty_path(p));
    out
}

fn find_fits_files(root: &Path, depth: usize, max_depth: usize, out: &mut Vec<PathBuf>) {
    if depth > max_depth {
        return;
    }
    let Ok(entries) = fs::read_dir(root) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            if !should_skip_dir(&path) {
                find_fits_files(&path, depth + 1, max_depth, out);
            }
        } else if file_type.is_file() && has_fits_extension(&path) && !is_bkg_artifact(&path) {
            out.push(path);
        }
    }
}

fn has_fits_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| FITS_EXTENSIONS.iter().any(|f| ext.eq_ignore_ascii_case(f)))
}

fn is_bkg_artifact(path: &Path) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|s| s.ends_with("_bkg"))
}

fn should_skip_dir(path: &Path) -> bool {
    let name = path.file_name().and_then(|s| s.to_str()).unwrap_or("");
    matches!(name, ".git" | "target" | "node_modules")
}

fn pretty_path(path: &Path) -> String {
    path.strip_prefix("./").unwrap_or(path).display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn number_prompt_retries_until_valid() {
        let mut input = Cursor::new("abc\n-3\n4.5\n");
        let v = ask_f64(&mut input, "FWHM (px)", |v| v > 0.0).unwrap();
        assert_eq!(v, 4.5);
    }

    #[test]
    fn closed_input_is_a_configuration_error() {
        let mut input = Cursor::new("");
        let err = ask_f64(&mut input, "x", |_| true).unwrap_err();
        assert_eq!(err.exit_code(), 2);

        let mut quit = Cursor::new("q\n");
        assert_eq!(ask_f64(&mut quit, "x", |_| true).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn image_can_be_chosen_by_number() {
        let files = vec![PathBuf::from("a.fits"), PathBuf::from("b.fits")];
        let mut input = Cursor::new("7\n2\n");
        assert_eq!(select_image(&mut input, &files).unwrap(), PathBuf::from("b.fits"));
    }

    #[test]
    fn fits_extensions_and_artifacts() {
        assert!(has_fits_extension(Path::new("m13.FITS")));
        assert!(has_fits_extension(Path::new("m13.fit")));
        assert!(!has_fits_extension(Path::new("m13.csv")));
        assert!(is_bkg_artifact(Path::new("m13_bkg.fits")));
        assert!(!is_bkg_artifact(Path::new("m13.fits")));
    }
}
