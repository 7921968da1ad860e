//! The coadd2d run description file.
//!
//! ```text
//! [rdx]
//!     spectrograph = keck_lris_blue
//! [coadd2d]
//!     samp_fact = 2.0
//! coadd2d read
//!     Science/spec2d_J1234+5678_LRIS_2017Mar31T085412.fits
//!     Science/spec2d_J1234+5678_LRIS_2017Mar31T091502.fits
//! coadd2d end
//! ```
//!
//! Everything outside the `coadd2d read`/`coadd2d end` block is
//! configuration; the block lists the spec2d files to combine, one per line.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Parsed coadd2d file.
#[derive(Debug, Clone, PartialEq)]
pub struct Coadd2dFile {
    pub spectrograph: String,
    /// Configuration lines, comments and blank lines removed.
    pub config_lines: Vec<String>,
    /// Spec2d files re-rooted under the science directory, in file order.
    pub spec2d_files: Vec<PathBuf>,
}

impl Coadd2dFile {
    pub fn from_path(path: &Path, science_dir: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::MissingFile {
                path: path.to_path_buf(),
                det: None,
            });
        }
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        tracing::info!(path = %path.display(), "Loading the coadd2d file");
        Self::parse(&text, science_dir)
    }

    /// Parse file contents. Listed paths keep only their file name and are
    /// joined to `science_dir`.
    pub fn parse(text: &str, science_dir: &Path) -> Result<Self> {
        let lines: Vec<&str> = text
            .lines()
            .map(|line| line.split('#').next().unwrap_or("").trim())
            .filter(|line| !line.is_empty())
            .collect();

        let start = lines.iter().position(|l| is_block_marker(l, "read"));
        let end = lines.iter().position(|l| is_block_marker(l, "end"));
        let (block, config_lines) = match (start, end) {
            (Some(s), Some(e)) if e > s => {
                let config: Vec<String> = lines[..s]
                    .iter()
                    .chain(&lines[e + 1..])
                    .map(|l| l.to_string())
                    .collect();
                (&lines[s + 1..e], config)
            }
            (Some(_), _) => {
                return Err(Error::Configuration(
                    "missing 'coadd2d end' after 'coadd2d read'".to_string(),
                ))
            }
            (None, _) => {
                return Err(Error::Configuration(
                    "missing 'coadd2d read' block".to_string(),
                ))
            }
        };

        let spec2d_files: Vec<PathBuf> = block
            .iter()
            .filter_map(|line| line.split_whitespace().next())
            .filter_map(|token| Path::new(token).file_name())
            .map(|name| science_dir.join(name))
            .collect();
        if spec2d_files.is_empty() {
            return Err(Error::Configuration(
                "the coadd2d block lists no spec2d files".to_string(),
            ));
        }

        let spectrograph = find_spectrograph(&config_lines).ok_or_else(|| {
            Error::Configuration("no 'spectrograph' in the [rdx] section".to_string())
        })?;

        Ok(Self {
            spectrograph,
            config_lines,
            spec2d_files,
        })
    }
}

fn is_block_marker(line: &str, word: &str) -> bool {
    let mut tokens = line.split_whitespace();
    tokens.next() == Some("coadd2d") && tokens.next() == Some(word) && tokens.next().is_none()
}

/// `spectrograph = ...` of the `[rdx]` section.
fn find_spectrograph(config_lines: &[String]) -> Option<String> {
    let mut section = String::new();
    for line in config_lines {
        if line.starts_with('[') {
            section = line
                .trim_matches(|c| c == '[' || c == ']')
                .trim()
                .to_ascii_lowercase();
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        if section == "rdx" && key.trim().eq_ignore_ascii_case("spectrograph") {
            return Some(value.trim().trim_matches(|c| c == '\'' || c == '"').to_string());
        }
    }
    None
}

/// Output basename: the token after the first `_` of the file name,
/// `spec2d_J1234+5678_GNIRS_x.fits` gives `J1234+5678`.
pub fn basename_from_spec2d(path: &Path) -> Option<String> {
    let name = path.file_stem()?.to_str()?;
    name.split('_')
        .nth(1)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// Spec2d files in `science_dir` whose name contains `obj`, sorted by name.
pub fn discover_spec2d(science_dir: &Path, obj: &str) -> Result<Vec<PathBuf>> {
    let files = common::file_utils::fits_files_matching(science_dir, "spec2d_", obj)
        .map_err(|e| Error::io(science_dir, e))?;
    if files.is_empty() {
        return Err(Error::MissingFile {
            path: science_dir.join(format!("spec2d_*{}*", obj)),
            det: None,
        });
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::scratch_dir;

    const FILE: &str = "\
# Coadd of two LRIS exposures
[rdx]
    spectrograph = keck_lris_blue
    detnum = 2
[coadd2d]
    samp_fact = 2.0   # finer grid

coadd2d read
    Science/spec2d_J0706+3020_LRISb_2017Feb02T064523.fits
    /data/run/Science/spec2d_J0706+3020_LRISb_2017Feb02T065911.fits  extra
coadd2d end
";

    #[test]
    fn test_parse_splits_config_and_files() {
        let file = Coadd2dFile::parse(FILE, Path::new("redux/Science")).unwrap();
        assert_eq!(file.spectrograph, "keck_lris_blue");
        assert_eq!(
            file.config_lines,
            vec![
                "[rdx]",
                "spectrograph = keck_lris_blue",
                "detnum = 2",
                "[coadd2d]",
                "samp_fact = 2.0",
            ]
        );
        assert_eq!(
            file.spec2d_files,
            vec![
                PathBuf::from("redux/Science/spec2d_J0706+3020_LRISb_2017Feb02T064523.fits"),
                PathBuf::from("redux/Science/spec2d_J0706+3020_LRISb_2017Feb02T065911.fits"),
            ]
        );
    }

    #[test]
    fn test_missing_end_is_an_error() {
        let text = "[rdx]\nspectrograph = keck_nires\ncoadd2d read\nspec2d_a_b.fits\n";
        let err = Coadd2dFile::parse(text, Path::new("Science")).unwrap_err();
        assert!(err.to_string().contains("coadd2d end"));
    }

    #[test]
    fn test_missing_spectrograph_is_an_error() {
        let text = "[coadd2d]\nsamp_fact = 2\ncoadd2d read\nspec2d_a_b.fits\ncoadd2d end\n";
        let err = Coadd2dFile::parse(text, Path::new("Science")).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_empty_block_is_an_error() {
        let text = "[rdx]\nspectrograph = keck_nires\ncoadd2d read\ncoadd2d end\n";
        assert!(Coadd2dFile::parse(text, Path::new("Science")).is_err());
    }

    #[test]
    fn test_basename_from_spec2d() {
        assert_eq!(
            basename_from_spec2d(Path::new("Science/spec2d_J1234+5678_GNIRS_2017Mar31T085412.181.fits")),
            Some("J1234+5678".to_string())
        );
        assert_eq!(basename_from_spec2d(Path::new("spec2d.fits")), None);
    }

    #[test]
    fn test_from_path_reads_file() {
        let dir = scratch_dir("coadd_file_from_path");
        let path = dir.join("lris.coadd2d");
        std::fs::write(&path, FILE).unwrap();

        let file = Coadd2dFile::from_path(&path, &dir.join("Science")).unwrap();
        assert_eq!(file.spec2d_files.len(), 2);

        let missing = Coadd2dFile::from_path(&dir.join("none.coadd2d"), &dir).unwrap_err();
        assert!(matches!(missing, Error::MissingFile { .. }));
    }

    #[test]
    fn test_discover_spec2d_filters_by_object() {
        let dir = scratch_dir("coadd_file_discover");
        for name in [
            "spec2d_J1234_GNIRS_b.fits",
            "spec2d_J1234_GNIRS_a.fits",
            "spec2d_J9999_GNIRS_a.fits",
            "spec1d_J1234_GNIRS_a.fits",
        ] {
            std::fs::write(dir.join(name), b"").unwrap();
        }

        let files = discover_spec2d(&dir, "J1234").unwrap();
        assert_eq!(
            files,
            vec![dir.join("spec2d_J1234_GNIRS_a.fits"), dir.join("spec2d_J1234_GNIRS_b.fits")]
        );
        assert!(matches!(
            discover_spec2d(&dir, "J0000").unwrap_err(),
            Error::MissingFile { .. }
        ));
    }
}
