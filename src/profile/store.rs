// ProfileStore - named calibration profiles on disk
//
// Each profile is a text file named after the profile, one calibration point
// per line: "<illuminance> <brightness>". Malformed lines are skipped and
// reported, never fatal. A profile with no valid line is unusable.

use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use crate::error::{log_profile_error, ProfileError};

use super::curve::{CalibrationPoint, ProfileCurve};

/// A line rejected while parsing a profile
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedLine {
    /// 1-based line number
    pub line_number: usize,
    pub content: String,
}

/// Parse result: the valid points plus diagnostics for skipped lines
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedProfile {
    pub curve: ProfileCurve,
    pub skipped: Vec<SkippedLine>,
}

fn parse_line(line: &str) -> Option<CalibrationPoint> {
    let mut fields = line.split_whitespace();
    let illuminance: f32 = fields.next()?.parse().ok()?;
    let brightness: u8 = fields.next()?.parse().ok()?;
    if !illuminance.is_finite() || illuminance < 0.0 {
        return None;
    }
    Some(CalibrationPoint::new(illuminance, brightness))
}

/// Parse the profile text format
///
/// Blank lines are ignored silently; any other line that does not yield a
/// valid illuminance and an integer brightness in 0-255 is skipped and
/// reported in `ParsedProfile::skipped`.
pub fn parse_profile<R: Read>(reader: R) -> Result<ParsedProfile, std::io::Error> {
    let mut points = Vec::new();
    let mut skipped = Vec::new();

    for (idx, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match parse_line(trimmed) {
            Some(point) => points.push(point),
            None => skipped.push(SkippedLine {
                line_number: idx + 1,
                content: trimmed.to_string(),
            }),
        }
    }

    Ok(ParsedProfile {
        curve: ProfileCurve::new(points),
        skipped,
    })
}

/// Render a curve in the profile text format
pub fn format_profile(curve: &ProfileCurve) -> String {
    curve
        .points()
        .iter()
        .map(|p| format!("{} {}", p.illuminance, p.brightness))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Directory of named profile files
#[derive(Debug, Clone)]
pub struct ProfileStore {
    dir: PathBuf,
}

impl ProfileStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Names of all profiles in the store, sorted. A missing directory is
    /// created and reported as empty.
    pub fn list(&self) -> Result<Vec<String>, ProfileError> {
        if !self.dir.exists() {
            self.ensure_dir()?;
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.dir).map_err(|e| self.io_error(&self.dir, e))?;
        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();
        Ok(names)
    }

    /// Load one profile by name
    pub fn load(&self, name: &str) -> Result<ProfileCurve, ProfileError> {
        let path = self.profile_path(name)?;
        if !path.is_file() {
            return Err(ProfileError::NotFound {
                name: name.to_string(),
            });
        }
        let file = fs::File::open(&path).map_err(|e| self.io_error(&path, e))?;
        let parsed = parse_profile(file).map_err(|e| self.io_error(&path, e))?;
        Self::accept(name, parsed)
    }

    /// Load every usable profile; unusable ones are logged and left out
    pub fn load_all(&self) -> Result<Vec<(String, ProfileCurve)>, ProfileError> {
        let mut profiles = Vec::new();
        for name in self.list()? {
            match self.load(&name) {
                Ok(curve) => profiles.push((name, curve)),
                Err(err) => log_profile_error(&err, "load_all"),
            }
        }
        Ok(profiles)
    }

    /// Parse a profile from any reader and store it under `name`
    ///
    /// The stored file is normalized: sorted points, malformed lines dropped.
    pub fn import<R: Read>(&self, name: &str, reader: R) -> Result<ProfileCurve, ProfileError> {
        let path = self.profile_path(name)?;
        let parsed = parse_profile(reader).map_err(|e| self.io_error(&path, e))?;
        let curve = Self::accept(name, parsed)?;
        self.save(name, &curve)?;
        Ok(curve)
    }

    /// Write a curve under `name`, replacing any existing profile
    pub fn save(&self, name: &str, curve: &ProfileCurve) -> Result<(), ProfileError> {
        let path = self.profile_path(name)?;
        self.ensure_dir()?;
        fs::write(&path, format_profile(curve)).map_err(|e| self.io_error(&path, e))?;
        log::info!(
            "[ProfileStore] Saved profile '{}' ({} points) to {:?}",
            name,
            curve.len(),
            path
        );
        Ok(())
    }

    fn accept(name: &str, parsed: ParsedProfile) -> Result<ProfileCurve, ProfileError> {
        for line in &parsed.skipped {
            log::warn!(
                "[ProfileStore] Profile '{}': skipping malformed line {}: {:?}",
                name,
                line.line_number,
                line.content
            );
        }
        if parsed.curve.is_empty() {
            return Err(ProfileError::Empty {
                name: name.to_string(),
                skipped: parsed.skipped.len(),
            });
        }
        if !parsed.curve.is_usable() {
            log::warn!(
                "[ProfileStore] Profile '{}' has a single point and cannot interpolate",
                name
            );
        }
        Ok(parsed.curve)
    }

    fn profile_path(&self, name: &str) -> Result<PathBuf, ProfileError> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\']);
        if !valid {
            return Err(ProfileError::InvalidName {
                name: name.to_string(),
            });
        }
        Ok(self.dir.join(name))
    }

    fn ensure_dir(&self) -> Result<(), ProfileError> {
        fs::create_dir_all(&self.dir).map_err(|e| self.io_error(&self.dir, e))
    }

    fn io_error(&self, path: &Path, err: std::io::Error) -> ProfileError {
        ProfileError::Io {
            path: path.display().to_string(),
            details: err.to_string(),
        }
    }
}
