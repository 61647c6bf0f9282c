use std::path::{Path, PathBuf};

use crate::error::Error;

/// Writes every fetched page to a numbered file for offline inspection.
///
/// Each client owns its own `Capture`, so two clients pointed at different
/// directories never collide. Numbering continues after the highest page
/// already in the directory, so a later capture never overwrites an earlier one.
#[derive(Debug)]
pub struct Capture {
    dir: PathBuf,
    next: u32,
}

impl Capture {
    /// # Errors
    ///
    /// Returns [`Error::Capture`] if the directory cannot be created or listed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(Error::Capture)?;
        let last = last_page(&dir)?;
        Ok(Self {
            dir,
            next: last.saturating_add(1),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist one page body; returns the file written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Capture`] if the file cannot be written.
    pub fn record(&mut self, body: &str) -> Result<PathBuf, Error> {
        let path = self.dir.join(format!("{:04}.html", self.next));
        std::fs::write(&path, body).map_err(Error::Capture)?;
        self.next += 1;
        Ok(path)
    }
}

/// Highest `NNNN.html` page number in `dir`, or 0 when there is none.
fn last_page(dir: &Path) -> Result<u32, Error> {
    let mut last = 0;
    for entry in std::fs::read_dir(dir).map_err(Error::Capture)? {
        let name = entry.map_err(Error::Capture)?.file_name();
        let number = name
            .to_str()
            .and_then(|name| name.strip_suffix(".html"))
            .and_then(|stem| stem.parse::<u32>().ok());
        if let Some(number) = number {
            last = last.max(number);
        }
    }
    Ok(last)
}
