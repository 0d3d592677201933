// Client-side output file handling

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::common::error::{Error, Result};

/// Output written to `<name>.part` and renamed into place on success.
///
/// Dropping an uncommitted `PartFile` deletes the partial output, so an
/// aborted or cancelled transfer never leaves a truncated file behind.
pub struct PartFile {
    file: Option<BufWriter<File>>,
    part_path: PathBuf,
    final_path: PathBuf,
    bytes_written: u64,
}

impl PartFile {
    /// Create the `.part` file next to `final_path`
    ///
    /// # Arguments
    /// * `final_path` - Where the completed file should end up
    pub fn create(final_path: &Path) -> Result<Self> {
        let file_name = final_path
            .file_name()
            .ok_or_else(|| Error::Config(format!("Output path has no file name: {}", final_path.display())))?;

        if let Some(parent) = final_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut part_name = file_name.to_os_string();
        part_name.push(".part");
        let part_path = final_path.with_file_name(part_name);
        let file = File::create(&part_path)?;

        Ok(Self {
            file: Some(BufWriter::new(file)),
            part_path,
            final_path: final_path.to_path_buf(),
            bytes_written: 0,
        })
    }

    pub fn part_path(&self) -> &Path {
        &self.part_path
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Flush, sync and rename into place
    pub fn commit(mut self) -> Result<PathBuf> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            file.get_ref().sync_all()?;
        }
        fs::rename(&self.part_path, &self.final_path)?;

        log::info!(
            "Saved {} ({} bytes)",
            self.final_path.display(),
            self.bytes_written
        );
        // nothing left for Drop to clean up
        self.part_path = PathBuf::new();
        Ok(self.final_path.clone())
    }
}

impl Write for PartFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "part file already committed"))?;
        let n = file.write(buf)?;
        self.bytes_written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        // close before removing
        self.file.take();
        if !self.part_path.as_os_str().is_empty() {
            if let Err(e) = fs::remove_file(&self.part_path) {
                log::debug!("Could not remove {}: {}", self.part_path.display(), e);
            } else {
                log::info!("Removed partial output {}", self.part_path.display());
            }
        }
    }
}
