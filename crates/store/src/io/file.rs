//! Flat-file backend: an append-only page file behind a beacon header.
//!
//! Pages are framed and appended after the [`HEADER_SIZE`]-byte header; a
//! page's key is its byte range. Nothing before the end of the file is ever
//! rewritten except the header, so every committed revision stays readable.
//!
//! Each reader and writer owns its own file handle and uses position-based
//! I/O, so handles never share a cursor.

#[cfg(unix)]
use std::os::unix::fs::FileExt;
#[cfg(windows)]
use std::os::windows::fs::FileExt;
use std::{
    fs::{self, File, OpenOptions},
    path::{Path, PathBuf},
};

use super::{
    Reader, Writer,
    frame::PageCodec,
    header::{BeaconSlot, FileHeader, HEADER_SIZE},
};
use crate::{
    error::{Error, Result},
    page::{Key, Page, PageReference},
};

/// Name of the page file inside the storage directory.
pub const PAGE_FILE: &str = "pages.dat";

/// Locates and initializes the page file of one storage.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    codec: PageCodec,
}

impl FileBackend {
    /// Opens the page file in `dir`, creating it with an empty header if absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be created or read, and a
    /// header error if an existing file is not a valid page file.
    pub fn open(dir: &Path, codec: PageCodec) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(PAGE_FILE);
        if path.exists() {
            let file = File::open(&path)?;
            read_header(&file)?;
        } else {
            let file = OpenOptions::new().read(true).write(true).create_new(true).open(&path)?;
            write_all_at_offset(&file, &FileHeader::new().to_bytes(), 0)?;
            file.sync_all()?;
        }
        Ok(Self { path, codec })
    }

    /// Path of the page file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if the file holds a beacon.
    ///
    /// # Errors
    ///
    /// Returns an error if the header cannot be read or both slots are corrupt.
    pub fn exists(&self) -> Result<bool> {
        let file = File::open(&self.path)?;
        Ok(read_header(&file)?.current_beacon()?.key().is_some())
    }

    /// Opens a reader with its own file handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be opened.
    pub fn reader(&self) -> Result<FileReader> {
        Ok(FileReader {
            file: File::open(&self.path)?,
            path: self.path.clone(),
            codec: self.codec.clone(),
        })
    }

    /// Opens a writer appending at the current end of the file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be opened.
    pub fn writer(&self) -> Result<FileWriter> {
        let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        let end = file.metadata()?.len().max(HEADER_SIZE as u64);
        Ok(FileWriter { reader: self.reader()?, file, end })
    }
}

/// Reads framed pages from the page file.
pub struct FileReader {
    file: File,
    path: PathBuf,
    codec: PageCodec,
}

impl Reader for FileReader {
    fn read(&self, reference: &PageReference) -> Result<Page> {
        let key = reference.key().ok_or_else(|| Error::Corrupted {
            reason: "cannot read a reference without a key".to_string(),
        })?;
        let Key::File { offset, length } = key else {
            return Err(Error::Corrupted { reason: format!("{key} is not a file key") });
        };
        let mut frame = vec![0u8; length as usize];
        read_exact_at_offset(&self.file, &mut frame, offset)?;
        self.codec.decode(key, reference.checksum(), &frame)
    }

    fn read_first_reference(&self) -> Result<PageReference> {
        let header = read_header(&self.file)?;
        let beacon = header.current_beacon()?;
        let Some(key) = beacon.key() else {
            let location = self.path.parent().unwrap_or(&self.path).to_path_buf();
            return Err(Error::NotInitialized { location });
        };
        let mut reference = PageReference::committed(key, beacon.checksum);
        let page = self.read(&reference)?;
        reference.attach_page(page);
        Ok(reference)
    }
}

/// Appends framed pages and publishes beacons.
pub struct FileWriter {
    reader: FileReader,
    file: File,
    end: u64,
}

impl Reader for FileWriter {
    fn read(&self, reference: &PageReference) -> Result<Page> {
        self.reader.read(reference)
    }

    fn read_first_reference(&self) -> Result<PageReference> {
        self.reader.read_first_reference()
    }
}

impl Writer for FileWriter {
    fn write(&mut self, reference: &mut PageReference) -> Result<()> {
        let page = reference.page().ok_or_else(|| Error::Corrupted {
            reason: "cannot write a reference without a page".to_string(),
        })?;
        let framed = self.reader.codec.encode(page)?;
        let length = u32::try_from(framed.bytes.len()).map_err(|_| Error::Corrupted {
            reason: format!(
                "page frame of {} bytes exceeds the file key range",
                framed.bytes.len()
            ),
        })?;
        write_all_at_offset(&self.file, &framed.bytes, self.end)?;
        reference.set_committed(Key::File { offset: self.end, length }, framed.checksum);
        self.end += u64::from(length);
        Ok(())
    }

    fn write_first_reference(&mut self, reference: &mut PageReference) -> Result<()> {
        self.write(reference)?;
        let Some(Key::File { offset, length }) = reference.key() else {
            return Err(Error::Corrupted { reason: "uber page written without a file key".into() });
        };
        // Page data must be durable before any beacon points at it.
        self.file.sync_data()?;

        let mut header = read_header(&self.file)?;
        header.set_secondary_slot(BeaconSlot::new(offset, length, reference.checksum()));
        write_all_at_offset(&self.file, &header.to_bytes(), 0)?;
        self.file.sync_data()?;

        header.flip_primary_slot();
        write_all_at_offset(&self.file, &header.to_bytes(), 0)?;
        self.file.sync_data()?;
        Ok(())
    }
}

fn read_header(file: &File) -> Result<FileHeader> {
    let mut buf = [0u8; HEADER_SIZE];
    read_exact_at_offset(file, &mut buf, 0)?;
    FileHeader::from_bytes(&buf)
}

// ---------------------------------------------------------------------------
// Position-based I/O helpers
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn read_exact_at_offset(file: &File, buf: &mut [u8], offset: u64) -> Result<()> {
    file.read_exact_at(buf, offset)?;
    Ok(())
}

/// `seek_read` moves the cursor; each handle is owned by one reader, so
/// nothing else observes it.
#[cfg(windows)]
fn read_exact_at_offset(file: &File, buf: &mut [u8], offset: u64) -> Result<()> {
    let mut pos = 0;
    while pos < buf.len() {
        let n = file.seek_read(&mut buf[pos..], offset + pos as u64)?;
        if n == 0 {
            return Err(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into());
        }
        pos += n;
    }
    Ok(())
}

#[cfg(unix)]
fn write_all_at_offset(file: &File, data: &[u8], offset: u64) -> Result<()> {
    file.write_all_at(data, offset)?;
    Ok(())
}

#[cfg(windows)]
fn write_all_at_offset(file: &File, data: &[u8], offset: u64) -> Result<()> {
    let mut pos = 0;
    while pos < data.len() {
        pos += file.seek_write(&data[pos..], offset + pos as u64)?;
    }
    Ok(())
}
