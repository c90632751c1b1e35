//! In-memory flat filesystem backed by heap allocations.
//!
//! `MemFs` is a single-directory filesystem where all data lives on the
//! kernel heap. It backs hosted runs of the syscall layer and mirrors the
//! semantics user programs rely on: names up to `NAME_MAX` bytes, files
//! created with a zero-filled initial size and capped at `MAX_FILE_SIZE`
//! bytes, removal that leaves open handles usable, one cursor per open
//! handle.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::Mutex;

use super::FileSystem;
use crate::config::limits::MAX_FILE_SIZE;

/// Longest file name accepted.
pub const NAME_MAX: usize = 14;

/// File contents, shared by the directory entry and every open handle.
type Inode = Arc<Mutex<Vec<u8>>>;

/// A flat in-memory filesystem.
#[derive(Debug, Default)]
pub struct MemFs {
    files: BTreeMap<String, Inode>,
    open_handles: usize,
}

impl MemFs {
    /// Create an empty filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `name` currently exists.
    pub fn exists(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    /// Snapshot of a file's contents.
    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        self.files.get(name).map(|inode| inode.lock().clone())
    }

    /// Number of handles opened and not yet closed.
    pub fn open_handles(&self) -> usize {
        self.open_handles
    }

    fn valid_name(name: &str) -> bool {
        !name.is_empty() && name.len() <= NAME_MAX && !name.contains('/')
    }
}

/// An open `MemFs` file.
#[derive(Debug)]
pub struct MemFile {
    inode: Inode,
    pos: u32,
}

impl FileSystem for MemFs {
    type File = MemFile;

    fn create(&mut self, name: &str, initial_size: u32) -> bool {
        if !Self::valid_name(name) || self.files.contains_key(name) {
            return false;
        }
        if initial_size as usize > MAX_FILE_SIZE {
            return false;
        }
        let mut data = Vec::new();
        if data.try_reserve_exact(initial_size as usize).is_err() {
            return false;
        }
        data.resize(initial_size as usize, 0);
        self.files
            .insert(name.to_string(), Arc::new(Mutex::new(data)));
        true
    }

    fn remove(&mut self, name: &str) -> bool {
        self.files.remove(name).is_some()
    }

    fn open(&mut self, name: &str) -> Option<MemFile> {
        let inode = self.files.get(name)?.clone();
        self.open_handles += 1;
        Some(MemFile { inode, pos: 0 })
    }

    fn read(&mut self, file: &mut MemFile, buf: &mut [u8]) -> usize {
        let data = file.inode.lock();
        let start = (file.pos as usize).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        drop(data);
        file.pos += n as u32;
        n
    }

    fn write(&mut self, file: &mut MemFile, buf: &[u8]) -> usize {
        let start = file.pos as usize;
        if start >= MAX_FILE_SIZE {
            return 0;
        }
        let n = buf.len().min(MAX_FILE_SIZE - start);
        let end = start + n;

        let mut data = file.inode.lock();
        if end > data.len() {
            let grow = end - data.len();
            if data.try_reserve(grow).is_err() {
                return 0;
            }
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(&buf[..n]);
        drop(data);
        file.pos = end as u32;
        n
    }

    fn length(&self, file: &MemFile) -> u32 {
        file.inode.lock().len() as u32
    }

    fn seek(&mut self, file: &mut MemFile, position: u32) {
        file.pos = position;
    }

    fn tell(&self, file: &MemFile) -> u32 {
        file.pos
    }

    fn close(&mut self, file: MemFile) {
        self.open_handles = self.open_handles.saturating_sub(1);
        drop(file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_rules() {
        let mut fs = MemFs::new();
        assert!(fs.create("notes", 16));
        assert!(!fs.create("notes", 0));
        assert!(!fs.create("", 0));
        assert!(!fs.create("fifteen-chars!!", 0));
        assert_eq!(fs.contents("notes"), Some(alloc::vec![0; 16]));
    }

    #[test]
    fn test_cursor_per_handle() {
        let mut fs = MemFs::new();
        fs.create("f", 0);
        let mut a = fs.open("f").unwrap();
        let mut b = fs.open("f").unwrap();

        assert_eq!(fs.write(&mut a, b"hello"), 5);
        assert_eq!(fs.tell(&a), 5);
        assert_eq!(fs.tell(&b), 0);

        let mut buf = [0u8; 8];
        assert_eq!(fs.read(&mut b, &mut buf), 5);
        assert_eq!(&buf[..5], b"hello");
        assert_eq!(fs.read(&mut b, &mut buf), 0);

        fs.seek(&mut b, 1);
        assert_eq!(fs.read(&mut b, &mut buf[..2]), 2);
        assert_eq!(&buf[..2], b"el");

        fs.close(a);
        fs.close(b);
        assert_eq!(fs.open_handles(), 0);
    }

    #[test]
    fn test_write_past_end_zero_fills() {
        let mut fs = MemFs::new();
        fs.create("f", 2);
        let mut f = fs.open("f").unwrap();
        fs.seek(&mut f, 4);
        assert_eq!(fs.write(&mut f, b"z"), 1);
        assert_eq!(fs.length(&f), 5);
        fs.close(f);
        assert_eq!(fs.contents("f").unwrap(), b"\0\0\0\0z");
    }

    #[test]
    fn test_create_respects_size_cap() {
        let mut fs = MemFs::new();
        assert!(!fs.create("huge", u32::MAX));
        assert!(!fs.create("big", MAX_FILE_SIZE as u32 + 1));
        assert!(!fs.exists("big"));
        assert!(fs.create("small", 512));
    }

    #[test]
    fn test_write_stops_at_size_cap() {
        let mut fs = MemFs::new();
        fs.create("f", 0);
        let mut f = fs.open("f").unwrap();

        fs.seek(&mut f, 0xFFFF_FFF0);
        assert_eq!(fs.write(&mut f, b"x"), 0);
        assert_eq!(fs.length(&f), 0);

        fs.seek(&mut f, MAX_FILE_SIZE as u32 - 2);
        assert_eq!(fs.write(&mut f, b"abcd"), 2);
        assert_eq!(fs.write(&mut f, b"e"), 0);
        assert_eq!(fs.length(&f) as usize, MAX_FILE_SIZE);
        assert_eq!(fs.tell(&f) as usize, MAX_FILE_SIZE);
        fs.close(f);
    }

    #[test]
    fn test_removed_file_stays_open() {
        let mut fs = MemFs::new();
        fs.create("gone", 3);
        let f = fs.open("gone").unwrap();
        assert!(fs.remove("gone"));
        assert!(!fs.exists("gone"));
        assert!(fs.open("gone").is_none());
        assert_eq!(fs.length(&f), 3);
        fs.close(f);
    }
}
