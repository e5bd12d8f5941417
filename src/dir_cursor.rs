//! A directory handle's read position.
//!
//! `original_source/tnfsd.py`'s `DirectoryHandle` tracks `current_index`
//! as a plain Python `int` that can be `-2`, `-1`, or `0..len(entries)`,
//! using the negative values as sentinels for `.` and `..`. This
//! implementation gives that the same treatment the REDESIGN notes call
//! for: a tagged enum instead of magic negative numbers.
//!
//! Only legacy `OPENDIR` handles start in the `Dot` state — `OPENDIRX`
//! handles start directly at the first real entry (spec §4.8 gives
//! `READDIRX` no dot-entry synthesis at all, matching `handle_readdirx`,
//! which reads `dir_handle.entries` directly rather than going through
//! `dir_handle.read_entry()`).

use std::path::{Path, PathBuf};

use crate::vfs::{Metadata, Vfs};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorPos {
    Dot,
    DotDot,
    At(usize),
    Done,
}

#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub meta: Metadata,
}

pub struct DirectoryCursor {
    pub host_path: PathBuf,
    entries: Vec<DirEntry>,
    pos: CursorPos,
}

impl DirectoryCursor {
    /// Opens for legacy `OPENDIR`/`READDIR`: snapshot the directory in
    /// whatever order the host returns it, dot entries first.
    pub fn open(vfs: &dyn Vfs, path: &Path) -> crate::vfs::Result<Self> {
        let entries = vfs
            .list(path)?
            .into_iter()
            .map(|(name, meta)| DirEntry { name, meta })
            .collect();
        Ok(Self {
            host_path: path.to_path_buf(),
            entries,
            pos: CursorPos::Dot,
        })
    }

    /// Opens for `OPENDIRX`: glob-filtered, case-insensitive
    /// lexicographic order, capped at `max_results` (0 means unlimited).
    pub fn open_extended(
        vfs: &dyn Vfs,
        path: &Path,
        pattern: &str,
        max_results: u16,
    ) -> crate::vfs::Result<Self> {
        let mut entries: Vec<DirEntry> = vfs
            .list(path)?
            .into_iter()
            .map(|(name, meta)| DirEntry { name, meta })
            .filter(|e| pattern.is_empty() || glob_match(pattern, &e.name))
            .collect();
        entries.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        if max_results != 0 {
            entries.truncate(max_results as usize);
        }
        Ok(Self {
            host_path: path.to_path_buf(),
            entries,
            pos: CursorPos::At(0),
        })
    }

    /// `READDIR`: one name per call, synthesizing `.`/`..` first.
    pub fn next_name(&mut self) -> Option<String> {
        match self.pos {
            CursorPos::Dot => {
                self.pos = CursorPos::DotDot;
                Some(".".to_string())
            }
            CursorPos::DotDot => {
                self.pos = CursorPos::At(0);
                Some("..".to_string())
            }
            CursorPos::At(i) => {
                if i >= self.entries.len() {
                    self.pos = CursorPos::Done;
                    None
                } else {
                    self.pos = CursorPos::At(i + 1);
                    Some(self.entries[i].name.clone())
                }
            }
            CursorPos::Done => None,
        }
    }

    fn index(&self) -> usize {
        match self.pos {
            CursorPos::Dot | CursorPos::DotDot => 0,
            CursorPos::At(i) => i,
            CursorPos::Done => self.entries.len(),
        }
    }

    /// `READDIRX`: looks at the next real entry without consuming it.
    /// Dot-entry states are treated as position 0 — `READDIRX` never
    /// synthesizes `.`/`..`.
    pub fn peek(&self) -> Option<&DirEntry> {
        self.entries.get(self.index())
    }

    pub fn advance(&mut self) -> Option<DirEntry> {
        let i = self.index();
        if i >= self.entries.len() {
            self.pos = CursorPos::Done;
            return None;
        }
        self.pos = CursorPos::At(i + 1);
        Some(self.entries[i].clone())
    }

    pub fn is_done(&self) -> bool {
        self.index() >= self.entries.len()
    }

    /// `TELLDIR`: the cursor position as the client's `uint32`. Dot
    /// states encode as the two's-complement wire representation of
    /// `-2`/`-1`, matching the signed internal position the reference
    /// implementation would (if it packed it at all) produce.
    pub fn tell(&self) -> u32 {
        match self.pos {
            CursorPos::Dot => (-2i32) as u32,
            CursorPos::DotDot => (-1i32) as u32,
            CursorPos::At(i) => i as u32,
            CursorPos::Done => self.entries.len() as u32,
        }
    }

    /// `SEEKDIR`: clamps to `[0, snapshot length]`. Always lands on a
    /// real-entry position — seeking can't re-enter the dot-entry states.
    pub fn seek(&mut self, pos: u32) {
        let clamped = (pos as usize).min(self.entries.len());
        self.pos = CursorPos::At(clamped);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

fn glob_match(pattern: &str, text: &str) -> bool {
    fn helper(p: &[char], t: &[char]) -> bool {
        match (p.first(), t.first()) {
            (None, None) => true,
            (Some('*'), _) => helper(&p[1..], t) || (!t.is_empty() && helper(p, &t[1..])),
            (Some('?'), Some(_)) => helper(&p[1..], &t[1..]),
            (Some(pc), Some(tc)) if pc == tc => helper(&p[1..], &t[1..]),
            _ => false,
        }
    }
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    helper(&p, &t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::NativeFs;
    use tempfile::TempDir;

    fn populate(dir: &TempDir) {
        std::fs::write(dir.path().join("b.txt"), b"").unwrap();
        std::fs::write(dir.path().join("A.txt"), b"").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
    }

    #[test]
    fn legacy_cursor_yields_dot_entries_first() {
        let dir = TempDir::new().unwrap();
        populate(&dir);
        let vfs = NativeFs::new();
        let mut cursor = DirectoryCursor::open(&vfs, dir.path()).unwrap();
        assert_eq!(cursor.next_name().as_deref(), Some("."));
        assert_eq!(cursor.next_name().as_deref(), Some(".."));
        let mut rest = Vec::new();
        while let Some(name) = cursor.next_name() {
            rest.push(name);
        }
        assert_eq!(rest.len(), 3);
    }

    #[test]
    fn extended_cursor_sorts_case_insensitively_and_skips_dot_entries() {
        let dir = TempDir::new().unwrap();
        populate(&dir);
        let vfs = NativeFs::new();
        let cursor = DirectoryCursor::open_extended(&vfs, dir.path(), "", 0).unwrap();
        let names: Vec<_> = cursor.entries.iter().map(|e| e.name.clone()).collect();
        let mut lowered: Vec<_> = names.iter().map(|n| n.to_lowercase()).collect();
        let mut sorted = lowered.clone();
        sorted.sort();
        lowered.sort();
        assert_eq!(lowered, sorted);
        assert!(!names.iter().any(|n| n == "." || n == ".."));
    }

    #[test]
    fn extended_cursor_applies_glob_and_cap() {
        let dir = TempDir::new().unwrap();
        populate(&dir);
        let vfs = NativeFs::new();
        let cursor = DirectoryCursor::open_extended(&vfs, dir.path(), "*.txt", 1).unwrap();
        assert_eq!(cursor.len(), 1);
    }

    #[test]
    fn tell_and_seek_round_trip_on_real_entries() {
        let dir = TempDir::new().unwrap();
        populate(&dir);
        let vfs = NativeFs::new();
        let mut cursor = DirectoryCursor::open_extended(&vfs, dir.path(), "", 0).unwrap();
        cursor.advance();
        let pos = cursor.tell();
        cursor.advance();
        cursor.seek(pos);
        assert_eq!(cursor.tell(), pos);
    }

    #[test]
    fn seek_clamps_past_end() {
        let dir = TempDir::new().unwrap();
        populate(&dir);
        let vfs = NativeFs::new();
        let mut cursor = DirectoryCursor::open_extended(&vfs, dir.path(), "", 0).unwrap();
        let len = cursor.len() as u32;
        cursor.seek(len + 50);
        assert_eq!(cursor.tell(), len);
        assert!(cursor.peek().is_none());
    }
}
