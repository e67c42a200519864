//! Shared backing file for bucket bodies, and the tail/paged-body split that
//! lets a bucket grow in memory before it's flushed to disk.
//!
//! One [`SharedPageFile`] backs every bucket in a [`crate::bucket::BucketStore`].
//! Each bucket appends its own pages to it as it grows; nothing is ever
//! truncated or compacted mid-run, matching the temp-file behavior of the
//! system this format was distilled from.

use std::fs::File;
use std::os::unix::io::AsRawFd;
use std::ptr;
use std::rc::Rc;
use std::sync::Mutex;

use imgdb_types::{ImgdbError, Result};

fn system_page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 {
        4096
    } else {
        size as usize
    }
}

/// The single unlinked temp file every bucket's paged-out tail is written
/// into. Opened lazily on first page-out so a store with nothing paged out
/// yet never touches the filesystem.
pub struct SharedPageFile {
    file: Mutex<Option<File>>,
    page_size: usize,
}

impl SharedPageFile {
    pub fn new() -> Self {
        Self {
            file: Mutex::new(None),
            page_size: system_page_size(),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn with_fd<R>(&self, f: impl FnOnce(i32) -> Result<R>) -> Result<R> {
        let mut guard = self.file.lock().expect("page file mutex poisoned");
        if guard.is_none() {
            *guard = Some(tempfile::tempfile().map_err(ImgdbError::Io)?);
        }
        let fd = guard.as_ref().unwrap().as_raw_fd();
        f(fd)
    }

    /// Appends `len` bytes to the shared file (via `lseek`-to-end + `ftruncate`)
    /// and returns the byte offset the new region starts at.
    fn grow(&self, len: usize) -> Result<i64> {
        self.with_fd(|fd| unsafe {
            let cur = libc::lseek(fd, 0, libc::SEEK_END);
            if cur == -1 {
                return Err(ImgdbError::Io(std::io::Error::last_os_error()));
            }
            let end = cur + len as i64;
            if libc::ftruncate(fd, end) != 0 {
                return Err(ImgdbError::Io(std::io::Error::last_os_error()));
            }
            Ok(cur)
        })
    }

    fn mmap_shared(&self, offset: i64, len: usize) -> Result<*mut libc::c_void> {
        self.with_fd(|fd| unsafe {
            let ptr = libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                offset,
            );
            if ptr == libc::MAP_FAILED {
                Err(ImgdbError::Memory("mmap of shared page file failed".into()))
            } else {
                Ok(ptr)
            }
        })
    }

    fn mmap_fixed_shared(&self, at: *mut libc::c_void, offset: i64, len: usize) -> Result<()> {
        self.with_fd(|fd| unsafe {
            let ptr = libc::mmap(
                at,
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_FIXED | libc::MAP_SHARED,
                fd,
                offset,
            );
            if ptr == libc::MAP_FAILED || ptr != at {
                Err(ImgdbError::Memory(
                    "fixed mmap of shared page file chunk failed".into(),
                ))
            } else {
                Ok(())
            }
        })
    }
}

impl Default for SharedPageFile {
    fn default() -> Self {
        Self::new()
    }
}

/// A contiguous, page-aligned run backing part of a list's base. `used` is
/// how many of `len`'s bytes hold real records; the rest is slack left by
/// page-size rounding or by a `reserve` call that ran ahead of the data.
/// Only the last entry in a list's `pages` may have `used < len` — every
/// earlier page is always filled to capacity before a new one is opened.
#[derive(Debug, Clone, Copy)]
struct Page {
    offset: i64,
    len: usize,
    used: usize,
}

/// A growable list of fixed-size records, split into an in-memory `tail`
/// (freshly pushed, never yet written out) and a `base` made of pages
/// flushed to the shared file. Generic over the record width so the same
/// type serves both the 32-bit normal/simple index and the 64-bit alter-mode
/// image id.
pub struct PagedList<T: Copy> {
    shared: Rc<SharedPageFile>,
    tail: Vec<T>,
    pages: Vec<Page>,
    capacity: usize,
    size: usize,
}

impl<T: Copy> PagedList<T> {
    pub fn new(shared: Rc<SharedPageFile>) -> Self {
        Self {
            shared,
            tail: Vec::new(),
            pages: Vec::new(),
            capacity: 0,
            size: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.size + self.tail.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&mut self, value: T) {
        self.tail.push(value);
    }

    /// Finds and removes the first occurrence of `value` by swap-remove,
    /// preferring the in-memory tail. Mirrors the original's O(1) removal
    /// via "swap with the last element" rather than a shifting delete.
    pub fn remove_value(&mut self, value: T) -> bool
    where
        T: PartialEq,
    {
        if let Some(pos) = self.tail.iter().position(|v| *v == value) {
            self.tail.swap_remove(pos);
            return true;
        }
        if self.size == 0 {
            return false;
        }
        // `map_all` pages out any remaining tail before building the view, so
        // by the time we're searching here the swap source is always the
        // mapped base itself.
        let mut mapped = match self.map_all(true) {
            Ok(m) => m,
            Err(_) => return false,
        };
        let slice = mapped.as_mut_slice();
        if let Some(pos) = slice.iter().position(|v| *v == value) {
            slice[pos] = slice[self.size - 1];
            self.size -= 1;
            true
        } else {
            false
        }
    }

    fn record_size() -> usize {
        std::mem::size_of::<T>()
    }

    /// Flushes the entire in-memory tail to the shared file. If the last page
    /// still has unused capacity (left over from a `reserve` call, or from
    /// page-size rounding on a previous `page_out`), the tail is written into
    /// that leftover room in place; only when it doesn't fit is a new page
    /// opened. This keeps every page but the last fully packed with real
    /// data, so `map_all`'s page-by-page composition never puts a run of
    /// zero slack ahead of real records.
    pub fn page_out(&mut self) -> Result<()> {
        if self.tail.is_empty() {
            return Ok(());
        }
        let rec = Self::record_size();
        let bytes = self.tail.len() * rec;

        if let Some(last) = self.pages.last_mut() {
            if last.len - last.used >= bytes {
                let ptr = self.shared.mmap_shared(last.offset, last.len)?;
                unsafe {
                    ptr::copy_nonoverlapping(
                        self.tail.as_ptr() as *const u8,
                        (ptr as *mut u8).add(last.used),
                        bytes,
                    );
                    if libc::munmap(ptr, last.len) != 0 {
                        tracing::warn!("failed to unmap page-out scratch mapping");
                    }
                }
                last.used += bytes;
                self.size += self.tail.len();
                self.tail.clear();
                return Ok(());
            }
        }

        let page_size = self.shared.page_size();
        let aligned = (bytes + page_size - 1) / page_size * page_size;
        let offset = self.shared.grow(aligned)?;

        let ptr = self.shared.mmap_shared(offset, aligned)?;
        unsafe {
            ptr::copy_nonoverlapping(self.tail.as_ptr() as *const u8, ptr as *mut u8, bytes);
            if libc::munmap(ptr, aligned) != 0 {
                tracing::warn!("failed to unmap page-out scratch mapping");
            }
        }

        self.pages.push(Page {
            offset,
            len: aligned,
            used: bytes,
        });
        self.size += self.tail.len();
        self.capacity += aligned / rec;
        self.tail.clear();
        Ok(())
    }

    /// Maps every page plus the unflushed tail into one contiguous,
    /// anonymous region. `writable` is accepted for symmetry with the
    /// original API; this store is always mapped read-write since bucket
    /// entries are mutated in place on removal.
    pub fn map_all(&mut self, writable: bool) -> Result<MappedList<T>> {
        let _ = writable;
        if !self.tail.is_empty() {
            self.page_out()?;
        }
        if self.pages.is_empty() {
            return Ok(MappedList {
                base: ptr::null_mut(),
                region_len: 0,
                len: self.size,
                _marker: std::marker::PhantomData,
            });
        }
        let page_size = self.shared.page_size();
        let rec = Self::record_size();
        let total_bytes = self.capacity * rec;
        let region_len = (total_bytes + page_size - 1) / page_size * page_size;

        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                region_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANON,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(ImgdbError::Memory("anonymous mmap failed".into()));
        }

        let mut chunk = base as usize;
        for page in &self.pages {
            if let Err(e) = self
                .shared
                .mmap_fixed_shared(chunk as *mut libc::c_void, page.offset, page.len)
            {
                unsafe {
                    libc::munmap(base, region_len);
                }
                return Err(e);
            }
            chunk += page.len;
        }

        Ok(MappedList {
            base,
            region_len,
            len: self.size,
            _marker: std::marker::PhantomData,
        })
    }

    pub fn clear(&mut self) {
        self.tail.clear();
        self.pages.clear();
        self.capacity = 0;
        self.size = 0;
    }

    /// Pre-grows capacity to `n` records by allocating (but not filling) a
    /// page-aligned run in the shared file, so a subsequent replay of `n`
    /// pushes never calls `page_out` to grow disk space mid-way. The new
    /// page starts with `used: 0`: it holds no real records yet, so the next
    /// `page_out` writes into its front instead of treating it as data.
    pub fn reserve(&mut self, n: usize) {
        if n <= self.capacity {
            return;
        }
        let page_size = self.shared.page_size();
        let rec = Self::record_size();
        let want = (n - self.capacity) * rec;
        let aligned = (want + page_size - 1) / page_size * page_size;
        if let Ok(offset) = self.shared.grow(aligned) {
            self.pages.push(Page {
                offset,
                len: aligned,
                used: 0,
            });
            self.capacity += aligned / rec;
        }
    }

    /// Moves the in-memory tail into the paged base, compacting the base's
    /// backing allocation first when the tail is a small fraction of it.
    /// Called once after a full load so subsequent reads are purely
    /// memory-mapped.
    pub fn set_base(&mut self) -> Result<()> {
        if self.tail.is_empty() {
            return Ok(());
        }
        self.page_out()
    }
}

/// A window over a [`PagedList`]'s on-disk pages, composited into one
/// contiguous anonymous mapping. Unmapped on drop.
pub struct MappedList<T> {
    base: *mut libc::c_void,
    region_len: usize,
    len: usize,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Copy> MappedList<T> {
    pub fn as_slice(&self) -> &[T] {
        if self.base.is_null() || self.len == 0 {
            &[]
        } else {
            unsafe { std::slice::from_raw_parts(self.base as *const T, self.len) }
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        if self.base.is_null() || self.len == 0 {
            &mut []
        } else {
            unsafe { std::slice::from_raw_parts_mut(self.base as *mut T, self.len) }
        }
    }
}

impl<T> Drop for MappedList<T> {
    fn drop(&mut self) {
        if !self.base.is_null() {
            unsafe {
                if libc::munmap(self.base, self.region_len) != 0 {
                    tracing::warn!("failed to unmap bucket page window");
                }
            }
        }
    }
}

// SAFETY: the mapping is only ever touched from the thread that owns the
// `PagedList` that produced it; no aliasing access crosses threads.
unsafe impl<T> Send for MappedList<T> {}
