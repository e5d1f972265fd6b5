use std::alloc::{self, Layout};
use std::fs::File;
use std::io::{self, Read};
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::ptr::NonNull;
use std::slice;
use std::sync::OnceLock;

#[cfg(target_os = "linux")]
use std::sync::atomic::{AtomicBool, Ordering};

use memmap2::{Mmap, MmapOptions};

/// Buffer alignment required by the widest kernel lane (one AVX2 register).
pub const BUF_ALIGN: usize = 32;

/// Fixed-capacity byte buffer with a guaranteed allocation alignment.
/// Dereferences to `[u8]` for transparent use.
///
/// Historically aligned allocation was duplicated per operating system
/// (`aligned_alloc` vs `_aligned_malloc`); a `Layout`-based allocation
/// collapses that into one code path, and `Drop` guarantees the matching
/// release on every exit path.
pub struct AlignedBuf {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl AlignedBuf {
    /// Allocate `cap` zeroed bytes aligned to `align` (a power of two).
    pub fn new(cap: usize, align: usize) -> io::Result<AlignedBuf> {
        if cap == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "buffer capacity must be non-zero",
            ));
        }
        let layout = Layout::from_size_align(cap, align).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "invalid buffer alignment")
        })?;
        // SAFETY: layout has non-zero size, checked above.
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        match NonNull::new(ptr) {
            Some(ptr) => Ok(AlignedBuf { ptr, layout }),
            None => Err(io::Error::new(
                io::ErrorKind::OutOfMemory,
                "aligned buffer allocation failed",
            )),
        }
    }

    pub fn capacity(&self) -> usize {
        self.layout.size()
    }
}

impl Deref for AlignedBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: ptr is valid for layout.size() bytes for the buffer's lifetime.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.layout.size()) }
    }
}

impl DerefMut for AlignedBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: exclusive borrow of the sole owner; same bounds as Deref.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.layout.size()) }
    }
}

impl Drop for AlignedBuf {
    fn drop(&mut self) {
        // SAFETY: allocated with exactly this layout in new().
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

/// Page size in bytes, discovered once via sysconf (4096 if unavailable).
pub fn page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();
    *PAGE_SIZE.get_or_init(|| {
        #[cfg(unix)]
        {
            let n = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
            if n > 0 {
                return n as usize;
            }
        }
        4096
    })
}

/// Track whether O_NOATIME is supported to avoid repeated failed open() attempts.
/// After the first EPERM, we never try O_NOATIME again (saves one syscall per file).
#[cfg(target_os = "linux")]
static NOATIME_SUPPORTED: AtomicBool = AtomicBool::new(true);

/// Open a file with O_NOATIME on Linux to avoid atime inode writes.
/// Caches whether O_NOATIME works to avoid double-open on every file.
#[cfg(target_os = "linux")]
pub fn open_noatime(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    if NOATIME_SUPPORTED.load(Ordering::Relaxed) {
        match File::options()
            .read(true)
            .custom_flags(libc::O_NOATIME)
            .open(path)
        {
            Ok(f) => return Ok(f),
            Err(ref e) if e.raw_os_error() == Some(libc::EPERM) => {
                // O_NOATIME requires file ownership or CAP_FOWNER — disable globally
                NOATIME_SUPPORTED.store(false, Ordering::Relaxed);
            }
            Err(e) => return Err(e), // Real error, propagate
        }
    }
    File::open(path)
}

#[cfg(not(target_os = "linux"))]
pub fn open_noatime(path: &Path) -> io::Result<File> {
    File::open(path)
}

/// Map a non-empty regular file read-only. Returns None for empty or
/// non-regular files and on any mmap failure, leaving the file position
/// untouched so the caller can fall back to streaming reads.
pub fn mmap_regular(file: &File) -> Option<Mmap> {
    let meta = file.metadata().ok()?;
    if !meta.file_type().is_file() || meta.len() == 0 {
        return None;
    }
    // SAFETY: read-only mapping; the file is never written through it.
    let mmap = unsafe { MmapOptions::new().map(file) }.ok()?;
    #[cfg(target_os = "linux")]
    {
        // HUGEPAGE first: must be set before any page faults occur.
        if mmap.len() >= 2 * 1024 * 1024 {
            let _ = mmap.advise(memmap2::Advice::HugePage);
        }
        let _ = mmap.advise(memmap2::Advice::Sequential);
        let _ = mmap.advise(memmap2::Advice::WillNeed);
    }
    Some(mmap)
}

/// Read as many bytes as possible into buf, retrying on partial reads.
/// Returns short only at end of stream, so a short return is the EOF
/// signal: pipes and slow devices that deliver partial read()s are not
/// mistaken for exhausted streams.
/// Fast path: regular file reads usually return the full buffer on the first call.
#[inline]
pub fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    // Fast path: first read() usually fills the entire buffer for regular files
    let n = loop {
        match reader.read(buf) {
            Ok(n) => break n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    };
    if n == buf.len() || n == 0 {
        return Ok(n);
    }
    // Slow path: partial read — retry to fill buffer (pipes, slow devices)
    let mut total = n;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}
