//! SharedMemoryRegion - POSIX shared memory wrapper.
//!
//! Provides safe abstraction over mmap and shm_open. The creator owns the
//! object and unlinks it on drop; every `open` maps one more view of the
//! same pages, which is how the producer and consumer each get their own
//! address-space mapping.

use std::ffi::CString;
use std::ptr::NonNull;

use crate::error::RegionError;
use crate::shm::RegionMemory;
use crate::types::RegionName;

/// Represents a mapped shared memory region.
///
/// This struct owns the mapping and will unmap it on drop.
pub struct SharedMemoryRegion {
    /// Name of the shared memory object.
    name: RegionName,
    /// Pointer to the mapped memory.
    ptr: NonNull<u8>,
    /// Size of the mapped region in bytes.
    size: usize,
    /// File descriptor for the shared memory object.
    fd: i32,
    /// Whether this instance created the SHM (and should unlink on drop).
    is_owner: bool,
}

// SAFETY: SharedMemoryRegion owns its mapping; it can move between threads.
unsafe impl Send for SharedMemoryRegion {}

// SAFETY: Concurrent access goes through the ring's atomic header protocol.
unsafe impl Sync for SharedMemoryRegion {}

impl SharedMemoryRegion {
    /// Maximum size for a shared memory region (1 GB).
    pub const MAX_SIZE: usize = 1024 * 1024 * 1024;

    fn validate_size(name: &RegionName, size: usize) -> Result<(), RegionError> {
        if size == 0 || size > Self::MAX_SIZE {
            return Err(RegionError::AllocationFailure {
                name: name.to_string(),
                reason: format!("Size {} outside 1..={}", size, Self::MAX_SIZE),
            });
        }
        Ok(())
    }

    fn c_name(name: &RegionName) -> Result<CString, RegionError> {
        CString::new(format!("/{}", name)).map_err(|e| RegionError::AllocationFailure {
            name: name.to_string(),
            reason: format!("Invalid name: {}", e),
        })
    }

    fn map(fd: i32, size: usize) -> Result<NonNull<u8>, RegionError> {
        // SAFETY: fd is valid, size is validated, offset 0 is valid
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(RegionError::MappingFailure {
                reason: format!("mmap failed: {}", std::io::Error::last_os_error()),
            });
        }

        NonNull::new(ptr as *mut u8).ok_or_else(|| RegionError::MappingFailure {
            reason: "mmap returned a null mapping".to_string(),
        })
    }

    /// Create a new shared memory object and map it, zero-filled.
    ///
    /// # Errors
    /// `AllocationFailure` if the object cannot be created or sized,
    /// `MappingFailure` if it cannot be mapped. The object is unlinked again
    /// on either failure.
    pub fn create(name: &RegionName, size: usize) -> Result<Self, RegionError> {
        Self::validate_size(name, size)?;
        let c_name = Self::c_name(name)?;

        // SAFETY: c_name is a valid CString, flags are valid POSIX flags
        let fd = unsafe {
            libc::shm_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_RDWR | libc::O_EXCL,
                0o600,
            )
        };

        if fd < 0 {
            let errno = std::io::Error::last_os_error();
            let reason = if errno.raw_os_error() == Some(libc::EEXIST) {
                "Shared memory already exists".to_string()
            } else {
                format!("shm_open failed: {}", errno)
            };
            return Err(RegionError::AllocationFailure {
                name: name.to_string(),
                reason,
            });
        }

        // SAFETY: fd is a valid file descriptor
        let result = unsafe { libc::ftruncate(fd, size as libc::off_t) };
        if result < 0 {
            let errno = std::io::Error::last_os_error();
            unsafe { libc::close(fd) };
            unsafe { libc::shm_unlink(c_name.as_ptr()) };
            return Err(RegionError::AllocationFailure {
                name: name.to_string(),
                reason: format!("ftruncate failed: {}", errno),
            });
        }

        let ptr = match Self::map(fd, size) {
            Ok(ptr) => ptr,
            Err(e) => {
                unsafe { libc::close(fd) };
                unsafe { libc::shm_unlink(c_name.as_ptr()) };
                return Err(e);
            }
        };

        // SAFETY: ptr is valid for size bytes
        unsafe {
            std::ptr::write_bytes(ptr.as_ptr(), 0, size);
        }

        tracing::debug!(name = %name, size = size, "Created shared memory region");

        Ok(Self {
            name: name.clone(),
            ptr,
            size,
            fd,
            is_owner: true,
        })
    }

    /// Map an additional view of an existing shared memory object.
    pub fn open(name: &RegionName, size: usize) -> Result<Self, RegionError> {
        Self::validate_size(name, size)?;
        let c_name = Self::c_name(name)?;

        // SAFETY: c_name is a valid CString
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0) };

        if fd < 0 {
            return Err(RegionError::MappingFailure {
                reason: format!(
                    "shm_open of /{} failed: {}",
                    name,
                    std::io::Error::last_os_error()
                ),
            });
        }

        let ptr = match Self::map(fd, size) {
            Ok(ptr) => ptr,
            Err(e) => {
                unsafe { libc::close(fd) };
                return Err(e);
            }
        };

        tracing::debug!(name = %name, size = size, "Opened shared memory view");

        Ok(Self {
            name: name.clone(),
            ptr,
            size,
            fd,
            is_owner: false,
        })
    }

    /// Get the name of this shared memory region.
    pub fn name(&self) -> &RegionName {
        &self.name
    }

    /// Whether this view created (and will unlink) the object.
    pub fn is_owner(&self) -> bool {
        self.is_owner
    }
}

impl RegionMemory for SharedMemoryRegion {
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn len(&self) -> usize {
        self.size
    }
}

impl Drop for SharedMemoryRegion {
    fn drop(&mut self) {
        // SAFETY: ptr and size were set during creation
        let result = unsafe { libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.size) };
        if result < 0 {
            tracing::error!(
                name = %self.name,
                error = %std::io::Error::last_os_error(),
                "Failed to unmap shared memory"
            );
        }

        // SAFETY: fd was opened during creation
        unsafe { libc::close(self.fd) };

        if self.is_owner {
            if let Ok(c_name) = Self::c_name(&self.name) {
                // SAFETY: c_name is a valid CString
                unsafe { libc::shm_unlink(c_name.as_ptr()) };
                tracing::debug!(name = %self.name, "Unlinked shared memory region");
            }
        }
    }
}
