// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! SharedMemoryRegion - shared memory wrapper.
//!
//! Client-owned memory that the monitor may later map as a channel.
//! Named regions use `shm_open` so another process can open them; anonymous
//! regions use a `MAP_SHARED | MAP_ANONYMOUS` mapping for in-process links.
//! All unsafe operations are encapsulated with bounds checking.

use std::ffi::CString;
use std::ptr::NonNull;

use crate::error::SharedMemoryError;
use crate::types::ClientAddress;

/// How the region was obtained, and what drop has to release.
enum Backing {
    /// Named POSIX shared memory object.
    Named { fd: i32, is_owner: bool },
    /// Anonymous shared mapping.
    Anonymous,
}

/// Represents a mapped shared memory region.
///
/// This struct owns the mapped memory and will unmap it on drop.
pub struct SharedMemoryRegion {
    /// Name of the region (informational for anonymous regions).
    name: String,
    /// Pointer to the mapped memory.
    ptr: NonNull<u8>,
    /// Size of the mapped region in bytes.
    size: usize,
    backing: Backing,
}

// SAFETY: SharedMemoryRegion can be sent between threads as it owns its memory.
unsafe impl Send for SharedMemoryRegion {}

// SAFETY: Accesses go through MappedView, which bounds-checks every copy.
// Concurrent writers to the same bytes are the caller's protocol concern.
unsafe impl Sync for SharedMemoryRegion {}

impl SharedMemoryRegion {
    /// Minimum size for a shared memory region.
    pub const MIN_SIZE: usize = 4096;

    /// Maximum size for a shared memory region (1 GB).
    pub const MAX_SIZE: usize = 1024 * 1024 * 1024;

    fn validate_size(name: &str, size: usize) -> Result<(), SharedMemoryError> {
        if size < Self::MIN_SIZE {
            return Err(SharedMemoryError::CreateFailed {
                name: name.to_string(),
                reason: format!("Size {} is below minimum {}", size, Self::MIN_SIZE),
            });
        }
        if size > Self::MAX_SIZE {
            return Err(SharedMemoryError::CreateFailed {
                name: name.to_string(),
                reason: format!("Size {} exceeds maximum {}", size, Self::MAX_SIZE),
            });
        }
        Ok(())
    }

    fn c_name(name: &str) -> Result<CString, SharedMemoryError> {
        CString::new(format!("/{}", name)).map_err(|e| SharedMemoryError::CreateFailed {
            name: name.to_string(),
            reason: format!("Invalid name: {}", e),
        })
    }

    /// Create a new named shared memory region.
    ///
    /// # Errors
    /// Returns SharedMemoryError if creation or mapping fails.
    pub fn create(name: &str, size: usize) -> Result<Self, SharedMemoryError> {
        Self::validate_size(name, size)?;

        if name.is_empty() {
            return Err(SharedMemoryError::CreateFailed {
                name: name.to_string(),
                reason: "Name cannot be empty".to_string(),
            });
        }

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
            if errno.raw_os_error() == Some(libc::EEXIST) {
                return Err(SharedMemoryError::CreateFailed {
                    name: name.to_string(),
                    reason: "Shared memory already exists".to_string(),
                });
            }
            return Err(SharedMemoryError::CreateFailed {
                name: name.to_string(),
                reason: format!("shm_open failed: {}", errno),
            });
        }

        // SAFETY: fd is a valid file descriptor
        let result = unsafe { libc::ftruncate(fd, size as libc::off_t) };
        if result < 0 {
            let errno = std::io::Error::last_os_error();
            unsafe { libc::close(fd) };
            unsafe { libc::shm_unlink(c_name.as_ptr()) };
            return Err(SharedMemoryError::CreateFailed {
                name: name.to_string(),
                reason: format!("ftruncate failed: {}", errno),
            });
        }

        let ptr = match Self::map(Some(fd), size) {
            Ok(ptr) => ptr,
            Err(e) => {
                unsafe { libc::close(fd) };
                unsafe { libc::shm_unlink(c_name.as_ptr()) };
                return Err(e);
            }
        };

        tracing::debug!(name = %name, size = size, "Created shared memory region");

        Ok(Self {
            name: name.to_string(),
            ptr,
            size,
            backing: Backing::Named { fd, is_owner: true },
        })
    }

    /// Open an existing named shared memory region.
    pub fn open(name: &str, size: usize) -> Result<Self, SharedMemoryError> {
        Self::validate_size(name, size)?;
        let c_name = Self::c_name(name)?;

        // SAFETY: c_name is a valid CString
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0) };

        if fd < 0 {
            return Err(SharedMemoryError::CreateFailed {
                name: name.to_string(),
                reason: format!("shm_open failed: {}", std::io::Error::last_os_error()),
            });
        }

        let ptr = match Self::map(Some(fd), size) {
            Ok(ptr) => ptr,
            Err(e) => {
                unsafe { libc::close(fd) };
                return Err(e);
            }
        };

        tracing::debug!(name = %name, size = size, "Opened shared memory region");

        Ok(Self {
            name: name.to_string(),
            ptr,
            size,
            backing: Backing::Named {
                fd,
                is_owner: false,
            },
        })
    }

    /// Create an anonymous shared region, zero-filled by the kernel.
    pub fn anonymous(label: &str, size: usize) -> Result<Self, SharedMemoryError> {
        Self::validate_size(label, size)?;
        let ptr = Self::map(None, size)?;

        tracing::debug!(label = %label, size = size, "Created anonymous shared region");

        Ok(Self {
            name: label.to_string(),
            ptr,
            size,
            backing: Backing::Anonymous,
        })
    }

    fn map(fd: Option<i32>, size: usize) -> Result<NonNull<u8>, SharedMemoryError> {
        let (flags, fd) = match fd {
            Some(fd) => (libc::MAP_SHARED, fd),
            None => (libc::MAP_SHARED | libc::MAP_ANONYMOUS, -1),
        };

        // SAFETY: size is validated, offset 0 is valid, fd is either valid or -1 for anonymous
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                flags,
                fd,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(SharedMemoryError::MapFailed {
                reason: format!("mmap failed: {}", std::io::Error::last_os_error()),
            });
        }

        NonNull::new(ptr as *mut u8).ok_or_else(|| SharedMemoryError::MapFailed {
            reason: "mmap returned null".to_string(),
        })
    }

    /// Get the name of this shared memory region.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the size of this shared memory region.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Address of the first byte, as the owning process sees it.
    pub fn base_address(&self) -> ClientAddress {
        ClientAddress::new(self.ptr.as_ptr() as u64)
    }

    /// Whether `[address, address + len)` lies inside this region.
    pub fn contains(&self, address: ClientAddress, len: usize) -> bool {
        let base = self.base_address().value();
        let Some(end) = address.value().checked_add(len as u64) else {
            return false;
        };
        address.value() >= base && end <= base + self.size as u64
    }

    /// Get a raw pointer to the shared memory.
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
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

        if let Backing::Named { fd, is_owner } = self.backing {
            // SAFETY: fd was opened during creation
            unsafe { libc::close(fd) };

            if is_owner {
                if let Ok(c_name) = Self::c_name(&self.name) {
                    // SAFETY: c_name is a valid CString
                    unsafe { libc::shm_unlink(c_name.as_ptr()) };
                    tracing::debug!(name = %self.name, "Unlinked shared memory region");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shm_size_validation() {
        assert!(SharedMemoryRegion::create("nclink-test-small", 100).is_err());
        assert!(
            SharedMemoryRegion::create("nclink-test-large", SharedMemoryRegion::MAX_SIZE + 1)
                .is_err()
        );
        assert!(SharedMemoryRegion::anonymous("small", 100).is_err());
    }

    #[test]
    fn test_shm_empty_name() {
        assert!(SharedMemoryRegion::create("", 4096).is_err());
    }

    #[test]
    fn test_named_region_shared_between_handles() {
        let name = format!("nclink-test-{}", std::process::id());
        let owner = SharedMemoryRegion::create(&name, 4096).unwrap();
        let other = SharedMemoryRegion::open(&name, 4096).unwrap();

        // SAFETY: both mappings are 4096 bytes and nothing else touches them
        unsafe {
            *owner.as_ptr().add(10) = 0x5a;
            assert_eq!(*other.as_ptr().add(10), 0x5a);
        }

        assert!(SharedMemoryRegion::create(&name, 4096).is_err());
    }

    #[test]
    fn test_anonymous_region_contains() {
        let region = SharedMemoryRegion::anonymous("contains", 4096).unwrap();
        let base = region.base_address().value();

        assert!(region.contains(ClientAddress::new(base), 4096));
        assert!(region.contains(ClientAddress::new(base + 100), 4));
        assert!(!region.contains(ClientAddress::new(base + 4093), 4));
        assert!(!region.contains(ClientAddress::new(base - 1), 4));
        assert!(!region.contains(ClientAddress::new(u64::MAX), 2));
    }
}
