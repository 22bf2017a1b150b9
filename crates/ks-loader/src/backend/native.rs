//! Platform dynamic loader backend

use super::{ModuleBackend, ModuleHandle};
use crate::symbol::{EntryPoint, Selector};
use ks_core::LoaderError;
use std::ffi::CString;
use std::path::Path;

/// Symbol name prefix used for ordinal exports on platforms without export
/// ordinals, e.g. ordinal 10025 is exported as `ordinal_10025`
pub const ORDINAL_SYMBOL_PREFIX: &str = "ordinal_";

/// Backend using the platform dynamic loader
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeBackend;

impl NativeBackend {
    pub fn new() -> Self {
        Self
    }
}

fn symbol_name(selector: Selector) -> Option<CString> {
    let name = match selector {
        Selector::Name(name) => name.to_string(),
        Selector::Ordinal(n) => format!("{}{}", ORDINAL_SYMBOL_PREFIX, n),
    };
    CString::new(name).ok()
}

#[cfg(unix)]
mod sys {
    use super::*;
    use std::ffi::{c_void, CStr};
    use std::os::unix::ffi::OsStrExt;

    fn last_error() -> String {
        // SAFETY: dlerror returns null or a valid C string owned by the loader
        unsafe {
            let err = libc::dlerror();
            if err.is_null() {
                "unknown error".to_string()
            } else {
                CStr::from_ptr(err).to_string_lossy().into_owned()
            }
        }
    }

    pub fn open(path: &Path) -> Result<ModuleHandle, LoaderError> {
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|_| LoaderError::InvalidName(path.display().to_string()))?;

        // SAFETY: c_path is a valid NUL terminated string
        let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
        if handle.is_null() {
            return Err(LoaderError::Open {
                path: path.to_path_buf(),
                reason: last_error(),
            });
        }
        Ok(ModuleHandle(handle as usize))
    }

    pub fn symbol(handle: ModuleHandle, selector: Selector) -> Option<EntryPoint> {
        let name = symbol_name(selector)?;
        // SAFETY: handle came from dlopen and has not been closed
        let ptr = unsafe { libc::dlsym(handle.0 as *mut c_void, name.as_ptr()) };
        EntryPoint::new(ptr)
    }

    pub fn close(handle: ModuleHandle) {
        // SAFETY: handle came from dlopen and is closed exactly once
        if unsafe { libc::dlclose(handle.0 as *mut c_void) } != 0 {
            tracing::warn!("dlclose failed: {}", last_error());
        }
    }
}

#[cfg(windows)]
mod sys {
    use super::*;
    use std::ffi::{c_char, c_void};
    use std::os::windows::ffi::OsStrExt;

    #[link(name = "kernel32")]
    extern "system" {
        fn LoadLibraryW(file_name: *const u16) -> *mut c_void;
        fn GetProcAddress(module: *mut c_void, proc_name: *const c_char) -> *mut c_void;
        fn FreeLibrary(module: *mut c_void) -> i32;
        fn GetLastError() -> u32;
    }

    pub fn open(path: &Path) -> Result<ModuleHandle, LoaderError> {
        let wide: Vec<u16> = path.as_os_str().encode_wide().chain(Some(0)).collect();

        // SAFETY: wide is NUL terminated
        let handle = unsafe { LoadLibraryW(wide.as_ptr()) };
        if handle.is_null() {
            // SAFETY: no preconditions
            let code = unsafe { GetLastError() };
            return Err(LoaderError::Open {
                path: path.to_path_buf(),
                reason: format!("LoadLibrary error {}", code),
            });
        }
        Ok(ModuleHandle(handle as usize))
    }

    pub fn symbol(handle: ModuleHandle, selector: Selector) -> Option<EntryPoint> {
        let module = handle.0 as *mut c_void;
        let ptr = match selector {
            // Ordinals are passed in the low word of the name pointer
            // SAFETY: handle came from LoadLibraryW and has not been freed
            Selector::Ordinal(n) => unsafe { GetProcAddress(module, n as usize as *const c_char) },
            Selector::Name(_) => {
                let name = symbol_name(selector)?;
                // SAFETY: as above, name is NUL terminated
                unsafe { GetProcAddress(module, name.as_ptr()) }
            }
        };
        EntryPoint::new(ptr)
    }

    pub fn close(handle: ModuleHandle) {
        // SAFETY: handle came from LoadLibraryW and is freed exactly once
        if unsafe { FreeLibrary(handle.0 as *mut c_void) } == 0 {
            // SAFETY: no preconditions
            tracing::warn!("FreeLibrary failed: error {}", unsafe { GetLastError() });
        }
    }
}

impl ModuleBackend for NativeBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    fn open(&self, path: &Path) -> Result<Option<ModuleHandle>, LoaderError> {
        if !path.is_file() {
            return Ok(None);
        }
        sys::open(path).map(Some)
    }

    fn symbol(&self, handle: ModuleHandle, selector: Selector) -> Option<EntryPoint> {
        sys::symbol(handle, selector)
    }

    fn close(&self, handle: ModuleHandle) {
        sys::close(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = NativeBackend::new().open(&dir.path().join("absent"));
        assert_eq!(result, Ok(None));
    }

    #[test]
    fn test_garbage_file_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(crate::module::module_file_name("Fog"));
        std::fs::write(&path, b"not a shared library").unwrap();

        let result = NativeBackend::new().open(&path);
        assert!(matches!(result, Err(LoaderError::Open { .. })));
    }

    #[test]
    fn test_ordinal_symbol_name() {
        let name = symbol_name(Selector::Ordinal(10025)).unwrap();
        assert_eq!(name.to_str().unwrap(), "ordinal_10025");
        let name = symbol_name(Selector::Name("ToggleGameState")).unwrap();
        assert_eq!(name.to_str().unwrap(), "ToggleGameState");
    }
}
