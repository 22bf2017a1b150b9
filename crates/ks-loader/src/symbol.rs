//! Selectors, entry points and typed bindings

use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

/// How an entry point is looked up inside a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Selector {
    /// Stable numeric export identifier
    Ordinal(u16),
    /// Exported symbol name
    Name(&'static str),
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ordinal(n) => write!(f, "#{}", n),
            Self::Name(name) => write!(f, "{}", name),
        }
    }
}

/// Address of a resolved export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryPoint(NonNull<c_void>);

impl EntryPoint {
    /// Wrap a raw export address, `None` if null
    pub fn new(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(Self)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

// SAFETY: an entry point is an immutable code address
unsafe impl Send for EntryPoint {}
unsafe impl Sync for EntryPoint {}

/// Function pointer type an entry point can be bound as
///
/// # Safety
///
/// Implementors must be plain function pointer types so that an
/// [`EntryPoint`] and `Self` share the same representation.
pub unsafe trait Signature: Copy {
    /// Reinterpret an entry point as this function type
    ///
    /// # Safety
    ///
    /// The export behind `entry` must really have this signature and stay
    /// mapped for as long as the returned pointer is used.
    unsafe fn from_entry(entry: EntryPoint) -> Self;

    /// Address of this function
    fn into_entry(self) -> EntryPoint;
}

macro_rules! impl_signature {
    ($abi:tt; $($arg:ident),*) => {
        unsafe impl<R $(, $arg)*> Signature for extern $abi fn($($arg),*) -> R {
            unsafe fn from_entry(entry: EntryPoint) -> Self {
                std::mem::transmute_copy::<*mut c_void, Self>(&entry.as_ptr())
            }

            fn into_entry(self) -> EntryPoint {
                // SAFETY: function pointers are never null
                EntryPoint(unsafe { NonNull::new_unchecked(self as *mut c_void) })
            }
        }
    };
}

impl_signature!("C";);
impl_signature!("C"; A);
impl_signature!("C"; A, B);
impl_signature!("C"; A, B, C);
impl_signature!("C"; A, B, C, D);
impl_signature!("system";);
impl_signature!("system"; A);
impl_signature!("system"; A, B);
impl_signature!("system"; A, B, C);
impl_signature!("system"; A, B, C, D);

/// A selector paired with its typed entry point, or the fact that there is
/// none
///
/// The lifetime ties the binding to the loader that produced it, so a module
/// cannot be unloaded while one of its bindings is still reachable.
#[derive(Clone, Copy)]
pub struct Binding<'l, F> {
    module: &'static str,
    selector: Selector,
    target: Option<F>,
    _loader: PhantomData<&'l ()>,
}

impl<'l, F: Signature> Binding<'l, F> {
    pub(crate) fn new(module: &'static str, selector: Selector, target: Option<F>) -> Self {
        Self {
            module,
            selector,
            target,
            _loader: PhantomData,
        }
    }

    /// A binding that will never call anything
    pub fn unresolved(module: &'static str, selector: Selector) -> Self {
        Self::new(module, selector, None)
    }

    pub fn module(&self) -> &'static str {
        self.module
    }

    pub fn selector(&self) -> Selector {
        self.selector
    }

    pub fn is_resolved(&self) -> bool {
        self.target.is_some()
    }

    /// Typed entry point, if resolved
    pub fn get(&self) -> Option<F> {
        self.target
    }

    /// Run `call` with the entry point, or return `fallback` when unresolved
    pub fn call_or<T>(&self, fallback: T, call: impl FnOnce(F) -> T) -> T {
        match self.target {
            Some(f) => call(f),
            None => fallback,
        }
    }
}

impl<F> fmt::Debug for Binding<'_, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("module", &self.module)
            .field("selector", &self.selector)
            .field("resolved", &self.target.is_some())
            .finish()
    }
}
