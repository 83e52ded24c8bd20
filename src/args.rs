//! Argument marshaling for process-style entry points.
//!
//! A C `main` wants `argc` and an `argv` of NUL-terminated strings. The
//! arguments are laid out back to back in a single zero-initialized buffer
//! (each followed by its terminator) and `argv` holds one pointer per argument
//! into that buffer.
//!
//! The buffer is sized in a first pass (`Σ(len + 1)`, no slack) and filled in
//! a second. It is owned by [`ArgBuffer`]; the pointer table ([`ArgVector`])
//! borrows it, so the pointers can never outlive the memory they point into.
//!
//! `argv` is **not** terminated by a trailing null pointer. Use
//! [`ArgVector::with_null_terminator`] for entry points that rely on it.

use std::ffi::{c_char, c_int, CStr};
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::error::LaunchError;
use crate::logging::NATIVE_TAG;

/// What to do with an argument that contains a NUL byte.
///
/// A NUL inside an argument would end that C string early, silently dropping
/// the rest of the argument.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NulPolicy {
    /// Fail the launch with `LaunchError::InvalidArgument`.
    #[default]
    Reject,
    /// Keep the bytes up to the first NUL and log a warning.
    Truncate,
}

/// Contiguous storage for NUL-terminated arguments.
#[derive(Debug)]
pub struct ArgBuffer {
    bytes: Vec<u8>,
    offsets: Vec<usize>,
}

impl ArgBuffer {
    /// Lay out `args` in one buffer.
    ///
    /// `limit` caps the buffer size; exceeding it is reported exactly like a
    /// failed allocation.
    pub fn marshal<S: AsRef<[u8]>>(
        args: &[S],
        policy: NulPolicy,
        limit: Option<usize>,
    ) -> Result<Self, LaunchError> {
        if c_int::try_from(args.len()).is_err() {
            return Err(LaunchError::TooManyArguments { count: args.len() });
        }

        // First pass: size of every argument plus its terminator.
        let mut lengths = Vec::with_capacity(args.len());
        let mut total: usize = 0;
        for (index, arg) in args.iter().enumerate() {
            let bytes = arg.as_ref();
            let len = match bytes.iter().position(|&b| b == 0) {
                None => bytes.len(),
                Some(nul) => match policy {
                    NulPolicy::Reject => {
                        error!(target: NATIVE_TAG, "Argument {} contains a NUL byte at {}", index, nul);
                        return Err(LaunchError::InvalidArgument { index });
                    }
                    NulPolicy::Truncate => {
                        warn!(target: NATIVE_TAG, "Argument {} truncated at NUL byte {} of {}", index, nul, bytes.len());
                        nul
                    }
                },
            };
            total = match total.checked_add(len).and_then(|t| t.checked_add(1)) {
                Some(t) => t,
                None => {
                    error!(target: NATIVE_TAG, "Arguments buffer size overflows");
                    return Err(LaunchError::Allocation { requested: usize::MAX });
                }
            };
            lengths.push(len);
        }

        if limit.is_some_and(|limit| total > limit) {
            error!(target: NATIVE_TAG, "Failed to allocate memory for arguments buffer: {} bytes exceeds the limit", total);
            return Err(LaunchError::Allocation { requested: total });
        }

        let mut bytes = Vec::new();
        if bytes.try_reserve_exact(total).is_err() {
            error!(target: NATIVE_TAG, "Failed to allocate memory for arguments buffer: {} bytes", total);
            return Err(LaunchError::Allocation { requested: total });
        }
        bytes.resize(total, 0);

        // Second pass: copy each argument at the cursor. The terminator is
        // already there since the buffer is zeroed.
        let mut offsets = Vec::with_capacity(args.len());
        let mut cursor = 0;
        for (arg, &len) in args.iter().zip(&lengths) {
            bytes[cursor..cursor + len].copy_from_slice(&arg.as_ref()[..len]);
            offsets.push(cursor);
            cursor += len + 1;
        }
        debug_assert_eq!(cursor, total);

        Ok(Self { bytes, offsets })
    }

    /// Total size in bytes, terminators included.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of arguments.
    pub fn count(&self) -> usize {
        self.offsets.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Build the pointer table for a native call.
    ///
    /// Takes `&mut self` because entry points receive `char **` and are allowed
    /// to write through it (libuv rewrites argv memory for the process title).
    pub fn vector(&mut self) -> ArgVector<'_> {
        let ArgBuffer { bytes, offsets } = self;
        let len = bytes.len();
        let base = bytes.as_mut_ptr();
        let ptrs = offsets
            .iter()
            // SAFETY: every offset is < len, so the result stays inside the allocation
            .map(|&offset| unsafe { base.add(offset) }.cast::<c_char>())
            .collect();

        ArgVector {
            ptrs,
            base,
            len,
            offsets: offsets.as_slice(),
            _buffer: PhantomData,
        }
    }
}

/// `argv`: one pointer per argument into an [`ArgBuffer`].
pub struct ArgVector<'buf> {
    ptrs: Vec<*mut c_char>,
    base: *mut u8,
    len: usize,
    offsets: &'buf [usize],
    _buffer: PhantomData<&'buf mut [u8]>,
}

impl<'buf> ArgVector<'buf> {
    pub fn argc(&self) -> c_int {
        // marshal() refuses counts that do not fit
        self.ptrs.len() as c_int
    }

    pub fn len(&self) -> usize {
        self.ptrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ptrs.is_empty()
    }

    pub fn as_mut_ptr(&mut self) -> *mut *mut c_char {
        self.ptrs.as_mut_ptr()
    }

    pub fn as_ptr(&self) -> *const *mut c_char {
        self.ptrs.as_ptr()
    }

    /// Read an argument back. Returns `None` if the entry point overwrote its
    /// terminator.
    pub fn get(&self, index: usize) -> Option<&CStr> {
        let offset = *self.offsets.get(index)?;
        // SAFETY: base..base+len is the buffer borrowed for 'buf and offset < len
        let tail = unsafe { std::slice::from_raw_parts(self.base.add(offset), self.len - offset) };
        CStr::from_bytes_until_nul(tail).ok()
    }

    /// One entry per slot, `None` where the terminator was overwritten.
    pub fn iter(&self) -> impl Iterator<Item = Option<&CStr>> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }

    /// Lossy UTF-8 copies of every argument, in order. A slot whose
    /// terminator was overwritten reads back as an empty string.
    pub fn to_strings(&self) -> Vec<String> {
        self.iter()
            .enumerate()
            .map(|(index, arg)| match arg {
                Some(arg) => arg.to_string_lossy().into_owned(),
                None => {
                    warn!(target: NATIVE_TAG, "Argument {} lost its terminator", index);
                    String::new()
                }
            })
            .collect()
    }

    /// Copy of the pointer table with a trailing null entry (`argv[argc] == NULL`).
    pub fn with_null_terminator(&self) -> Vec<*mut c_char> {
        let mut ptrs = Vec::with_capacity(self.ptrs.len() + 1);
        ptrs.extend_from_slice(&self.ptrs);
        ptrs.push(std::ptr::null_mut());
        ptrs
    }
}
