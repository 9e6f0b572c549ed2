//! GPIO chip access through the Linux character device (`/dev/gpiochipN`).
//!
//! Uses the v1 line-handle ABI: one ioctl to read chip metadata, one to claim a set of
//! lines as outputs, one to write all claimed lines in a single update. The chip fd and
//! the line-handle fd are owned, so every exit path releases them.

use std::ffi::CStr;
use std::fs::File;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::traits::{LabeledChip, OutputLines};

/// Maximum number of lines in one handle request.
pub const GPIOHANDLES_MAX: usize = 64;

/// Consumer label attached to every output request unless overridden.
pub const DEFAULT_CONSUMER: &str = "siggen";

const GPIO_MAX_NAME_SIZE: usize = 32;
const GPIOHANDLE_REQUEST_OUTPUT: u32 = 1 << 1;

mod abi {
    use super::{GPIOHANDLES_MAX, GPIO_MAX_NAME_SIZE};

    #[repr(C)]
    pub struct GpioChipInfo {
        pub name: [libc::c_char; GPIO_MAX_NAME_SIZE],
        pub label: [libc::c_char; GPIO_MAX_NAME_SIZE],
        pub lines: u32,
    }

    #[repr(C)]
    pub struct GpioHandleRequest {
        pub lineoffsets: [u32; GPIOHANDLES_MAX],
        pub flags: u32,
        pub default_values: [u8; GPIOHANDLES_MAX],
        pub consumer_label: [libc::c_char; GPIO_MAX_NAME_SIZE],
        pub lines: u32,
        pub fd: libc::c_int,
    }

    #[repr(C)]
    pub struct GpioHandleData {
        pub values: [u8; GPIOHANDLES_MAX],
    }

    nix::ioctl_read!(get_chipinfo, 0xB4, 0x01, GpioChipInfo);
    nix::ioctl_readwrite!(get_linehandle, 0xB4, 0x03, GpioHandleRequest);
    nix::ioctl_readwrite!(set_line_values, 0xB4, 0x09, GpioHandleData);
}

#[derive(Error, Debug)]
pub enum GpioError {
    #[error("failed to open gpio controller {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to get gpiochip info for {path}: {source}")]
    ChipInfo {
        path: PathBuf,
        #[source]
        source: nix::Error,
    },
    #[error("failed to request outputs {offsets:?}: {source}")]
    Request {
        offsets: Vec<u32>,
        #[source]
        source: nix::Error,
    },
    #[error("failed to set outputs: {0}")]
    Write(#[source] nix::Error),
    #[error("gpio controller is not open")]
    NotOpen,
    #[error("no output lines given")]
    NoLines,
    #[error("{0} output lines requested, at most 64 supported")]
    TooManyLines(usize),
    #[error("outputs already requested; reopen the controller to request again")]
    AlreadyRequested,
}

pub type GpioResult<T> = Result<T, GpioError>;

/// Handle to one GPIO controller and, once requested, its set of output lines.
#[derive(Debug)]
pub struct GpioChip {
    file: Option<File>,
    path: Option<PathBuf>,
    name: String,
    label: String,
    lines: u32,
    consumer: String,
    handle: Option<OwnedFd>,
    requested: usize,
    /// Last values written; positions not covered by a short write keep these.
    data: [u8; GPIOHANDLES_MAX],
}

impl GpioChip {
    pub fn new() -> Self {
        Self {
            file: None,
            path: None,
            name: String::new(),
            label: String::new(),
            lines: 0,
            consumer: DEFAULT_CONSUMER.to_string(),
            handle: None,
            requested: 0,
            data: [0; GPIOHANDLES_MAX],
        }
    }

    pub fn with_consumer(mut self, consumer: impl Into<String>) -> Self {
        self.consumer = consumer.into();
        self
    }

    /// Open the controller at `path`, consuming `self`.
    pub fn opened(mut self, path: impl AsRef<Path>) -> GpioResult<Self> {
        self.open(path)?;
        Ok(self)
    }

    /// Open the controller at `path`, closing any handle held before.
    pub fn open(&mut self, path: impl AsRef<Path>) -> GpioResult<()> {
        self.close();

        let path = path.as_ref();
        let file = File::open(path).map_err(|source| GpioError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let mut info: abi::GpioChipInfo = unsafe { std::mem::zeroed() };
        unsafe { abi::get_chipinfo(file.as_raw_fd(), &mut info) }.map_err(|source| {
            GpioError::ChipInfo {
                path: path.to_path_buf(),
                source,
            }
        })?;

        self.name = c_chars_to_string(&info.name);
        self.label = c_chars_to_string(&info.label);
        self.lines = info.lines;
        self.file = Some(file);
        self.path = Some(path.to_path_buf());

        log::debug!(
            "GPIO: opened {} name={} label={} lines={}",
            path.display(),
            self.name,
            self.label,
            self.lines
        );
        Ok(())
    }

    /// Release the line handle and the chip. No-op when already closed.
    pub fn close(&mut self) {
        if self.file.is_none() && self.handle.is_none() {
            return;
        }
        self.handle = None;
        self.requested = 0;
        self.data = [0; GPIOHANDLES_MAX];
        self.file = None;
        if let Some(path) = self.path.take() {
            log::debug!("GPIO: closed {}", path.display());
        }
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Number of lines the controller exposes, 0 when closed.
    pub fn line_count(&self) -> u32 {
        if self.is_open() {
            self.lines
        } else {
            0
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Claim `offsets` as outputs. Allowed once per open.
    pub fn request_outputs(&mut self, offsets: &[u32]) -> GpioResult<()> {
        let file = self.file.as_ref().ok_or(GpioError::NotOpen)?;
        if self.handle.is_some() {
            return Err(GpioError::AlreadyRequested);
        }
        if offsets.is_empty() {
            return Err(GpioError::NoLines);
        }
        if offsets.len() > GPIOHANDLES_MAX {
            return Err(GpioError::TooManyLines(offsets.len()));
        }

        let mut request: abi::GpioHandleRequest = unsafe { std::mem::zeroed() };
        request.lineoffsets[..offsets.len()].copy_from_slice(offsets);
        request.flags = GPIOHANDLE_REQUEST_OUTPUT;
        request.lines = offsets.len() as u32;
        for (dst, src) in request
            .consumer_label
            .iter_mut()
            .zip(self.consumer.bytes().take(GPIO_MAX_NAME_SIZE - 1))
        {
            *dst = src as libc::c_char;
        }

        unsafe { abi::get_linehandle(file.as_raw_fd(), &mut request) }.map_err(|source| {
            GpioError::Request {
                offsets: offsets.to_vec(),
                source,
            }
        })?;

        self.handle = Some(unsafe { OwnedFd::from_raw_fd(request.fd) });
        self.requested = offsets.len();
        self.data = [0; GPIOHANDLES_MAX];

        log::info!(
            "GPIO: requested outputs {:?} on {} as '{}'",
            offsets,
            self.label,
            self.consumer
        );
        Ok(())
    }

    pub fn requested_outputs(&self) -> usize {
        self.requested
    }

    /// Write the first `min(values.len(), requested)` lines in one update.
    ///
    /// No-op when no outputs were requested; extra values are ignored.
    pub fn set_outputs(&mut self, values: &[bool]) -> GpioResult<()> {
        let Some(handle) = self.handle.as_ref() else {
            return Ok(());
        };

        for (slot, &value) in self.data.iter_mut().zip(values).take(self.requested) {
            *slot = u8::from(value);
        }

        let mut data = abi::GpioHandleData { values: self.data };
        unsafe { abi::set_line_values(handle.as_raw_fd(), &mut data) }
            .map_err(GpioError::Write)?;
        Ok(())
    }
}

impl Default for GpioChip {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputLines for GpioChip {
    fn requested_outputs(&self) -> usize {
        self.requested
    }

    fn set_outputs(&mut self, values: &[bool]) -> GpioResult<()> {
        GpioChip::set_outputs(self, values)
    }
}

impl LabeledChip for GpioChip {
    fn label(&self) -> &str {
        &self.label
    }
}

fn c_chars_to_string(chars: &[libc::c_char]) -> String {
    let bytes: Vec<u8> = chars.iter().map(|&c| c as u8).collect();
    match CStr::from_bytes_until_nul(&bytes) {
        Ok(s) => s.to_string_lossy().into_owned(),
        Err(_) => String::from_utf8_lossy(&bytes).into_owned(),
    }
}
