//! # Bluetooth RFCOMM Endpoint
//!
//! Talks to the M110 through an RFCOMM character device (`/dev/rfcommN`).
//! The node is created by the connection supervisor; this module only opens
//! it, writes to it and closes it.
//!
//! ## TTY Configuration
//!
//! When the node is a TTY it is switched to raw mode so binary raster data
//! passes through unmodified:
//!
//! - **No input processing**: IGNBRK, BRKINT, PARMRK, ISTRIP, etc. cleared
//! - **No software flow control**: IXON/IXOFF/IXANY cleared, since 0x11 and
//!   0x13 occur in raster data
//! - **No output processing**: OPOST cleared
//! - **8-bit characters**: CS8, no parity
//! - **Non-canonical, no echo**
//!
//! ## Write Timeout
//!
//! The node is opened non-blocking and writes wait on `poll(POLLOUT)`, so a
//! stalled link surfaces as `IoTransient` after [`WRITE_TIMEOUT`] instead of
//! hanging the worker.

use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::SerialPort;
use crate::error::{PrintError, Result};

/// Upper bound for a single write call to drain into the kernel.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// # RFCOMM Serial Port
///
/// Opens the device lazily on first write and keeps the handle until a
/// write fails or [`SerialPort::close`] is called.
///
/// ```no_run
/// use phomemo::transport::{RfcommPort, SerialPort};
///
/// # async fn demo() -> phomemo::error::Result<()> {
/// let port = RfcommPort::new("/dev/rfcomm0");
/// if port.exists() {
///     port.write(&[0x1B, 0x40]).await?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct RfcommPort {
    path: PathBuf,
    file: Arc<Mutex<Option<File>>>,
    write_timeout: Duration,
}

impl RfcommPort {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            file: Arc::new(Mutex::new(None)),
            write_timeout: WRITE_TIMEOUT,
        }
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SerialPort for RfcommPort {
    fn exists(&self) -> bool {
        is_writable(&self.path)
    }

    async fn write(&self, data: &[u8]) -> Result<()> {
        let slot = Arc::clone(&self.file);
        let path = self.path.clone();
        let data = data.to_vec();
        let timeout = self.write_timeout;

        tokio::task::spawn_blocking(move || {
            let mut guard = slot.lock().unwrap_or_else(|e| e.into_inner());
            write_blocking(&mut guard, &path, &data, timeout)
        })
        .await
        .map_err(|e| PrintError::IoFatal(format!("write task failed: {}", e)))?
    }

    fn close(&self) {
        let mut guard = self.file.lock().unwrap_or_else(|e| e.into_inner());
        if guard.take().is_some() {
            debug!(path = %self.path.display(), "closed device");
        }
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Open if needed, write everything, flush. Drops the handle on failure so
/// the next write reopens the node.
fn write_blocking(
    slot: &mut Option<File>,
    path: &Path,
    data: &[u8],
    timeout: Duration,
) -> Result<()> {
    let mut file = match slot.take() {
        Some(file) => file,
        None => open_device(path)?,
    };

    match write_with_timeout(&mut file, data, timeout).and_then(|_| file.flush()) {
        Ok(()) => {
            *slot = Some(file);
            Ok(())
        }
        Err(e) => {
            let err = PrintError::from_io("write", &e);
            warn!(path = %path.display(), error = %err, "write failed, dropping handle");
            Err(err)
        }
    }
}

fn open_device(path: &Path) -> Result<File> {
    let file = OpenOptions::new()
        .write(true)
        .custom_flags(libc::O_NONBLOCK | libc::O_NOCTTY)
        .open(path)
        .map_err(|e| PrintError::from_io(&format!("open {}", path.display()), &e))?;

    let fd = file.as_raw_fd();
    if unsafe { libc::isatty(fd) } == 1 {
        configure_tty_raw(fd).map_err(|e| PrintError::from_io("configure tty", &e))?;
    }
    debug!(path = %path.display(), "opened device");
    Ok(file)
}

fn write_with_timeout(file: &mut File, data: &[u8], timeout: Duration) -> io::Result<()> {
    let deadline = Instant::now() + timeout;
    let mut offset = 0;

    while offset < data.len() {
        match file.write(&data[offset..]) {
            Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero)),
            Ok(n) => offset += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() || !wait_writable(file.as_raw_fd(), remaining)? {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("{} of {} bytes written before timeout", offset, data.len()),
                    ));
                }
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Block until `fd` accepts more bytes. `Ok(false)` on timeout.
fn wait_writable(fd: i32, timeout: Duration) -> io::Result<bool> {
    let mut pfd = libc::pollfd {
        fd,
        events: libc::POLLOUT,
        revents: 0,
    };
    let ms = timeout.as_millis().min(i32::MAX as u128) as i32;
    let ready = unsafe { libc::poll(&mut pfd, 1, ms) };
    if ready < 0 {
        let err = io::Error::last_os_error();
        return if err.kind() == io::ErrorKind::Interrupted {
            Ok(true)
        } else {
            Err(err)
        };
    }
    if pfd.revents & (libc::POLLERR | libc::POLLHUP) != 0 {
        return Err(io::Error::from(io::ErrorKind::BrokenPipe));
    }
    Ok(ready > 0)
}

/// `access(path, W_OK)`: node exists and this process may write it.
pub fn is_writable(path: &Path) -> bool {
    match CString::new(path.as_os_str().as_bytes()) {
        Ok(c_path) => unsafe { libc::access(c_path.as_ptr(), libc::W_OK) == 0 },
        Err(_) => false,
    }
}

/// Configure a file descriptor for raw TTY mode.
///
/// Note: IXON/IXOFF/IXANY disable XON/XOFF software flow control. This is
/// critical because 0x11 (DC1) and 0x13 (DC3) appear in raster data.
fn configure_tty_raw(fd: i32) -> io::Result<()> {
    use std::mem::MaybeUninit;

    let mut termios = MaybeUninit::uninit();
    if unsafe { libc::tcgetattr(fd, termios.as_mut_ptr()) } != 0 {
        return Err(io::Error::last_os_error());
    }
    let mut termios = unsafe { termios.assume_init() };

    termios.c_iflag &= !(libc::IGNBRK
        | libc::BRKINT
        | libc::PARMRK
        | libc::ISTRIP
        | libc::INLCR
        | libc::IGNCR
        | libc::ICRNL
        | libc::IXON
        | libc::IXOFF
        | libc::IXANY);
    termios.c_oflag &= !libc::OPOST;
    termios.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);
    termios.c_cflag &= !(libc::CSIZE | libc::PARENB);
    termios.c_cflag |= libc::CS8;

    if unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn test_missing_device_is_not_connected() {
        let dir = tempfile::tempdir().unwrap();
        let port = RfcommPort::new(dir.path().join("rfcomm9"));
        assert!(!port.exists());

        let err = port.write(&[0x1B, 0x40]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotConnected);
    }

    #[tokio::test]
    async fn test_plain_file_receives_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rfcomm0");
        std::fs::write(&path, b"").unwrap();

        let port = RfcommPort::new(&path);
        assert!(port.exists());
        port.write(&[0x1B, 0x40]).await.unwrap();
        port.write(&[0x1D, 0x76]).await.unwrap();
        port.close();

        assert_eq!(std::fs::read(&path).unwrap(), vec![0x1B, 0x40, 0x1D, 0x76]);
        assert_eq!(port.describe(), path.display().to_string());
    }

    #[test]
    fn test_is_writable_rejects_missing() {
        assert!(!is_writable(Path::new("/nonexistent/rfcomm0")));
    }
}
