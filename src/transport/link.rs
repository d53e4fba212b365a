//! Write serialization for the serial endpoint.
//!
//! The worker and the supervisor share one [`PrinterLink`]. Every device
//! write happens inside a [`LinkSession`], which holds the link mutex for
//! its whole lifetime, so a job's init + header + payload sequence can never
//! be split by a heartbeat.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};

use super::SerialPort;
use crate::error::Result;

/// Pause after every write.
pub const WRITE_THROTTLE: Duration = Duration::from_millis(100);

pub struct PrinterLink {
    port: Arc<dyn SerialPort>,
    write_lock: Mutex<()>,
    throttle: Duration,
}

impl PrinterLink {
    pub fn new(port: Arc<dyn SerialPort>) -> Self {
        Self {
            port,
            write_lock: Mutex::new(()),
            throttle: WRITE_THROTTLE,
        }
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    /// Wait for exclusive access to the device.
    pub async fn session(&self) -> LinkSession<'_> {
        LinkSession {
            link: self,
            _guard: self.write_lock.lock().await,
        }
    }

    /// Device node present and writable.
    pub fn exists(&self) -> bool {
        self.port.exists()
    }

    /// Drop the open handle, if any.
    pub fn close(&self) {
        self.port.close();
    }

    pub fn describe(&self) -> String {
        self.port.describe()
    }
}

/// Exclusive write access, released on drop.
pub struct LinkSession<'a> {
    link: &'a PrinterLink,
    _guard: MutexGuard<'a, ()>,
}

impl LinkSession<'_> {
    /// Hand `data` to the kernel, then pause for the throttle interval.
    pub async fn write(&self, data: &[u8]) -> Result<()> {
        self.link.port.write(data).await?;
        if !self.link.throttle.is_zero() {
            tokio::time::sleep(self.link.throttle).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockPort;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_write_throttles() {
        let port = Arc::new(MockPort::new());
        let link = PrinterLink::new(port.clone());

        let start = Instant::now();
        let session = link.session().await;
        session.write(&[1]).await.unwrap();
        session.write(&[2]).await.unwrap();
        drop(session);

        assert!(start.elapsed() >= WRITE_THROTTLE * 2);
        assert_eq!(port.writes(), vec![vec![1], vec![2]]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sessions_do_not_interleave() {
        let port = Arc::new(MockPort::new());
        let link = Arc::new(PrinterLink::new(port.clone()));

        let first = {
            let link = link.clone();
            tokio::spawn(async move {
                let session = link.session().await;
                for b in [1u8, 2, 3] {
                    session.write(&[b]).await.unwrap();
                }
            })
        };
        tokio::task::yield_now().await;
        let second = {
            let link = link.clone();
            tokio::spawn(async move {
                let session = link.session().await;
                session.write(&[9]).await.unwrap();
            })
        };

        first.await.unwrap();
        second.await.unwrap();
        assert_eq!(port.writes(), vec![vec![1], vec![2], vec![3], vec![9]]);
    }

    #[tokio::test]
    async fn test_failed_write_skips_throttle() {
        let port = Arc::new(MockPort::new());
        port.set_present(false);
        let link = PrinterLink::new(port.clone());

        let session = link.session().await;
        assert!(session.write(&[1]).await.is_err());
        assert!(!link.exists());
    }
}
