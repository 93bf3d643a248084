//! Serial port transport.

use std::io::{self, Read, Write};
use std::time::Duration;

use meshlink_node::Transport;
use serialport::SerialPort;
use tracing::debug;

use crate::SerialConfig;

/// The modem's serial port, opened 8N1.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    buf: Vec<u8>,
}

impl SerialTransport {
    /// Open the configured device.
    pub fn open(config: &SerialConfig) -> Result<Self, serialport::Error> {
        let port = serialport::new(&config.device, config.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .flow_control(serialport::FlowControl::None)
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .open()?;
        debug!(
            "opened {} at {} baud",
            config.device, config.baud_rate
        );
        Ok(SerialTransport {
            port,
            buf: vec![0u8; 1024],
        })
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(data.len())
    }

    fn read_nonblocking(&mut self) -> io::Result<Vec<u8>> {
        drain(&mut self.port, &mut self.buf)
    }
}

/// A byte source that can report how much input is waiting.
trait Waiting: Read {
    fn waiting(&mut self) -> io::Result<usize>;
}

impl Waiting for Box<dyn SerialPort> {
    fn waiting(&mut self) -> io::Result<usize> {
        Ok(self.bytes_to_read().map_err(io::Error::from)? as usize)
    }
}

/// Read until the port reports nothing waiting, `buf.len()` bytes at a time.
fn drain<P: Waiting>(port: &mut P, buf: &mut [u8]) -> io::Result<Vec<u8>> {
    let mut received = Vec::new();
    loop {
        let available = port.waiting()?;
        if available == 0 {
            return Ok(received);
        }

        let want = available.min(buf.len());
        match port.read(&mut buf[..want]) {
            Ok(0) => return Ok(received),
            Ok(n) => received.extend_from_slice(&buf[..n]),
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut => return Ok(received),
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Serves queued bytes, at most `chunk` per read.
    struct FakePort {
        queued: Vec<u8>,
        chunk: usize,
    }

    impl Read for FakePort {
        fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
            let n = out.len().min(self.chunk).min(self.queued.len());
            out[..n].copy_from_slice(&self.queued[..n]);
            self.queued.drain(..n);
            Ok(n)
        }
    }

    impl Waiting for FakePort {
        fn waiting(&mut self) -> io::Result<usize> {
            Ok(self.queued.len())
        }
    }

    #[test]
    fn test_drain_reads_past_buffer_size() {
        let data: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
        let mut port = FakePort {
            queued: data.clone(),
            chunk: usize::MAX,
        };
        let mut buf = vec![0u8; 1024];

        assert_eq!(drain(&mut port, &mut buf).expect("read"), data);
        assert!(port.queued.is_empty());
    }

    #[test]
    fn test_drain_short_reads() {
        let mut port = FakePort {
            queued: vec![0xC0; 100],
            chunk: 7,
        };
        let mut buf = vec![0u8; 1024];

        assert_eq!(drain(&mut port, &mut buf).expect("read").len(), 100);
    }

    #[test]
    fn test_drain_nothing_waiting() {
        let mut port = FakePort {
            queued: Vec::new(),
            chunk: 16,
        };
        let mut buf = vec![0u8; 16];

        assert!(drain(&mut port, &mut buf).expect("read").is_empty());
    }
}
