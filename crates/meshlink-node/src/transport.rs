//! Byte transport between the host and the modem.

use std::io;

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};

/// A duplex byte stream with no message boundaries.
///
/// Reads never block: an empty buffer means nothing has arrived yet.
pub trait Transport {
    /// Write bytes, returning how many were accepted.
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Return whatever bytes are available, possibly none.
    fn read_nonblocking(&mut self) -> io::Result<Vec<u8>>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        (**self).write(data)
    }

    fn read_nonblocking(&mut self) -> io::Result<Vec<u8>> {
        (**self).read_nonblocking()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        (**self).write(data)
    }

    fn read_nonblocking(&mut self) -> io::Result<Vec<u8>> {
        (**self).read_nonblocking()
    }
}

/// One end of an in-memory byte link.
///
/// Writes on one end become readable on the other. Chunk boundaries are not
/// preserved by `read_nonblocking`, which concatenates everything queued.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

impl ChannelTransport {
    /// Create two connected ends.
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = unbounded();
        let (b_tx, a_rx) = unbounded();
        (
            ChannelTransport { tx: a_tx, rx: a_rx },
            ChannelTransport { tx: b_tx, rx: b_rx },
        )
    }

    /// Number of chunks waiting to be read.
    pub fn queued(&self) -> usize {
        self.rx.len()
    }
}

impl Transport for ChannelTransport {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.tx
            .send(data.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer disconnected"))?;
        Ok(data.len())
    }

    fn read_nonblocking(&mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(chunk) => out.extend_from_slice(&chunk),
                Err(TryRecvError::Empty) => return Ok(out),
                Err(TryRecvError::Disconnected) if out.is_empty() => {
                    return Err(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "peer disconnected",
                    ));
                }
                Err(TryRecvError::Disconnected) => return Ok(out),
            }
        }
    }
}
