/*!
Lecteurs asynchrones synthétiques

- `PatternReader` : flux déterministe de N octets, sans jamais allouer le
  contenu complet, qui mémorise la plus grande taille de tampon demandée
- `FailingReader` : flux qui s'interrompt après N octets (client déconnecté)
*/

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};

/// Octet attendu à la position `offset` d'un flux synthétique
pub fn pattern_byte(offset: u64) -> u8 {
    (offset % 251) as u8
}

/// Flux déterministe de `len` octets
pub struct PatternReader {
    len: u64,
    offset: u64,
    max_request: Arc<AtomicUsize>,
}

impl PatternReader {
    pub fn new(len: u64) -> Self {
        Self {
            len,
            offset: 0,
            max_request: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Compteur partagé de la plus grande taille de lecture demandée
    pub fn max_request(&self) -> Arc<AtomicUsize> {
        self.max_request.clone()
    }
}

impl AsyncRead for PatternReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.max_request.fetch_max(buf.remaining(), Ordering::Relaxed);

        let left = self.len - self.offset;
        let n = (buf.remaining() as u64).min(left) as usize;
        let start = self.offset;
        fill(buf, start, n);
        self.offset += n as u64;
        Poll::Ready(Ok(()))
    }
}

/// Flux qui renvoie `ConnectionAborted` après `fail_after` octets
pub struct FailingReader {
    inner: PatternReader,
    fail_after: u64,
}

impl FailingReader {
    pub fn new(fail_after: u64) -> Self {
        Self {
            inner: PatternReader::new(u64::MAX),
            fail_after,
        }
    }
}

impl AsyncRead for FailingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let left = self.fail_after - self.inner.offset;
        if left == 0 {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "client went away",
            )));
        }

        let n = (buf.remaining() as u64).min(left) as usize;
        let start = self.inner.offset;
        fill(buf, start, n);
        self.inner.offset += n as u64;
        Poll::Ready(Ok(()))
    }
}

fn fill(buf: &mut ReadBuf<'_>, start: u64, n: usize) {
    let dst = buf.initialize_unfilled_to(n);
    for (i, byte) in dst.iter_mut().enumerate() {
        *byte = pattern_byte(start + i as u64);
    }
    buf.advance(n);
}
