//! The plaintext TCP ingest collaborator.
//!
//! Accepts a connection, accumulates bytes until the peer closes (or a
//! maximum accumulation size is exceeded), and forwards the whole block
//! to [`crate::log::Log::append`] as one atomic write. A block without
//! at least one newline is rejected without ever reaching the log.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};

use crate::log::Log;
use crate::Result;

/// Matches the original tool's accumulation cap (4 MiB).
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Accept connections on `listener` forever, dispatching each to its own
/// task against a shared `store`. Returns only on a listener-level I/O
/// error; a single connection's failure never brings down the server.
pub async fn serve(store: Arc<Log>, listener: TcpListener, max_block_size: usize) -> Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            if let Err(err) = handle_connection(&store, stream, max_block_size).await {
                log::warn!(target: "carbon_pool::ingest", "connection from {peer} failed: {err}");
            }
        });
    }
}

async fn handle_connection(
    store: &Log,
    mut stream: TcpStream,
    max_block_size: usize,
) -> Result<()> {
    let peer = stream.peer_addr().ok();
    let mut block = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        block.extend_from_slice(&chunk[..n]);
        if block.len() > max_block_size {
            warn_rejected(peer, "block exceeds maximum accumulation size");
            return Ok(());
        }
    }

    if !block.contains(&b'\n') {
        warn_rejected(peer, "block contains no newline");
        return Ok(());
    }

    if !store.append(&block)? {
        warn_rejected(peer, "block larger than segment_size");
    }

    Ok(())
}

fn warn_rejected(peer: Option<SocketAddr>, reason: &str) {
    match peer {
        Some(addr) => log::warn!(target: "carbon_pool::ingest", "rejected block from {addr}: {reason}"),
        None => log::warn!(target: "carbon_pool::ingest", "rejected block: {reason}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener as TokioListener;

    #[tokio::test]
    async fn accepts_a_multi_line_block() {
        let dir = tempdir().expect("tempdir");
        let store = Arc::new(Log::open(dir.path(), 1024, 10).expect("open"));

        let listener = TokioListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let store_clone = Arc::clone(&store);
        tokio::spawn(async move {
            serve(store_clone, listener, DEFAULT_MAX_BLOCK_SIZE)
                .await
                .ok();
        });

        let mut conn = TcpStream::connect(addr).await.expect("connect");
        conn.write_all(b"metric.one 1 1700000000\nmetric.two 2 1700000001\n")
            .await
            .expect("write");
        conn.shutdown().await.expect("shutdown");

        // Give the spawned handler a moment to process the block.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let (data, _) = store.read(0, 10).expect("read");
        assert_eq!(
            data,
            b"metric.one 1 1700000000\nmetric.two 2 1700000001\n".to_vec()
        );
    }

    #[tokio::test]
    async fn rejects_block_without_newline() {
        let dir = tempdir().expect("tempdir");
        let store = Arc::new(Log::open(dir.path(), 1024, 10).expect("open"));

        let listener = TokioListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let store_clone = Arc::clone(&store);
        tokio::spawn(async move {
            serve(store_clone, listener, DEFAULT_MAX_BLOCK_SIZE)
                .await
                .ok();
        });

        let mut conn = TcpStream::connect(addr).await.expect("connect");
        conn.write_all(b"no newline here").await.expect("write");
        conn.shutdown().await.expect("shutdown");
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(store.offset(), 0);
    }
}
