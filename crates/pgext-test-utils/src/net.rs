//! Network fixtures.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;

/// A TCP endpoint that accepts connections and never answers.
///
/// Accepted sockets stay open for the life of the process, so clients block
/// in their first read until their own timeout or interrupt fires.
pub struct SilentServer {
    addr: SocketAddr,
}

impl SilentServer {
    /// Bind an ephemeral port on the loopback interface.
    ///
    /// # Panics
    /// Panics if the port cannot be bound.
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .unwrap_or_else(|e| panic!("SilentServer: bind failed: {e}"));
        let addr = listener
            .local_addr()
            .unwrap_or_else(|e| panic!("SilentServer: no local address: {e}"));
        thread::spawn(move || {
            let mut held: Vec<TcpStream> = Vec::new();
            for stream in listener.incoming().flatten() {
                held.push(stream);
            }
        });
        Self { addr }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Plain-HTTP repository URL served by this endpoint.
    pub fn http_url(&self) -> String {
        format!("http://{}/silent.git", self.addr)
    }

    /// HTTPS repository URL; the TLS handshake never completes.
    pub fn https_url(&self) -> String {
        format!("https://{}/silent.git", self.addr)
    }
}
