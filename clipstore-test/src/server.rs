//! Exposes an in-process test server for use in integration tests.
//!
//! ```
//! use clipstore_test::server::TestServer;
//!
//! #[tokio::main]
//! async fn main() {
//!    let server = TestServer::new().await;
//!    let url = server.url("/health");
//!    // use the URL in tests...
//! }
//! ```

use std::net::{SocketAddr, TcpListener};

use clipstore_server::config::{Config, Storage};
use clipstore_server::state::Services;
use clipstore_server::web::App;
use tempfile::TempDir;

/// An in-process test server for use in integration tests.
///
/// The server stores videos in a temporary directory, which is deleted when the server is dropped.
/// It listens on a random available port on localhost, and its public URL points at that port so
/// that playback URLs returned by the API can be fetched directly.
#[derive(Debug)]
pub struct TestServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    tempdir: TempDir,
}

impl TestServer {
    /// Starts a server with the default configuration.
    pub async fn new() -> Self {
        Self::with_config(Config::default()).await
    }

    /// Starts a server with the given configuration.
    ///
    /// Storage, listen address and public URL are always overridden.
    pub async fn with_config(config: Config) -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let tempdir = tempfile::tempdir().unwrap();
        let config = Config {
            http_addr: socket,
            public_url: format!("http://localhost:{}", socket.port()),
            storage: Storage::FileSystem {
                path: tempdir.path().into(),
            },
            ..config
        };

        let state = Services::spawn(config).await.unwrap();
        let app = App::new(state);

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            app.serve(listener).await.unwrap();
        });

        Self {
            handle,
            socket,
            tempdir,
        }
    }

    /// Returns a full URL pointing to the given path.
    ///
    /// This URL uses `localhost` as hostname.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("http://localhost:{}/{}", self.socket.port(), path)
    }

    /// Returns the directory backing the server's storage.
    pub fn storage_path(&self) -> &std::path::Path {
        self.tempdir.path()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
