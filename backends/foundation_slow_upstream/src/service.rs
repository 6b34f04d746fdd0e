//! Slow upstream service.
//!
//! WHY: Gateways under test need an upstream that is reliably slow, so their
//! timeout and retry settings can be observed against it.
//!
//! WHAT: [`SlowUpstreamService`] binds a listener, accepts connections and
//! answers each one after a path dependent delay.
//!
//! HOW: Uses stdlib's `TcpListener` with one thread per accepted connection.
//! Handlers share nothing, a sleeping handler never holds up the accept loop
//! or another connection. The accept loop polls a non-blocking listener so a
//! [`ShutdownHandle`] can stop it.

use std::io::{BufReader, Write};
use std::net::{Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::ServiceConfig;
use crate::delays::ProcessingDelay;
use crate::errors::{ConnectionResult, ServiceError, ServiceResult};
use crate::request::read_request;
use crate::response::ProcessedResponse;

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

// Raw accept(2) failures caused by resource pressure (EMFILE, ENFILE, ENOMEM,
// ENOBUFS). They clear once handlers finish and release their sockets.
#[cfg(target_os = "linux")]
const TRANSIENT_ACCEPT_CODES: &[i32] = &[24, 23, 12, 105];
#[cfg(all(unix, not(target_os = "linux")))]
const TRANSIENT_ACCEPT_CODES: &[i32] = &[24, 23, 12, 55];
// WSAEMFILE, ERROR_NOT_ENOUGH_MEMORY, WSAENOBUFS
#[cfg(windows)]
const TRANSIENT_ACCEPT_CODES: &[i32] = &[10024, 8, 10055];
#[cfg(not(any(unix, windows)))]
const TRANSIENT_ACCEPT_CODES: &[i32] = &[];

/// Whether an accept error leaves the listener usable, so the loop should
/// back off and keep accepting rather than stop.
#[must_use]
pub fn is_transient_accept_error(err: &std::io::Error) -> bool {
    use std::io::ErrorKind::{ConnectionAborted, ConnectionReset, Interrupted, OutOfMemory};

    matches!(
        err.kind(),
        ConnectionAborted | ConnectionReset | Interrupted | OutOfMemory
    ) || err
        .raw_os_error()
        .is_some_and(|code| TRANSIENT_ACCEPT_CODES.contains(&code))
}

/// Stops a service's accept loop. Cheap to clone, safe to call from a signal handler.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    running: Arc<AtomicBool>,
}

impl ShutdownHandle {
    fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

/// The fixture: a bound listener waiting to serve.
///
/// # Examples
///
/// ```rust,no_run
/// use foundation_slow_upstream::SlowUpstreamService;
///
/// let service = SlowUpstreamService::start(8081).unwrap();
/// service.serve().unwrap();
/// ```
pub struct SlowUpstreamService {
    listener: TcpListener,
    local_addr: SocketAddr,
    shutdown: ShutdownHandle,
}

impl SlowUpstreamService {
    /// Bind all interfaces on `port`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::BindFailed`] if the port cannot be bound.
    pub fn start(port: u16) -> ServiceResult<Self> {
        Self::bind(ServiceConfig::new(port))
    }

    /// Bind the listening socket described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::BindFailed`] if the address cannot be bound and
    /// [`ServiceError::ListenerSetup`] if the bound address cannot be read back.
    pub fn bind(config: ServiceConfig) -> ServiceResult<Self> {
        tracing::debug!("Binding slow upstream service on {config}");
        let listener = TcpListener::bind(config.socket_addr()).map_err(ServiceError::BindFailed)?;
        let local_addr = listener.local_addr().map_err(ServiceError::ListenerSetup)?;

        tracing::info!("Slow upstream service listening on port {}", local_addr.port());

        Ok(Self {
            listener,
            local_addr,
            shutdown: ShutdownHandle::new(),
        })
    }

    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Run the accept loop on the calling thread until the shutdown handle
    /// is triggered.
    ///
    /// Each accepted connection is handed to its own thread. In-flight
    /// handlers are not waited for when the loop stops.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::ListenerSetup`] if the listener cannot be made
    /// non-blocking and [`ServiceError::AcceptFailed`] on an accept error that
    /// leaves the listener unusable. Aborted peers and descriptor or memory
    /// exhaustion are logged and retried, see [`is_transient_accept_error`].
    pub fn serve(self) -> ServiceResult<()> {
        self.listener
            .set_nonblocking(true)
            .map_err(ServiceError::ListenerSetup)?;

        while self.shutdown.is_running() {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    tracing::debug!("Got a client connection: {peer:?}");
                    Self::dispatch(stream, peer);
                }
                Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(ref err) if is_transient_accept_error(err) => {
                    tracing::warn!("Slow upstream service accept error, retrying: {err}");
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(err) => {
                    tracing::error!("Slow upstream service accept error: {err}");
                    return Err(ServiceError::AcceptFailed(err));
                }
            }
        }

        tracing::info!("Shutting down slow upstream service...");
        drop(self.listener);
        Ok(())
    }

    /// Run [`Self::serve`] on a background thread.
    ///
    /// The returned [`RunningService`] stops the accept loop when dropped.
    #[must_use]
    pub fn spawn(self) -> RunningService {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, self.local_addr.port()));
        let shutdown = self.shutdown_handle();
        let handle = thread::spawn(move || self.serve());

        RunningService {
            addr,
            shutdown,
            handle: Some(handle),
        }
    }

    fn dispatch(stream: TcpStream, peer: SocketAddr) {
        // accepted sockets may inherit the listener's non-blocking mode
        if let Err(err) = stream.set_nonblocking(false) {
            tracing::error!("Dropping connection from {peer}, blocking mode failed: {err}");
            return;
        }

        let spawned = thread::Builder::new()
            .name(format!("slow-upstream-{peer}"))
            .spawn(move || {
                if let Err(err) = Self::handle_connection(stream) {
                    tracing::error!("Connection from {peer} failed: {err}");
                }
            });

        if let Err(err) = spawned {
            tracing::error!("Failed to spawn handler for {peer}: {err}");
        }
    }

    /// Read one request, wait out its delay, write the canned response and close.
    ///
    /// A connection that closes before sending a request line gets no response.
    fn handle_connection(stream: TcpStream) -> ConnectionResult<()> {
        let mut write_stream = stream.try_clone()?;
        let mut reader = BufReader::new(stream);

        let Some(request) = read_request(&mut reader)? else {
            tracing::debug!("Connection closed before a request line arrived");
            return Ok(());
        };

        tracing::info!("Received {} request to {}", request.method, request.path);
        tracing::info!("Headers: {}", request.headers);
        if !request.body.is_empty() {
            tracing::info!("Body: {}", String::from_utf8_lossy(&request.body));
        }

        let delay = ProcessingDelay::for_path(&request.path);
        tracing::info!("Processing request for {} seconds...", delay.seconds());
        thread::sleep(delay.duration());

        let rendered = ProcessedResponse::new(&request, delay).render()?;
        write_stream.write_all(&rendered)?;
        write_stream.flush()?;

        if let Err(err) = write_stream.shutdown(Shutdown::Both) {
            tracing::debug!("Shutdown after response failed: {err}");
        }

        tracing::info!("Response sent for {}", request.path);
        Ok(())
    }
}

/// A service running on a background thread, see [`SlowUpstreamService::spawn`].
pub struct RunningService {
    addr: SocketAddr,
    shutdown: ShutdownHandle,
    handle: Option<thread::JoinHandle<ServiceResult<()>>>,
}

impl RunningService {
    /// Loopback address of the service, suitable for clients on this host.
    #[must_use]
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Full URL for `path` on this service.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use foundation_slow_upstream::SlowUpstreamService;
    ///
    /// let running = SlowUpstreamService::start(0).unwrap().spawn();
    /// assert!(running.url("/slow-api").starts_with("http://127.0.0.1:"));
    /// assert!(running.url("/slow-api").ends_with("/slow-api"));
    /// ```
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Stop accepting and wait for the accept loop to exit.
    ///
    /// # Errors
    ///
    /// Returns whatever error ended the accept loop.
    pub fn stop(mut self) -> ServiceResult<()> {
        self.shutdown.stop();
        match self.handle.take() {
            Some(handle) => match handle.join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            },
            None => Ok(()),
        }
    }
}

impl Drop for RunningService {
    fn drop(&mut self) {
        // accept loop exits on its next poll
        self.shutdown.stop();
    }
}
