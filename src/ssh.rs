//! Host SSH bridge for containerized scripts.
//!
//! The container backend can expose a loopback SSH server so scripts
//! running inside a container re-enter the host (`ssh -p $INVOWK_SSH_PORT
//! $INVOWK_SSH_USER@$INVOWK_SSH_HOST <command>`). The controller is
//! mutex-guarded and lazily started: the first frame that needs the server
//! starts it and owns shutdown; recursive executions in the same chain
//! share the instance and their leases are no-ops on drop.
//!
//! Authentication is a per-process random token passed as the password;
//! the server only ever binds the loopback interface.

use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

use rand::Rng;
use rand::distributions::Alphanumeric;
use russh::server::Server as _;
use tracing::{debug, warn};

use crate::error::InvowkError;
use crate::execute::cancel::CancelToken;
use crate::output::Output;

/// Connection coordinates projected into the container environment.
#[derive(Debug, Clone)]
pub struct SshCoords {
    pub port: u16,
    pub user: String,
    pub token: String,
}

struct RunningServer {
    coords: SshCoords,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
    thread: Option<std::thread::JoinHandle<()>>,
}

/// Lazy-start, ref-counted controller for the host SSH server.
#[derive(Default)]
pub struct SshController {
    inner: Mutex<Option<RunningServer>>,
}

/// A lease on the running server. Dropping the lease that started the
/// server shuts it down; other leases are passive.
pub struct SshLease {
    pub coords: SshCoords,
    started_by_me: bool,
    controller: Arc<SshController>,
}

impl Drop for SshLease {
    fn drop(&mut self) {
        if self.started_by_me {
            self.controller.stop();
        }
    }
}

impl SshController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the server if needed and lease it. Blocks until the server
    /// accepts connections.
    pub fn acquire(self: &Arc<Self>, cancel: &CancelToken) -> Result<SshLease, InvowkError> {
        let mut guard = self.inner.lock().expect("ssh lock");
        if let Some(server) = guard.as_ref() {
            return Ok(SshLease {
                coords: server.coords.clone(),
                started_by_me: false,
                controller: Arc::clone(self),
            });
        }
        let spinner = Output::spinner("Starting host SSH bridge...");
        let server = match start_server(cancel) {
            Ok(server) => {
                spinner.finish_clear();
                server
            }
            Err(err) => {
                spinner.finish_error("host SSH bridge failed to start");
                return Err(err);
            }
        };
        let coords = server.coords.clone();
        debug!(port = coords.port, "Host SSH server started");
        *guard = Some(server);
        Ok(SshLease {
            coords,
            started_by_me: true,
            controller: Arc::clone(self),
        })
    }

    /// Coordinates of the running instance, if any.
    pub fn current(&self) -> Option<SshCoords> {
        self.inner
            .lock()
            .expect("ssh lock")
            .as_ref()
            .map(|s| s.coords.clone())
    }

    /// Best-effort shutdown. Only the starting frame schedules this.
    pub fn stop(&self) {
        let Some(mut server) = self.inner.lock().expect("ssh lock").take() else {
            return;
        };
        if let Some(shutdown) = server.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = server.thread.take() {
            if thread.join().is_err() {
                warn!("SSH server thread panicked during shutdown");
            }
        }
        debug!("Host SSH server stopped");
    }
}

fn random_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

fn start_server(cancel: &CancelToken) -> Result<RunningServer, InvowkError> {
    let user = whoami::username();
    let token = random_token();
    let (port_tx, port_rx) = mpsc::channel::<Result<u16, String>>();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let thread_user = user.clone();
    let thread_token = token.clone();
    let thread = std::thread::Builder::new()
        .name("invowk-ssh".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    let _ = port_tx.send(Err(e.to_string()));
                    return;
                }
            };
            runtime.block_on(async move {
                let key = match russh_keys::key::KeyPair::generate_ed25519() {
                    Some(key) => key,
                    None => {
                        let _ = port_tx.send(Err("host key generation failed".to_string()));
                        return;
                    }
                };
                let config = Arc::new(russh::server::Config {
                    auth_rejection_time: Duration::from_secs(1),
                    keys: vec![key],
                    ..Default::default()
                });
                let listener = match tokio::net::TcpListener::bind(("127.0.0.1", 0)).await {
                    Ok(listener) => listener,
                    Err(e) => {
                        let _ = port_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let port = match listener.local_addr() {
                    Ok(addr) => addr.port(),
                    Err(e) => {
                        let _ = port_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let _ = port_tx.send(Ok(port));

                let mut server = HostServer {
                    user: thread_user,
                    token: thread_token,
                };
                tokio::select! {
                    result = server.run_on_socket(config, &listener) => {
                        if let Err(e) = result {
                            warn!(%e, "SSH server terminated abnormally");
                        }
                    }
                    _ = shutdown_rx => {}
                }
            });
        })
        .map_err(|e| InvowkError::SshStartup {
            message: e.to_string(),
        })?;

    // Wait for the bound port, honoring cancellation.
    let port = loop {
        if cancel.is_cancelled() {
            let _ = shutdown_tx.send(());
            let _ = thread.join();
            return Err(InvowkError::Cancelled {
                command: "ssh startup".to_string(),
            });
        }
        match port_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(Ok(port)) => break port,
            Ok(Err(message)) => {
                let _ = thread.join();
                return Err(InvowkError::SshStartup { message });
            }
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                let _ = thread.join();
                return Err(InvowkError::SshStartup {
                    message: "server thread exited before binding".to_string(),
                });
            }
        }
    };

    Ok(RunningServer {
        coords: SshCoords { port, user, token },
        shutdown: Some(shutdown_tx),
        thread: Some(thread),
    })
}

struct HostServer {
    user: String,
    token: String,
}

impl russh::server::Server for HostServer {
    type Handler = ClientHandler;

    fn new_client(&mut self, _peer: Option<std::net::SocketAddr>) -> ClientHandler {
        ClientHandler {
            user: self.user.clone(),
            token: self.token.clone(),
        }
    }
}

struct ClientHandler {
    user: String,
    token: String,
}

#[async_trait::async_trait]
impl russh::server::Handler for ClientHandler {
    type Error = russh::Error;

    async fn auth_password(
        &mut self,
        user: &str,
        password: &str,
    ) -> Result<russh::server::Auth, Self::Error> {
        if user == self.user && password == self.token {
            Ok(russh::server::Auth::Accept)
        } else {
            Ok(russh::server::Auth::Reject {
                proceed_with_methods: None,
            })
        }
    }

    async fn channel_open_session(
        &mut self,
        _channel: russh::Channel<russh::server::Msg>,
        _session: &mut russh::server::Session,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }

    async fn exec_request(
        &mut self,
        channel: russh::ChannelId,
        data: &[u8],
        session: &mut russh::server::Session,
    ) -> Result<(), Self::Error> {
        let command = String::from_utf8_lossy(data).to_string();
        debug!(%command, "Host callback over SSH");
        let output = tokio::task::spawn_blocking(move || {
            std::process::Command::new("sh")
                .arg("-c")
                .arg(&command)
                .output()
        })
        .await;

        let _ = session.channel_success(channel);
        match output {
            Ok(Ok(output)) => {
                if !output.stdout.is_empty() {
                    let _ = session.data(channel, russh::CryptoVec::from(output.stdout));
                }
                if !output.stderr.is_empty() {
                    let _ = session.extended_data(
                        channel,
                        1,
                        russh::CryptoVec::from(output.stderr),
                    );
                }
                let code = output.status.code().unwrap_or(1) as u32;
                let _ = session.exit_status_request(channel, code);
            }
            Ok(Err(e)) => {
                let _ = session.data(
                    channel,
                    russh::CryptoVec::from(format!("invowk: host exec failed: {e}\n").into_bytes()),
                );
                let _ = session.exit_status_request(channel, 127);
            }
            Err(e) => {
                warn!(%e, "Host exec task failed");
                let _ = session.exit_status_request(channel, 1);
            }
        }
        let _ = session.eof(channel);
        let _ = session.close(channel);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_acquire_starts_later_acquires_share() {
        let controller = Arc::new(SshController::new());
        let cancel = CancelToken::new();

        let first = controller.acquire(&cancel).unwrap();
        assert!(first.started_by_me);
        let port = first.coords.port;
        assert_ne!(port, 0);

        let second = controller.acquire(&cancel).unwrap();
        assert!(!second.started_by_me);
        assert_eq!(second.coords.port, port);
        assert_eq!(second.coords.token, first.coords.token);

        // Dropping the passive lease keeps the server up.
        drop(second);
        assert!(controller.current().is_some());

        // Dropping the starter stops it.
        drop(first);
        assert!(controller.current().is_none());
    }

    #[test]
    fn stop_without_start_is_a_noop() {
        let controller = SshController::new();
        controller.stop();
        assert!(controller.current().is_none());
    }

    #[test]
    fn tokens_are_random_per_start() {
        assert_ne!(random_token(), random_token());
        assert_eq!(random_token().len(), 32);
    }
}
