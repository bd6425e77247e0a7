//! SSH connection pool
//!
//! Keyed by `(host, user)` with at most one live session per target.
//! `acquire` hands out a scoped guard; dropping the guard returns the entry
//! and stamps `last_used`. Dead transports re-authenticate transparently.
//! libssh2 is synchronous, so every exchange runs under `spawn_blocking`.

use std::collections::HashMap;
use std::io::Read;
use std::net::TcpStream;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use ssh2::Session;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::error::ToolError;

/// Connection settings for the pool
#[derive(Debug, Clone)]
pub struct SshSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub key_path: PathBuf,
    pub connect_timeout: Duration,
    pub idle_ttl: Duration,
    pub max_entries: usize,
}

impl SshSettings {
    pub fn from_config(config: &AgentConfig) -> Result<Self, ToolError> {
        let key_path = config.ssh_key_path.clone().ok_or_else(|| {
            ToolError::Connection("ssh_key_path is not configured".into())
        })?;
        if config.ssh_host.is_empty() || config.ssh_user.is_empty() {
            return Err(ToolError::Connection(
                "ssh_host and ssh_user must be configured".into(),
            ));
        }
        Ok(Self {
            host: config.ssh_host.clone(),
            port: 22,
            user: config.ssh_user.clone(),
            key_path,
            connect_timeout: Duration::from_secs(10),
            idle_ttl: Duration::from_secs(config.connection_timeout_seconds),
            max_entries: config.connection_pool_size,
        })
    }
}

type PoolKey = (String, String);

struct PoolEntry {
    session: Arc<Mutex<Session>>,
    last_used: Instant,
    in_use: bool,
}

/// Output of one remote command exchange
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// The delimited text form fed to the output validator.
    pub fn render(&self) -> String {
        format!(
            "Exit code: {}\nSTDOUT:\n{}\nSTDERR:\n{}",
            self.exit_code, self.stdout, self.stderr
        )
    }
}

/// Scoped acquisition of one pool entry
pub struct SshGuard {
    key: PoolKey,
    session: Arc<Mutex<Session>>,
    entries: Arc<Mutex<HashMap<PoolKey, PoolEntry>>>,
}

impl Drop for SshGuard {
    fn drop(&mut self) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(&self.key) {
            entry.in_use = false;
            entry.last_used = Instant::now();
        }
    }
}

/// Pool of authenticated SSH sessions
pub struct SshPool {
    settings: SshSettings,
    entries: Arc<Mutex<HashMap<PoolKey, PoolEntry>>>,
}

impl SshPool {
    pub fn new(settings: SshSettings) -> Self {
        Self {
            settings,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn settings(&self) -> &SshSettings {
        &self.settings
    }

    /// Acquire the entry for the configured target, connecting if needed.
    /// The returned guard must be held for the duration of one exchange.
    pub async fn acquire(&self) -> Result<SshGuard, ToolError> {
        let key = (self.settings.host.clone(), self.settings.user.clone());

        loop {
            let existing = {
                let mut entries = self.entries.lock();
                self.sweep_locked(&mut entries);
                match entries.get_mut(&key) {
                    Some(entry) if !entry.in_use => {
                        entry.in_use = true;
                        Some(entry.session.clone())
                    }
                    Some(_) => None, // busy; wait and retry
                    None => {
                        break;
                    }
                }
            };

            match existing {
                Some(session) => {
                    if self.is_alive(session.clone()).await {
                        return Ok(SshGuard {
                            key,
                            session,
                            entries: self.entries.clone(),
                        });
                    }
                    debug!(host = %key.0, "cached session is dead, reconnecting");
                    let fresh = self.connect().await?;
                    let fresh = Arc::new(Mutex::new(fresh));
                    let mut entries = self.entries.lock();
                    if let Some(entry) = entries.get_mut(&key) {
                        entry.session = fresh.clone();
                    }
                    return Ok(SshGuard {
                        key,
                        session: fresh,
                        entries: self.entries.clone(),
                    });
                }
                None => tokio::time::sleep(Duration::from_millis(20)).await,
            }
        }

        // No entry yet: authenticate outside the lock, then insert.
        let session = Arc::new(Mutex::new(self.connect().await?));
        let mut entries = self.entries.lock();
        if entries.len() >= self.settings.max_entries {
            // Make room by dropping the stalest idle entry.
            if let Some(stale) = entries
                .iter()
                .filter(|(_, e)| !e.in_use)
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&stale);
            }
        }
        entries.insert(
            key.clone(),
            PoolEntry {
                session: session.clone(),
                last_used: Instant::now(),
                in_use: true,
            },
        );
        Ok(SshGuard {
            key,
            session,
            entries: self.entries.clone(),
        })
    }

    /// Run a command over the held session, optionally piping `input` to the
    /// command's stdin. The payload is never spliced into the command line.
    pub async fn exec(
        &self,
        guard: &SshGuard,
        command: &str,
        input: Option<String>,
    ) -> Result<CommandOutput, ToolError> {
        let session = guard.session.clone();
        let command = command.to_string();
        run_blocking(move || {
            let session = session.lock();
            let mut channel = session
                .channel_session()
                .map_err(|e| ToolError::Connection(format!("channel open failed: {}", e)))?;
            channel
                .exec(&command)
                .map_err(|e| ToolError::Execution(format!("exec failed: {}", e)))?;

            if let Some(input) = input {
                use std::io::Write;
                let normalized = input.replace("\r\n", "\n");
                channel
                    .write_all(normalized.as_bytes())
                    .map_err(|e| ToolError::Execution(format!("stdin write failed: {}", e)))?;
                channel
                    .send_eof()
                    .map_err(|e| ToolError::Execution(format!("eof failed: {}", e)))?;
            }

            let mut stdout = String::new();
            channel
                .read_to_string(&mut stdout)
                .map_err(|e| ToolError::Execution(format!("stdout read failed: {}", e)))?;
            let mut stderr = String::new();
            channel
                .stderr()
                .read_to_string(&mut stderr)
                .map_err(|e| ToolError::Execution(format!("stderr read failed: {}", e)))?;
            channel
                .wait_close()
                .map_err(|e| ToolError::Execution(format!("close failed: {}", e)))?;
            let exit_code = channel
                .exit_status()
                .map_err(|e| ToolError::Execution(format!("exit status failed: {}", e)))?;

            Ok(CommandOutput {
                exit_code,
                stdout,
                stderr,
            })
        })
        .await
    }

    /// Write a remote file over SFTP.
    pub async fn write_file(
        &self,
        guard: &SshGuard,
        path: &str,
        content: &str,
    ) -> Result<usize, ToolError> {
        let session = guard.session.clone();
        let path = PathBuf::from(path);
        let content = content.to_string();
        run_blocking(move || {
            use std::io::Write;
            let session = session.lock();
            let sftp = session
                .sftp()
                .map_err(|e| ToolError::Connection(format!("sftp open failed: {}", e)))?;
            let mut file = sftp
                .create(&path)
                .map_err(|e| ToolError::Execution(format!("create failed: {}", e)))?;
            file.write_all(content.as_bytes())
                .map_err(|e| ToolError::Execution(format!("write failed: {}", e)))?;
            Ok(content.len())
        })
        .await
    }

    /// Read a remote file over SFTP.
    pub async fn read_file(&self, guard: &SshGuard, path: &str) -> Result<String, ToolError> {
        let session = guard.session.clone();
        let path = PathBuf::from(path);
        run_blocking(move || {
            let session = session.lock();
            let sftp = session
                .sftp()
                .map_err(|e| ToolError::Connection(format!("sftp open failed: {}", e)))?;
            let mut file = sftp
                .open(&path)
                .map_err(|e| ToolError::Execution(format!("open failed: {}", e)))?;
            let mut content = String::new();
            file.read_to_string(&mut content)
                .map_err(|e| ToolError::Execution(format!("read failed: {}", e)))?;
            Ok(content)
        })
        .await
    }

    /// List a remote directory over SFTP.
    pub async fn list_directory(
        &self,
        guard: &SshGuard,
        path: &str,
    ) -> Result<Vec<String>, ToolError> {
        let session = guard.session.clone();
        let path = PathBuf::from(path);
        run_blocking(move || {
            let session = session.lock();
            let sftp = session
                .sftp()
                .map_err(|e| ToolError::Connection(format!("sftp open failed: {}", e)))?;
            let entries = sftp
                .readdir(&path)
                .map_err(|e| ToolError::Execution(format!("readdir failed: {}", e)))?;
            let mut names: Vec<String> = entries
                .into_iter()
                .filter_map(|(entry_path, stat)| {
                    let name = entry_path.file_name()?.to_string_lossy().to_string();
                    Some(if stat.is_dir() {
                        format!("{}/", name)
                    } else {
                        name
                    })
                })
                .collect();
            names.sort();
            Ok(names)
        })
        .await
    }

    /// Drop idle entries past the TTL. Returns how many were evicted.
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries.lock();
        self.sweep_locked(&mut entries)
    }

    fn sweep_locked(&self, entries: &mut HashMap<PoolKey, PoolEntry>) -> usize {
        let ttl = self.settings.idle_ttl;
        let before = entries.len();
        entries.retain(|key, entry| {
            let keep = entry.in_use || entry.last_used.elapsed() < ttl;
            if !keep {
                info!(host = %key.0, user = %key.1, "evicting idle SSH connection");
            }
            keep
        });
        before - entries.len()
    }

    pub fn entry_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the entry for the configured target is currently held.
    pub fn is_in_use(&self) -> bool {
        let key = (self.settings.host.clone(), self.settings.user.clone());
        self.entries
            .lock()
            .get(&key)
            .map(|e| e.in_use)
            .unwrap_or(false)
    }

    async fn is_alive(&self, session: Arc<Mutex<Session>>) -> bool {
        run_blocking(move || {
            let session = session.lock();
            if !session.authenticated() {
                return Ok(false);
            }
            Ok(session.keepalive_send().is_ok())
        })
        .await
        .unwrap_or(false)
    }

    async fn connect(&self) -> Result<Session, ToolError> {
        let settings = self.settings.clone();
        run_blocking(move || {
            let address = format!("{}:{}", settings.host, settings.port);
            let socket_addr = address
                .parse()
                .or_else(|_| {
                    use std::net::ToSocketAddrs;
                    address
                        .to_socket_addrs()
                        .map_err(|e| ToolError::Connection(format!("resolve failed: {}", e)))?
                        .next()
                        .ok_or_else(|| {
                            ToolError::Connection(format!("no address for {}", address))
                        })
                })?;
            let stream = TcpStream::connect_timeout(&socket_addr, settings.connect_timeout)
                .map_err(|e| {
                    ToolError::Connection(format!("connect to {} failed: {}", address, e))
                })?;

            let mut session = Session::new()
                .map_err(|e| ToolError::Connection(format!("session init failed: {}", e)))?;
            session.set_tcp_stream(stream);
            session
                .handshake()
                .map_err(|e| ToolError::Connection(format!("handshake failed: {}", e)))?;
            session
                .userauth_pubkey_file(&settings.user, None, &settings.key_path, None)
                .map_err(|e| {
                    ToolError::Connection(format!(
                        "authentication failed for {}@{}: {}",
                        settings.user, settings.host, e
                    ))
                })?;
            session.set_keepalive(true, 30);
            debug!(host = %settings.host, user = %settings.user, "SSH session established");
            Ok(session)
        })
        .await
    }

    #[cfg(test)]
    fn insert_raw(&self, key: PoolKey, last_used: Instant, in_use: bool) {
        let session = Session::new().map(|s| Arc::new(Mutex::new(s)));
        if let Ok(session) = session {
            self.entries.lock().insert(
                key,
                PoolEntry {
                    session,
                    last_used,
                    in_use,
                },
            );
        }
    }
}

async fn run_blocking<T: Send + 'static>(
    work: impl FnOnce() -> Result<T, ToolError> + Send + 'static,
) -> Result<T, ToolError> {
    match tokio::task::spawn_blocking(work).await {
        Ok(result) => result,
        Err(join_error) => {
            warn!(%join_error, "blocking SSH task failed to join");
            Err(ToolError::Execution(format!(
                "worker task failed: {}",
                join_error
            )))
        }
    }
}
