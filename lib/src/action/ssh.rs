use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;

use async_trait::async_trait;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use redact::Secret;
use russh::client::Handle;
use russh::keys::PrivateKey;
use russh::keys::PrivateKeyWithHashAlg;
use tracing::debug;
use tracing::instrument;
use tracing::warn;

use crate::action::transport::TcpTransport;
use crate::action::ExecOutput;
use crate::action::ExecRequest;
use crate::action::Runner;
use crate::action::RunnerFactory;
use crate::error::AuthMethod;
use crate::error::Error;
use crate::error::Phase;
use crate::error::Result;
use crate::inventory::Node;

// Factory --------------------------------------------------------------------

/// Factory for building SSH runners.
#[derive(Debug, Clone, Copy, Default)]
pub struct SshRunnerFactory {
    transport: TcpTransport,
    inactivity_timeout: Option<Duration>,
}

impl SshRunnerFactory {
    #[must_use]
    pub fn new(transport: TcpTransport) -> Self {
        Self {
            transport,
            inactivity_timeout: None,
        }
    }

    /// Closes sessions that see no traffic for this long.
    #[must_use]
    pub fn with_inactivity_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.inactivity_timeout = timeout;
        self
    }
}

impl RunnerFactory for SshRunnerFactory {
    fn runner(&self, node: Arc<Node>) -> Box<dyn Runner + Send> {
        Box::new(SshRunner {
            transport: self.transport,
            inactivity_timeout: self.inactivity_timeout,
            node,
        })
    }
}

// Runner ---------------------------------------------------------------------

/// Runs a single command over a single SSH session.
pub struct SshRunner {
    transport: TcpTransport,
    inactivity_timeout: Option<Duration>,
    node: Arc<Node>,
}

#[async_trait]
impl Runner for SshRunner {
    #[instrument(skip_all, fields(node = %self.node.name, host = %self.node.address()))]
    async fn exec(&mut self, request: &ExecRequest) -> Result<ExecOutput> {
        let credential = Credential::resolve(&self.node).await?;

        let mut session = self.connect().await?;
        let result = self.run(&mut session, credential, request).await;

        if let Err(error) = session
            .disconnect(russh::Disconnect::ByApplication, "", "English")
            .await
        {
            debug!(?error, "ssh disconnect failed");
        }

        result
    }
}

/// Helpers for [`Runner`]
impl SshRunner {
    async fn connect(&self) -> Result<Handle<SshClientHandler>> {
        let address = self.node.address();
        let stream = self.transport.connect(&self.node).await?;

        let config = Arc::new(russh::client::Config {
            inactivity_timeout: self.inactivity_timeout,
            ..Default::default()
        });
        let handler = SshClientHandler;

        russh::client::connect_stream(config, stream, handler)
            .await
            .map_err(|error| Error::transport(address, Phase::Handshake, error))
    }

    async fn run(
        &self,
        session: &mut Handle<SshClientHandler>,
        credential: Credential,
        request: &ExecRequest,
    ) -> Result<ExecOutput> {
        self.authenticate(session, credential).await?;
        self.exec_channel(session, request).await
    }

    async fn authenticate(
        &self,
        session: &mut Handle<SshClientHandler>,
        credential: Credential,
    ) -> Result<()> {
        let user = self.node.user.as_str();
        let auth_error =
            |error: russh::Error| Error::transport(self.node.address(), Phase::Auth, error);

        let (method, outcome) = match credential {
            Credential::Key(key) => {
                let hash_alg = session
                    .best_supported_rsa_hash()
                    .await
                    .map_err(auth_error)?
                    .flatten();
                let key = PrivateKeyWithHashAlg::new(key, hash_alg);
                let outcome = session.authenticate_publickey(user, key).await;
                (AuthMethod::PublicKey, outcome)
            }
            Credential::Password(password) => {
                let outcome = session
                    .authenticate_password(user, password.expose_secret().as_str())
                    .await;
                (AuthMethod::Password, outcome)
            }
        };

        if !outcome.map_err(auth_error)?.success() {
            return Err(Error::AuthRejected {
                host: self.node.address(),
                user: user.to_owned(),
                method,
            });
        }

        debug!(%method, "ssh authenticated");
        Ok(())
    }

    async fn exec_channel(
        &self,
        session: &mut Handle<SshClientHandler>,
        request: &ExecRequest,
    ) -> Result<ExecOutput> {
        let channel_error =
            |error: russh::Error| Error::transport(self.node.address(), Phase::Channel, error);

        let mut channel = session
            .channel_open_session()
            .await
            .map_err(channel_error)?;
        let command = request.remote_command(&self.node.user);

        let start_time = SystemTime::now();
        channel
            .exec(true, command.as_bytes())
            .await
            .map_err(channel_error)?;

        let mut exit_status = None;
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        while let Some(msg) = channel.wait().await {
            match msg {
                russh::ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
                russh::ChannelMsg::ExtendedData { ref data, ext: 1 } => {
                    stderr.extend_from_slice(data);
                }
                russh::ChannelMsg::ExitStatus { exit_status: code } => {
                    // more data may still arrive after the exit status
                    exit_status = Some(code);
                }
                russh::ChannelMsg::ExitSignal { signal_name, .. } => {
                    debug!(?signal_name, "remote command terminated by signal");
                }
                _ => {}
            }
        }
        let end_time = SystemTime::now();

        Ok(ExecOutput {
            start_time,
            end_time,
            exit_status,
            stdout,
            stderr,
        })
    }
}

// Credentials ----------------------------------------------------------------

/// Authentication method picked for a node before dialing.
enum Credential {
    Key(Arc<PrivateKey>),
    Password(Secret<String>),
}

impl Credential {
    /// Prefers a key that parses, then a password.
    ///
    /// # Errors
    ///
    /// - [`Error::AuthUnavailable`] if neither is usable
    async fn resolve(node: &Node) -> Result<Self> {
        if let Some(path) = node.key_path() {
            match load_key(path).await {
                Ok(key) => return Ok(Self::Key(Arc::new(key))),
                Err(error) => warn!(%error, %path, node = %node.name, "unusable ssh key"),
            }
        }

        if let Some(password) = node.password() {
            return Ok(Self::Password(Secret::new(password.to_owned())));
        }

        Err(Error::AuthUnavailable {
            host: node.address(),
            user: node.user.clone(),
        })
    }
}

async fn load_key(path: &Utf8Path) -> anyhow::Result<PrivateKey> {
    let path = expand_home(path);
    let text = tokio::fs::read_to_string(&path).await?;
    let key = russh::keys::decode_secret_key(&text, None)?;
    Ok(key)
}

/// Expands a leading `~/` to the home directory.
fn expand_home(path: &Utf8Path) -> Utf8PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_owned();
    };
    match dirs::home_dir().and_then(|home| Utf8PathBuf::from_path_buf(home).ok()) {
        Some(home) => home.join(rest),
        None => path.to_owned(),
    }
}

// russh details --------------------------------------------------------------

#[derive(Debug, Default)]
struct SshClientHandler;

impl russh::client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }

    async fn auth_banner(
        &mut self,
        banner: &str,
        _session: &mut russh::client::Session,
    ) -> Result<(), Self::Error> {
        debug!(%banner, "ssh auth banner");
        Ok(())
    }
}

// Tests ----------------------------------------------------------------------
