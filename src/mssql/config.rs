use tiberius::{AuthMethod, Config as TiberiusConfig};

use crate::driver::{Connection, ConnectionFactory};
use crate::error::SqlPipeError;

use super::connection::MssqlConnection;

/// Options for connecting to SQL Server.
#[derive(Debug, Clone)]
pub struct MssqlOptions {
    pub server: String,
    pub database: String,
    pub user: String,
    pub password: String,
    pub port: Option<u16>,
    pub instance_name: Option<String>,
    pub trust_cert: bool,
    pub application_name: Option<String>,
}

impl MssqlOptions {
    #[must_use]
    pub fn new(server: String, database: String, user: String, password: String) -> Self {
        Self {
            server,
            database,
            user,
            password,
            port: None,
            instance_name: None,
            trust_cert: false,
            application_name: None,
        }
    }

    #[must_use]
    pub fn with_port(mut self, port: Option<u16>) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_instance_name(mut self, instance_name: Option<String>) -> Self {
        self.instance_name = instance_name;
        self
    }

    #[must_use]
    pub fn with_trust_cert(mut self, trust_cert: bool) -> Self {
        self.trust_cert = trust_cert;
        self
    }

    /// Named instances without a fixed port are resolved through the SQL Browser.
    #[must_use]
    pub fn uses_browser(&self) -> bool {
        self.instance_name.is_some() && self.port.is_none()
    }

    #[must_use]
    pub fn to_tiberius_config(&self) -> TiberiusConfig {
        let mut config = TiberiusConfig::new();
        config.host(&self.server);
        config.database(&self.database);
        config.port(self.port.unwrap_or(1433));
        config.authentication(AuthMethod::sql_server(&self.user, &self.password));
        if let Some(instance) = &self.instance_name {
            config.instance_name(instance);
        }
        if let Some(app) = &self.application_name {
            config.application_name(app);
        }
        if self.trust_cert {
            config.trust_cert();
        }
        config
    }
}

/// Fluent builder for SQL Server options.
#[derive(Debug, Clone)]
pub struct MssqlOptionsBuilder {
    opts: MssqlOptions,
}

impl MssqlOptionsBuilder {
    #[must_use]
    pub fn new(server: String, database: String, user: String, password: String) -> Self {
        Self {
            opts: MssqlOptions::new(server, database, user, password),
        }
    }

    #[must_use]
    pub fn port(mut self, port: Option<u16>) -> Self {
        self.opts.port = port;
        self
    }

    #[must_use]
    pub fn instance_name(mut self, instance_name: Option<String>) -> Self {
        self.opts.instance_name = instance_name;
        self
    }

    #[must_use]
    pub fn trust_cert(mut self, trust_cert: bool) -> Self {
        self.opts.trust_cert = trust_cert;
        self
    }

    #[must_use]
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.opts.application_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn finish(self) -> MssqlOptions {
        self.opts
    }

    /// Build a connection factory from the collected options.
    #[must_use]
    pub fn build(self) -> MssqlConnectionFactory {
        MssqlConnectionFactory::new(&self.finish())
    }
}

/// Hands out a fresh, unopened [`MssqlConnection`] per execution.
#[derive(Clone)]
pub struct MssqlConnectionFactory {
    config: TiberiusConfig,
    use_browser: bool,
}

impl std::fmt::Debug for MssqlConnectionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlConnectionFactory")
            .field("addr", &self.config.get_addr())
            .field("use_browser", &self.use_browser)
            .finish()
    }
}

impl MssqlConnectionFactory {
    #[must_use]
    pub fn new(opts: &MssqlOptions) -> Self {
        Self {
            config: opts.to_tiberius_config(),
            use_browser: opts.uses_browser(),
        }
    }

    /// Parse an ADO.NET connection string
    /// (`server=tcp:localhost,1433;user=sa;password=...;database=app`).
    ///
    /// # Errors
    /// Returns `SqlPipeError::InvalidConfiguration` if the string cannot be parsed.
    pub fn from_ado_string(connection_string: &str) -> Result<Self, SqlPipeError> {
        let config = TiberiusConfig::from_ado_string(connection_string).map_err(|e| {
            SqlPipeError::InvalidConfiguration(format!("invalid connection string: {e}"))
        })?;
        Ok(Self {
            config,
            use_browser: false,
        })
    }

    #[must_use]
    pub fn config(&self) -> &TiberiusConfig {
        &self.config
    }
}

impl ConnectionFactory for MssqlConnectionFactory {
    fn create(&self) -> Box<dyn Connection> {
        Box::new(MssqlConnection::new(self.config.clone(), self.use_browser))
    }
}
