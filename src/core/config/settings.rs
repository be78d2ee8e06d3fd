use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment,
    parse_storage_backend, parse_u16, parse_u32, parse_usize,
};
use super::secret::ephemeral_secret_key;
use super::types::{
    ApiSettings, ConfigError, CorsSettings, DatabaseSettings, InviteSettings, RuntimeSettings,
    SecuritySettings, ServerHost, ServerPort, ServerSettings, Settings, StorageBackend,
    StorageSettings, TelemetrySettings,
};

const MIN_INVITE_CODE_BYTES: usize = 6;

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("QUIZFORGE_HOST", "0.0.0.0");
        let port = env_or_default("QUIZFORGE_PORT", "8000");

        let environment = parse_environment(
            env_optional("QUIZFORGE_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let strict_config = env_optional("QUIZFORGE_STRICT_CONFIG")
            .map(|value| parse_bool(&value))
            .unwrap_or(false)
            || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Quizforge API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let secret_key = match env_optional("SECRET_KEY") {
            Some(value) => value,
            None if strict_config => return Err(ConfigError::MissingSecret("SECRET_KEY")),
            None => ephemeral_secret_key(),
        };
        let algorithm = env_or_default("ALGORITHM", "HS256");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "quizforge");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "quizforge");
        let database_url = env_optional("DATABASE_URL");
        let max_connections =
            parse_u32("DATABASE_MAX_CONNECTIONS", env_or_default("DATABASE_MAX_CONNECTIONS", "20"))?;

        let backend = parse_storage_backend(env_optional("QUIZFORGE_STORAGE"))?;

        let public_base_url = env_or_default("INVITE_BASE_URL", "http://localhost:5173")
            .trim_end_matches('/')
            .to_string();
        let code_bytes =
            parse_usize("INVITE_CODE_BYTES", env_or_default("INVITE_CODE_BYTES", "12"))?;

        let log_level = env_or_default("QUIZFORGE_LOG_LEVEL", "info");
        let json = env_optional("QUIZFORGE_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings { host: ServerHost::parse(host)?, port: ServerPort::parse(port)? },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            security: SecuritySettings { secret_key, algorithm },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
                max_connections,
            },
            storage: StorageSettings { backend },
            invites: InviteSettings { public_base_url, code_bytes },
            telemetry: TelemetrySettings { log_level, json },
        };

        settings.validate()?;

        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn storage(&self) -> &StorageSettings {
        &self.storage
    }

    pub(crate) fn invites(&self) -> &InviteSettings {
        &self.invites
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    /// Deterministic settings for unit tests; never reads the environment.
    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        use super::types::Environment;

        Self {
            server: ServerSettings {
                host: ServerHost("127.0.0.1".to_string()),
                port: ServerPort(8000),
            },
            runtime: RuntimeSettings { environment: Environment::Test, strict_config: false },
            api: ApiSettings {
                project_name: "Quizforge API".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                api_v1_str: "/api/v1".to_string(),
            },
            security: SecuritySettings {
                secret_key: "test-secret".to_string(),
                algorithm: "HS256".to_string(),
            },
            cors: CorsSettings { origins: Vec::new() },
            database: DatabaseSettings {
                postgres_server: "localhost".to_string(),
                postgres_port: 5432,
                postgres_user: "quizforge_test".to_string(),
                postgres_password: "quizforge_test".to_string(),
                postgres_db: "quizforge_test".to_string(),
                database_url: None,
                max_connections: 1,
            },
            storage: StorageSettings { backend: StorageBackend::Memory },
            invites: InviteSettings {
                public_base_url: "https://quiz.example.com".to_string(),
                code_bytes: 12,
            },
            telemetry: TelemetrySettings { log_level: "debug".to_string(), json: false },
        }
    }

    #[cfg(test)]
    pub(crate) fn security_mut(&mut self) -> &mut SecuritySettings {
        &mut self.security
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.invites.code_bytes < MIN_INVITE_CODE_BYTES {
            return Err(ConfigError::InvalidValue {
                field: "INVITE_CODE_BYTES",
                value: self.invites.code_bytes.to_string(),
            });
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                field: "DATABASE_MAX_CONNECTIONS",
                value: String::from("0"),
            });
        }

        if !self.runtime.strict_config {
            return Ok(());
        }

        if self.storage.backend == StorageBackend::Memory {
            return Err(ConfigError::InvalidValue {
                field: "QUIZFORGE_STORAGE",
                value: StorageBackend::Memory.as_str().to_string(),
            });
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        Ok(())
    }
}

impl DatabaseSettings {
    pub(crate) fn database_url(&self) -> String {
        if let Some(url) = &self.database_url {
            return url.clone();
        }
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.postgres_user,
            self.postgres_password,
            self.postgres_server,
            self.postgres_port,
            self.postgres_db
        )
    }
}

impl ServerHost {
    fn parse(value: String) -> Result<Self, ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::InvalidHost(value));
        }
        Ok(Self(value))
    }
}

impl ServerPort {
    fn parse(value: String) -> Result<Self, ConfigError> {
        let parsed: u16 = value.parse().map_err(|_| ConfigError::InvalidPort(value.clone()))?;
        if parsed == 0 {
            return Err(ConfigError::InvalidPort(value));
        }
        Ok(Self(parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_port_rejects_zero_and_garbage() {
        assert!(matches!(ServerPort::parse("0".to_string()), Err(ConfigError::InvalidPort(_))));
        assert!(matches!(ServerPort::parse("abc".to_string()), Err(ConfigError::InvalidPort(_))));
        assert_eq!(ServerPort::parse("8080".to_string()).unwrap().0, 8080);
    }

    #[test]
    fn database_url_prefers_explicit_url() {
        let mut database = DatabaseSettings {
            postgres_server: "db".to_string(),
            postgres_port: 5433,
            postgres_user: "user".to_string(),
            postgres_password: "pw".to_string(),
            postgres_db: "quiz".to_string(),
            database_url: None,
            max_connections: 5,
        };
        assert_eq!(database.database_url(), "postgresql://user:pw@db:5433/quiz");

        database.database_url = Some("postgresql://other/db".to_string());
        assert_eq!(database.database_url(), "postgresql://other/db");
    }
}
