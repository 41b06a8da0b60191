use crate::{Result, TestInfraError};
use sqlx::{Connection, MySqlConnection};
use std::time::Duration;
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::ImageExt;
use testcontainers::{ContainerAsync, GenericImage};
use typed_builder::TypedBuilder;

const READY_ATTEMPTS: u32 = 40;
const READY_INTERVAL: Duration = Duration::from_millis(250);

/// Credentials the container is started with.
#[derive(TypedBuilder)]
pub struct MysqlConfig {
    #[builder(default = "stubby".to_string())]
    database: String,
    #[builder(default = "stubby".to_string())]
    username: String,
    #[builder(default = "stubby".to_string())]
    password: String,
}

/// A disposable MySQL server that accepts connections for the configured
/// user as soon as [`MySqlServer::new`] returns.
pub struct MySqlServer {
    container: ContainerAsync<GenericImage>,
    url: String,
}

impl MySqlServer {
    pub async fn new(config: MysqlConfig) -> Result<Self> {
        let container = GenericImage::new("mysql", "8.4")
            .with_exposed_port(3306_u16.tcp())
            .with_wait_for(WaitFor::message_on_stderr("ready for connections"))
            .with_env_var("MYSQL_DATABASE", config.database.as_str())
            .with_env_var("MYSQL_USER", config.username.as_str())
            .with_env_var("MYSQL_PASSWORD", config.password.as_str())
            .with_env_var("MYSQL_ROOT_PASSWORD", "root")
            .start()
            .await?;

        let host = container.get_host().await?;
        let port = container.get_host_port_ipv4(3306).await?;
        let url = format!(
            "mysql://{}:{}@{}:{}/{}",
            config.username, config.password, host, port, config.database
        );

        wait_until_ready(&url).await?;
        Ok(Self { container, url })
    }

    /// Connection url for the configured user and database.
    pub fn database_url(&self) -> &str {
        &self.url
    }

    pub fn container(&self) -> &ContainerAsync<GenericImage> {
        &self.container
    }
}

// The entrypoint logs readiness once for its bootstrap server, which does not
// listen on the network, before restarting mysqld for real.
async fn wait_until_ready(url: &str) -> Result<()> {
    let mut last_error = String::new();

    for _ in 0..READY_ATTEMPTS {
        match MySqlConnection::connect(url).await {
            Ok(conn) => {
                return conn
                    .close()
                    .await
                    .map_err(|e| TestInfraError::NotReady(format!("mysql: {e}")));
            }
            Err(e) => {
                last_error = e.to_string();
                tokio::time::sleep(READY_INTERVAL).await;
            }
        }
    }

    Err(TestInfraError::NotReady(format!(
        "mysql did not accept connections after {READY_ATTEMPTS} attempts: {last_error}"
    )))
}
