use derive_getters::Getters;
use once_cell::sync::Lazy;
use reqwest::{Response, Url};
use secrecy::ExposeSecret;
use sqlx::{Connection, Executor, PgConnection, PgPool};
use uuid::Uuid;
use wiremock::{
    matchers::{method, path},
    Mock, MockBuilder, MockServer,
};
use new_year_mailer::{
    configuration::{get_configuration, DatabaseSettings, Settings},
    telemetry::{get_subscriber, init_subscriber},
    App,
};

static TRACING: Lazy<()> = Lazy::new(|| {
    let subscriber_name = "test".to_string();
    if std::env::var("TEST_LOG").is_ok() {
        init_subscriber(get_subscriber(subscriber_name, std::io::stdout))
            .expect("Failed to init telemetry");
    } else {
        init_subscriber(get_subscriber(subscriber_name, std::io::sink))
            .expect("Failed to init telemetry");
    };
});

#[derive(Getters)]
pub struct TestApp {
    address: String,
    port: u16,
    db_pool: PgPool,
    email_server: MockServer,
    api_client: reqwest::Client,
    broadcast_secret: String,
}

/// Links to the landing page and to unsubscribe, as found in a broadcast
/// email.
pub struct UnsubscribeLinks {
    pub html: Url,
    pub plain_text: Url,
}

#[derive(Debug, serde::Deserialize)]
pub struct BroadcastBody {
    pub success: bool,
    pub sent: u32,
    pub failed: u32,
    pub total: u32,
}

impl TestApp {
    pub fn at_url(&self, path: &str) -> String {
        format!("{}{path}", self.address)
    }

    pub async fn health_check(&self) -> Response {
        self.api_client
            .get(self.at_url("/health"))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post_subscriptions(&self, body: String) -> Response {
        self.api_client
            .post(self.at_url("/subscriptions"))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// Subscribe through the public API.
    pub async fn create_subscriber(&self, email: &str) {
        let body = format!("email={}", email.replace('@', "%40"));
        self.post_subscriptions(body)
            .await
            .error_for_status()
            .expect("Failed to subscribe");
    }

    /// Trigger a broadcast with the secret as a bearer token.
    pub async fn post_broadcast(&self) -> Response {
        self.api_client
            .post(self.at_url("/broadcast"))
            .bearer_auth(&self.broadcast_secret)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn post_broadcast_and_read_body(&self) -> BroadcastBody {
        self.post_broadcast()
            .await
            .error_for_status()
            .expect("Broadcast failed")
            .json()
            .await
            .expect("Broadcast response was not the expected JSON")
    }

    pub async fn post_reset(&self) -> Response {
        self.api_client
            .post(self.at_url("/broadcast/reset"))
            .bearer_auth(&self.broadcast_secret)
            .send()
            .await
            .expect("Failed to execute request.")
    }

    pub async fn get_unsubscribe(&self, query: &str) -> Response {
        self.api_client
            .get(self.at_url(&format!("/subscriptions/unsubscribe{query}")))
            .send()
            .await
            .expect("Failed to execute request.")
    }

    /// Stored emails and their sent-flag, oldest subscriber first.
    pub async fn stored_subscribers(&self) -> Vec<(String, bool)> {
        sqlx::query_as::<_, (String, bool)>(
            "SELECT email, newsletter_sent FROM subscribers ORDER BY subscribed_at",
        )
        .fetch_all(&self.db_pool)
        .await
        .expect("Failed to fetch saved subscribers")
    }

    /// Extract the unsubscribe links embedded in a request to the email API.
    pub fn get_unsubscribe_links(&self, email_request: &wiremock::Request) -> UnsubscribeLinks {
        let body: serde_json::Value = serde_json::from_slice(&email_request.body).unwrap();

        let get_link = |s: &str| {
            let links: Vec<_> = linkify::LinkFinder::new()
                .links(s)
                .filter(|l| *l.kind() == linkify::LinkKind::Url)
                .filter(|l| l.as_str().contains("/subscriptions/unsubscribe"))
                .collect();
            assert_eq!(links.len(), 1);
            let mut link = Url::parse(links[0].as_str()).unwrap();
            // Make sure we don't call random APIs on the web
            assert_eq!(link.host_str().unwrap(), "127.0.0.1");
            link.set_port(Some(self.port)).unwrap();
            link
        };

        UnsubscribeLinks {
            html: get_link(body["html"].as_str().unwrap()),
            plain_text: get_link(body["text"].as_str().unwrap()),
        }
    }
}

pub fn when_sending_an_email() -> MockBuilder {
    Mock::given(path("/emails")).and(method("POST"))
}

/// Spawn an instance of the app on a random port, with its own database and
/// a mocked email provider.
pub async fn spawn_app() -> TestApp {
    spawn_app_with(|_| {}).await
}

/// Same as [`spawn_app`], letting the test adjust the settings before the
/// app is built.
pub async fn spawn_app_with(customize: impl FnOnce(&mut Settings)) -> TestApp {
    Lazy::force(&TRACING);

    let email_server = MockServer::start().await;
    let config = {
        let mut c = get_configuration().expect("Failed to read configuration");

        // Generate a unique name for each DB.
        c.database.name = Uuid::new_v4().to_string();
        // Make OS choose random port
        c.application.port = 0;
        c.email_client.base_url = email_server.uri();
        c.broadcast.site_url = "http://127.0.0.1".into();
        c.broadcast.send_delay_milliseconds = 0;
        c.broadcast.schedule_interval_seconds = None;
        customize(&mut c);

        c
    };

    // Setup database
    let db_pool = configure_database(&config.database).await;
    let broadcast_secret = config.broadcast.secret.expose_secret().clone();

    let app = App::build(config).expect("Failed to build application");
    let port = app.port();

    // Start server
    let _ = tokio::spawn(app.run_until_stopped());

    TestApp {
        address: format!("http://127.0.0.1:{port}"),
        port,
        db_pool,
        email_server,
        api_client: reqwest::Client::new(),
        broadcast_secret,
    }
}

pub async fn configure_database(config: &DatabaseSettings) -> PgPool {
    let mut connection = PgConnection::connect_with(&config.without_db())
        .await
        .expect("Failed to connect to Postgres");

    connection
        .execute(format!(r#"CREATE DATABASE "{}";"#, config.name()).as_str())
        .await
        .expect("Failed to create database.");

    // Migrate the database
    let db_pool = PgPool::connect_with(config.with_db())
        .await
        .expect("Failed to connect to Postgres");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("Failed to migrate the database");

    db_pool
}
