//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use greenlight::config::ApiConfig;
use greenlight::lifecycle::{ShutdownCoordinator, ShutdownError, ShutdownReport};
use greenlight::mailer::{MailError, Mailer, Message};
use greenlight::net::Listener;
use greenlight::security::RateLimiter;
use greenlight::tasks::BackgroundTasks;
use greenlight::HttpServer;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A server running on an ephemeral loopback port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub coordinator: Arc<ShutdownCoordinator>,
    pub limiter: Arc<RateLimiter>,
    pub handle: JoinHandle<Result<ShutdownReport, ShutdownError>>,
}

impl TestServer {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Trigger shutdown and wait for the server to stop.
    pub async fn shutdown(self) -> ShutdownReport {
        self.coordinator.trigger();
        self.handle
            .await
            .expect("server task panicked")
            .expect("server stopped with an error")
    }
}

pub async fn bind_loopback() -> Listener {
    let tcp = TcpListener::bind("127.0.0.1:0").await.unwrap();
    Listener::from_tcp(tcp, 64).unwrap()
}

pub fn coordinator(grace: Duration) -> Arc<ShutdownCoordinator> {
    Arc::new(ShutdownCoordinator::new(grace, BackgroundTasks::new()))
}

pub async fn spawn_server(config: ApiConfig, mailer: Arc<dyn Mailer>) -> TestServer {
    let listener = bind_loopback().await;
    let addr = listener.local_addr().unwrap();
    let coordinator = coordinator(Duration::from_secs(config.shutdown.grace_secs));

    let server = HttpServer::new(config, Arc::clone(&coordinator), mailer);
    let limiter = server.limiter();
    let handle = tokio::spawn(server.run(listener));

    TestServer {
        addr,
        coordinator,
        limiter,
        handle,
    }
}

/// Mailer that keeps every delivered message, optionally after a delay.
#[derive(Default)]
pub struct RecordingMailer {
    delay: Duration,
    sent: Mutex<Vec<Message>>,
}

impl RecordingMailer {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }
}

impl Mailer for RecordingMailer {
    fn deliver<'a>(&'a self, message: &'a Message) -> BoxFuture<'a, Result<(), MailError>> {
        Box::pin(async move {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        })
    }
}
