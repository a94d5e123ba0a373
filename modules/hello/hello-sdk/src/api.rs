//! `HelloClient` trait definition.

use crate::error::HelloError;
use client_contract::Deferred;

/// Client contract for the remote hello service.
///
/// Both operations target `GET /hello/greeting/{name}`; they differ in the
/// API version they request and in how the result is delivered.
///
/// ```ignore
/// let client: Arc<dyn HelloClient> = Arc::new(HttpHelloClient::new(&config)?);
///
/// let v1 = client.say_hello("Fred")?;
/// let v2 = client.say_hello_two("Fred").await?;
/// ```
pub trait HelloClient: Send + Sync {
    /// Greet `name` using API version 1, blocking until the reply arrives.
    ///
    /// Safe to call from any thread, including tokio worker threads.
    ///
    /// # Errors
    /// Returns `HelloError` for transport failures and non-2xx replies.
    fn say_hello(&self, name: &str) -> Result<String, HelloError>;

    /// Greet `name` using API version 2.
    ///
    /// Returns immediately; the request is already in flight and the
    /// returned future can be awaited on any executor.
    fn say_hello_two(&self, name: &str) -> Deferred<String, HelloError>;
}
